//! The source ingester: accepts a single producer at a time, decodes CTMP frames, and appends
//! valid ones to the shared queue. Never blocks on consumers.

use crate::cli::Config;
use crate::codec::{self, ParseOutcome};
use crate::error::BrokerError;
use crate::net;
use crate::queue::MessageQueue;
use log::{debug, error, info};
use std::net::TcpListener;
use std::sync::Arc;

/// Run the source ingester forever. Accepts one producer connection at a time; when it
/// disconnects, accepts the next one.
pub fn run(config: &Config, queue: &Arc<MessageQueue>) -> Result<(), BrokerError> {
    let addr = format!("0.0.0.0:{}", config.source_port).parse().unwrap();
    let listener: TcpListener =
        net::listen(addr, config.backlog).map_err(|source| BrokerError::Bind { addr, source })?;
    info!("source listener bound on {addr}");

    loop {
        let (mut stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                error!("source accept failed: {e}");
                continue;
            }
        };
        info!("producer connected from {peer}");

        loop {
            match net::is_alive(&stream) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!("producer liveness check failed: {e}");
                    break;
                }
            }

            match codec::parse(&mut stream, config.extended) {
                Ok(ParseOutcome::Frame(msg)) => {
                    debug!("enqueueing {}-byte message", msg.len());
                    queue.append(msg);
                }
                Ok(ParseOutcome::Dropped(reason)) => {
                    info!("dropping malformed frame from producer: {reason}");
                }
                Ok(ParseOutcome::Closed) => break,
                Err(e) => {
                    error!("error reading from producer: {e}");
                    break;
                }
            }
        }

        debug!("producer {peer} disconnected");
    }
}
