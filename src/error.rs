//! Typed errors for the handful of failures `main` must report and exit non-zero for.
//!
//! Protocol-level failures (bad magic, bad checksum, ...) and per-connection accept failures
//! are deliberately not part of this enum: the former are represented by
//! [`crate::codec::ParseOutcome`], the latter are logged and retried in place by the ingester
//! and dispatcher accept loops. Neither ever propagates as a `Result::Err`.

use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Fatal(String),
}
