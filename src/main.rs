use clap::Parser;
use ctmp_broker::cli::{Cli, Config};
use ctmp_broker::error::BrokerError;
use ctmp_broker::{cleaner, dispatch, ingest, logging};
use ctmp_broker::{MessageQueue, WorkerPool};
use log::error;
use std::sync::Arc;
use std::thread::Builder;

fn spawn(name: &str, f: impl FnOnce() + Send + 'static) -> Result<std::thread::JoinHandle<()>, BrokerError> {
    Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| BrokerError::Fatal(format!("failed to spawn {name} thread: {e}")))
}

fn main() {
    logging::init();

    let config: Config = Cli::parse().into();
    let queue = Arc::new(MessageQueue::new());
    let pool = Arc::new(WorkerPool::new(config.num_workers));

    let cleaner_queue = queue.clone();
    let ttl = config.ttl;
    if let Err(e) = spawn("cleaner", move || cleaner::run(&cleaner_queue, ttl)) {
        error!("{e}");
        std::process::exit(1);
    }

    let dispatch_config = config.clone();
    let dispatch_queue = queue.clone();
    let dispatch_pool = pool.clone();
    let dispatcher = match spawn("dispatcher", move || {
        if let Err(e) = dispatch::run(&dispatch_config, &dispatch_queue, &dispatch_pool) {
            error!("destination dispatcher failed: {e}");
            std::process::exit(1);
        }
    }) {
        Ok(handle) => handle,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = ingest::run(&config, &queue) {
        error!("source ingester failed: {e}");
        std::process::exit(1);
    }

    let _ = dispatcher.join();
}
