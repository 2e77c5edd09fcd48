//! A single-source, many-destination message broker for the CTMP framed protocol.
//!
//! One producer connects on the source port and streams length-prefixed frames; any number of
//! receivers connect on the destination port and each gets a replay, in source order, of the
//! frames that arrived after it connected, bounded by a time-to-live.

pub mod cleaner;
pub mod cli;
pub mod clock;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod net;
pub mod pool;
pub mod queue;

pub use cli::Config;
pub use error::BrokerError;
pub use pool::WorkerPool;
pub use queue::MessageQueue;
