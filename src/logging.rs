//! Logging setup: `env_logger` with a formatter matching the reference's `log.c` output —
//! every line prefixed with a local-time `YYYY-MM-DD HH:MM:SS` timestamp.

use std::io::Write;

/// Initialise the global logger. Call once, at the top of `main`.
pub fn init() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            writeln!(buf, "{ts} {}: {}", record.level(), record.args())
        })
        .init();
}
