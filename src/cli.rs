//! Command-line configuration, mirroring the reference's `args.c` flags exactly.

use clap::Parser;
use std::time::Duration;

pub const MIN_NUM_WORKERS: usize = 1;
pub const MAX_NUM_WORKERS: usize = 64;
pub const DEFAULT_NUM_WORKERS: usize = 32;

pub const MIN_BACKLOG: u32 = 1;
pub const MAX_BACKLOG: u32 = 64;
pub const DEFAULT_BACKLOG: u32 = 16;

pub const MIN_TTL_SECS: u64 = 2;
pub const MAX_TTL_SECS: u64 = 10;
pub const DEFAULT_TTL_SECS: u64 = 5;

pub const SOURCE_PORT: u16 = 33333;
pub const DEST_PORT: u16 = 44444;

fn ranged<T>(min: T, max: T, name: &'static str) -> impl Fn(&str) -> Result<T, String>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    move |s: &str| {
        let val: T = s
            .parse()
            .map_err(|_| format!("invalid {name} {s:?}: not an integer"))?;
        if val < min || val > max {
            Err(format!("invalid {name} {val}: must be between {min} and {max}"))
        } else {
            Ok(val)
        }
    }
}

fn parse_num_workers(s: &str) -> Result<usize, String> {
    ranged(MIN_NUM_WORKERS, MAX_NUM_WORKERS, "number of workers")(s)
}

fn parse_backlog(s: &str) -> Result<u32, String> {
    ranged(MIN_BACKLOG, MAX_BACKLOG, "backlog")(s)
}

fn parse_ttl(s: &str) -> Result<u64, String> {
    ranged(MIN_TTL_SECS, MAX_TTL_SECS, "TTL")(s)
}

/// A single-source, many-destination broker for the CTMP framed protocol.
#[derive(Parser, Debug)]
#[command(name = "ctmp-broker", version, about)]
pub struct Cli {
    /// Use extended CTMP (adds the options byte and SENSITIVE-frame checksum validation).
    #[arg(short = 'e', long)]
    pub extended: bool,

    /// Maximum number of concurrent receiver worker threads.
    #[arg(short = 'n', long = "num-workers", default_value_t = DEFAULT_NUM_WORKERS, value_parser = parse_num_workers)]
    pub num_workers: usize,

    /// Backlog length passed to `listen()` for both listeners.
    #[arg(short = 'b', long, default_value_t = DEFAULT_BACKLOG, value_parser = parse_backlog)]
    pub backlog: u32,

    /// Message time-to-live, in seconds.
    #[arg(short = 't', long, default_value_t = DEFAULT_TTL_SECS, value_parser = parse_ttl)]
    pub ttl: u64,
}

/// Immutable, validated settings shared (via `Arc`) across every broker thread.
#[derive(Debug, Clone)]
pub struct Config {
    pub extended: bool,
    pub num_workers: usize,
    pub backlog: u32,
    pub ttl: Duration,
    pub source_port: u16,
    pub dest_port: u16,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            extended: cli.extended,
            num_workers: cli.num_workers,
            backlog: cli.backlog,
            ttl: Duration::from_secs(cli.ttl),
            source_port: SOURCE_PORT,
            dest_port: DEST_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn defaults_match_spec() {
        let cli = Cli::parse_from(["ctmp-broker"]);
        assert!(!cli.extended);
        assert_eq!(cli.num_workers, DEFAULT_NUM_WORKERS);
        assert_eq!(cli.backlog, DEFAULT_BACKLOG);
        assert_eq!(cli.ttl, DEFAULT_TTL_SECS);
    }

    #[test]
    fn rejects_out_of_range_num_workers() {
        let result = Cli::try_parse_from(["ctmp-broker", "-n", "65"]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_out_of_range_ttl() {
        let result = Cli::try_parse_from(["ctmp-broker", "-t", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn accepts_extended_flag() {
        let cli = Cli::parse_from(["ctmp-broker", "--extended"]);
        assert!(cli.extended);
    }

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }
}
