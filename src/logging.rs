//! Logging setup.
//!
//! Uses the `log` facade with an `env_logger` backend. `RUST_LOG` takes
//! precedence when set; otherwise the level comes from the CLI flags
//! (`--quiet` = errors only, `-v` = debug, `-vv` = trace, default info).

use env_logger::Builder;
use log::LevelFilter;
use std::env;

/// Initialize the logging subsystem. Call once, before any log macros.
pub fn init(verbose: u8, quiet: bool) {
    let mut builder = Builder::new();

    if env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(level_for(verbose, quiet));
    }

    builder.format_timestamp(None);
    builder.init();
}

fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_default_is_info() {
        assert_eq!(level_for(0, false), LevelFilter::Info);
    }

    #[test]
    fn test_level_verbose() {
        assert_eq!(level_for(1, false), LevelFilter::Debug);
        assert_eq!(level_for(2, false), LevelFilter::Trace);
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        assert_eq!(level_for(2, true), LevelFilter::Error);
    }
}
