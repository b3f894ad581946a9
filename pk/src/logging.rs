//! Logging setup for applications embedding the engine
//!
//! The library itself only emits `tracing` events; these helpers install a
//! subscriber. `RUST_LOG` directives are honored on top of the chosen level.

use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

/// Map a level name (case-insensitive) to a level, defaulting to INFO
pub fn parse_level(level: Option<&str>) -> Level {
    let Some(s) = level else {
        return Level::INFO;
    };
    match s.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            Level::INFO
        }
    }
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(level.into())
}

/// Log to stderr
///
/// Level priority: `explicit` > `config_level` > INFO. Returns `false` if a
/// global subscriber was already installed.
pub fn init_logging(explicit: Option<&str>, config_level: Option<&str>) -> bool {
    let level = parse_level(explicit.or(config_level));
    let installed = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(level))
        .try_init()
        .is_ok();
    if installed {
        info!("Logging initialized (level: {:?})", level);
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(None), Level::INFO);
        assert_eq!(parse_level(Some("debug")), Level::DEBUG);
        assert_eq!(parse_level(Some("Warning")), Level::WARN);
        assert_eq!(parse_level(Some("TRACE")), Level::TRACE);
        assert_eq!(parse_level(Some("loud")), Level::INFO);
    }

    #[test]
    fn test_second_init_is_tolerated() {
        init_logging(Some("error"), None);
        assert!(!init_logging(None, Some("error")));
    }
}
