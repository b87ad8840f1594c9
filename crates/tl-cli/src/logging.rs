//! Logging infrastructure for the Ticket Loom CLI.
//!
//! Structured logging via the tracing ecosystem.

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level.
    pub level: Level,
    /// Whether to use JSON format.
    pub json_format: bool,
    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration for troubleshooting runs.
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            ..Default::default()
        }
    }

    /// JSON output for log shippers.
    pub fn json() -> Self {
        Self {
            json_format: true,
            include_target: true,
            ..Default::default()
        }
    }
}

/// Initializes the logging system with the given configuration.
///
/// `RUST_LOG` overrides the level when set.
pub fn init_logging(config: LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tl_core={},tl_connectors={},tl_cli={}",
            config.level, config.level, config.level
        ))
    });

    if config.json_format {
        let fmt_layer = fmt::layer().json().with_target(config.include_target);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    } else {
        let fmt_layer = fmt::layer().with_target(config.include_target);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
    }

    #[test]
    fn test_verbose_config() {
        let config = LoggingConfig::verbose();
        assert_eq!(config.level, Level::DEBUG);
    }

    #[test]
    fn test_json_config() {
        assert!(LoggingConfig::json().json_format);
    }
}
