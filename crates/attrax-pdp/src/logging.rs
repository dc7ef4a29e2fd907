use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogConfig, LogFormat};

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over the
/// configured level. Call once at process start.
pub fn init_logging(config: &LogConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    match config.format {
        LogFormat::Json => {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        }
        LogFormat::Pretty => {
            registry.with(tracing_subscriber::fmt::layer().pretty()).init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_filter_uses_configured_level() {
        let config = LogConfig {
            format: LogFormat::Json,
            level: "debug".to_string(),
        };

        let filter = env_filter(&config);

        assert_eq!(filter.to_string(), "debug");
    }
}
