use crate::config::TelemetryConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

const ENGINE_TARGET: &str = "quarantine_ward";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("log filter '{directives}' is invalid")]
    Filter {
        directives: String,
        #[source]
        source: ParseError,
    },
    #[error("could not install the tracing subscriber: {0}")]
    Subscriber(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Install the global subscriber on stderr so stdout stays free for reports.
/// `RUST_LOG` wins over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = directives(&config.log_level);
            EnvFilter::try_new(&directives)
                .map_err(|source| TelemetryError::Filter { directives, source })?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.show_targets)
        .compact()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// A bare level applies to the engine only; dependencies stay at `warn`.
/// Anything that already looks like a directive list is passed through.
fn directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("warn,{ENGINE_TARGET}={level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_is_scoped_to_the_engine() {
        assert_eq!(directives("debug"), "warn,quarantine_ward=debug");
        assert_eq!(directives(" info "), "warn,quarantine_ward=info");
    }

    #[test]
    fn directive_lists_pass_through() {
        assert_eq!(directives("info,quarantine_ward=trace"), "info,quarantine_ward=trace");
    }

    #[test]
    fn invalid_levels_fail_to_parse() {
        assert!(EnvFilter::try_new(directives("loud")).is_err());
    }
}
