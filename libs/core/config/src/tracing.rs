use crate::{env_optional, Environment};
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Install color-eyre hooks for binaries. Safe to call more than once.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Resolve the log filter directive.
///
/// `RUST_LOG` wins when set. Otherwise `LOG_LEVEL` (e.g. `INFO`, `debug`) is used,
/// defaulting to `info`.
pub fn filter_directive() -> String {
    if let Some(directive) = env_optional("RUST_LOG") {
        return directive;
    }
    env_optional("LOG_LEVEL")
        .map(|level| level.to_ascii_lowercase())
        .unwrap_or_else(|| "info".to_string())
}

/// Initialize tracing with environment-aware formatting and span capture.
///
/// - **Production** (`APP_ENV=production`): flattened JSON events, no targets.
/// - **Development**: pretty, human-readable output.
///
/// Both install [`tracing_error::ErrorLayer`] so `eyre` reports carry span traces.
/// Repeated calls are a no-op (common in tests).
pub fn init_tracing(environment: &Environment) {
    let directive = filter_directive();
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if environment.is_production() {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(_) => info!(?environment, filter = %directive, "Tracing initialized"),
        Err(_) => debug!("Tracing already initialized, skipping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_prefers_rust_log() {
        temp_env::with_vars(
            [("RUST_LOG", Some("domain_vectorization=trace")), ("LOG_LEVEL", Some("WARN"))],
            || {
                assert_eq!(filter_directive(), "domain_vectorization=trace");
            },
        );
    }

    #[test]
    fn test_filter_uses_log_level_lowercased() {
        temp_env::with_vars([("RUST_LOG", None::<&str>), ("LOG_LEVEL", Some("DEBUG"))], || {
            assert_eq!(filter_directive(), "debug");
        });
    }

    #[test]
    fn test_filter_defaults_to_info() {
        temp_env::with_vars([("RUST_LOG", None::<&str>), ("LOG_LEVEL", None::<&str>)], || {
            assert_eq!(filter_directive(), "info");
        });
    }

    #[test]
    fn test_init_tracing_multiple_calls() {
        init_tracing(&Environment::Development);
        init_tracing(&Environment::Production);
    }
}
