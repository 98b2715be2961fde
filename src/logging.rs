//! Logging setup for the linker and incremental engine.
//!
//! Log lines use a compact `HH:MM:SS.mmm` timestamp and carry the module
//! target, so `[logging.modules]` entries can raise the level of one stage
//! without flooding the rest.
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "crosslink::incremental" = "debug"   # trace cascade waves
//! ```
//!
//! `RUST_LOG` replaces the configured filter entirely:
//! ```bash
//! RUST_LOG=crosslink::linker=trace crosslink index .
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Filter directives for `config`, e.g. `warn,crosslink::linker=debug`.
///
/// Bare module names are expanded to `crosslink::<name>`.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.default.clone();
    for (module, level) in &config.modules {
        let target = if module.contains("::") || module == env!("CARGO_CRATE_NAME") {
            module.clone()
        } else {
            format!("{}::{module}", env!("CARGO_CRATE_NAME"))
        };
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber. Only the first call has any effect.
///
/// Output goes to stderr so that JSON written to stdout by the CLI stays
/// parseable.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::try_new(filter_directives(config))
                .unwrap_or_else(|_| EnvFilter::new(&config.default))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        // A subscriber installed elsewhere (e.g. by a test harness) wins
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

/// Install the subscriber with `default = "warn"`.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Info-level event tagged with the stage that produced it.
///
/// ```ignore
/// log_event!("incremental", "wave", "{} files", wave.len());
/// ```
#[macro_export]
macro_rules! log_event {
    ($stage:expr, $event:expr) => {
        tracing::info!("[{}] {}", $stage, $event)
    };
    ($stage:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $stage, $event, format!($($arg)*))
    };
}

/// Debug-level counterpart of [`log_event!`].
#[macro_export]
macro_rules! debug_event {
    ($stage:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $stage, $event)
    };
    ($stage:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $stage, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_expand_module_names() {
        let mut config = LoggingConfig::default();
        config
            .modules
            .insert("incremental".to_string(), "debug".to_string());
        config
            .modules
            .insert("tree_sitter::parser".to_string(), "error".to_string());

        assert_eq!(
            filter_directives(&config),
            "warn,crosslink::incremental=debug,tree_sitter::parser=error"
        );
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init_with_config(&LoggingConfig {
            default: "trace".to_string(),
            modules: Default::default(),
        });
    }
}
