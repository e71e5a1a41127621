//! Tracing subscriber setup.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when neither `RUST_LOG` nor the configured level parse.
const FALLBACK_FILTER: &str = "warn";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line plain text.
    #[default]
    Text,
    /// Multi-line human readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Builds the filter: `RUST_LOG` if set and valid, else `level`.
#[must_use]
pub fn build_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(FALLBACK_FILTER))
}

/// Installs the global subscriber.
///
/// Must be called once, before any request is served.
pub fn init(level: &str, format: LogFormat) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let registry = tracing_subscriber::registry().with(build_filter(rust_log.as_deref(), level));

    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_wins_over_level() {
        let filter = build_filter(Some("porter_server=debug"), "warn");
        assert_eq!(filter.to_string(), "porter_server=debug");
    }

    #[test]
    fn level_is_used_without_rust_log() {
        assert_eq!(build_filter(None, "info").to_string(), "info");
    }

    #[test]
    fn invalid_directives_fall_back() {
        assert_eq!(build_filter(Some("porter=notalevel"), "debug").to_string(), "debug");
        assert_eq!(build_filter(None, "porter=notalevel").to_string(), FALLBACK_FILTER);
    }

    #[test]
    fn format_deserializes_lowercase() {
        let format: LogFormat = serde_json::from_str(r#""json""#).expect("format");
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}
