//! Logging integration for the filtering engine.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`FilterSettings`] and for creating per-filter-set spans.

use crate::settings::FilterSettings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level`. In debug mode a pretty,
/// human-readable format is used; otherwise a structured JSON format is used.
/// Calling this more than once is harmless; later calls are ignored.
pub fn setup_logging(settings: &FilterSettings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for work done on behalf of one filter set.
///
/// # Examples
///
/// ```
/// use django_rs_filters_core::logging::filterset_span;
///
/// let span = filterset_span("TaskFilter");
/// let _guard = span.enter();
/// tracing::debug!("building filters");
/// ```
pub fn filterset_span(filterset: &str) -> tracing::Span {
    tracing::debug_span!("filterset", name = filterset)
}
