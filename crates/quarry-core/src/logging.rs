//! Logging integration for the quarry ORM.
//!
//! Provides a helper for configuring [`tracing`]-based logging. The ORM
//! itself only emits events (executed statements on the `quarry_db` target
//! when the debug toggle is on, warnings for suspicious metadata); wiring a
//! subscriber is the application's choice, and this module offers the
//! conventional one.

/// Sets up the global tracing subscriber.
///
/// The log level is read from `level` (e.g. "debug", "info", "warn"),
/// falling back to "info" if the directive cannot be parsed. In debug mode a
/// pretty, human-readable format is used; otherwise a structured JSON format.
///
/// Installing a subscriber twice is a no-op, so tests can call this freely.
pub fn setup_logging(debug: bool, level: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    if debug {
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
