use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `THINGS_LOG=things3=debug`
pub const LOG_ENV: &str = "THINGS_LOG";

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for JSON output; the default level is `warn`.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .try_init();
}
