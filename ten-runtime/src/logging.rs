//! Global log subscriber.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `directives`
/// (`"info"`, `"ten_runtime=debug,warn"`, ...).
///
/// Best effort: returns false when a global subscriber already exists.
/// Invalid directives fall back to `info`.
pub fn init(directives: &str) -> bool {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|e| {
        eprintln!("invalid log filter {directives:?}: {e}; using info");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
