use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "ROVER_RECONCILE_LOG";

/// Install a fmt subscriber filtered by `ROVER_RECONCILE_LOG` (default
/// `warn`). Returns false when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| "warn".to_string());
    init_tracing_with(&filter)
}

pub fn init_tracing_with(filter: &str) -> bool {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
