use tracing_subscriber::{EnvFilter, fmt};

/// Installs the fmt subscriber with an explicit directive string, falling
/// back to `info` when the directive does not parse.
pub fn init_tracing_with_filter(service_name: &str, log_filter: &str) {
    let env_filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_target(false)
        .with_env_filter(env_filter)
        .compact()
        .try_init();

    tracing::info!(service = service_name, "tracing initialized");
}
