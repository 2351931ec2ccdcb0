use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    EnvFilter,
};

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "solar_ingestion_service=info";

/// Install the global subscriber. A second call is a no-op, so binaries and
/// tests can both call it.
pub fn init_tracing(default_directive: &str) {
    let directive: Directive = default_directive
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
