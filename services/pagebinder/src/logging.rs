//! Logging setup.
//!
//! Noisy library modules (hyper, reqwest, rustls, ...) are set to `warn`
//! so business logs stay readable at `debug`. `RUST_LOG` overrides
//! everything when set.

use tracing_subscriber::EnvFilter;

/// Modules filtered to `warn` level by default.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tokio_util",
    "tower_http",
    "chromiumoxide",
];

fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = String::from(log_level);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{module}=warn"));
    }

    EnvFilter::new(&directives)
}

/// Initialize logging with the given base level.
pub fn init_logging(log_level: &str) {
    let filter = build_filter(log_level);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_target(true)
        .try_init();

    tracing::info!(
        log_level = %log_level,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}
