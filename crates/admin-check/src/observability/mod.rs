//! Logging and metrics.
//!
//! The library records metrics through the `metrics` facade and logs through
//! `tracing`; installing an exporter is left to the embedding service.

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global tracing subscriber.
///
/// `RUST_LOG` wins over `config.log_level`. A bare level such as `debug`
/// applies to the admin-check targets only. Returns `false` when a subscriber
/// was already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(&config.log_level)))
        .unwrap_or_else(|_| EnvFilter::new("admin_check=info"));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.is_ok()
}

fn default_directive(log_level: &str) -> String {
    if log_level.contains('=') || log_level.contains(',') {
        log_level.to_string()
    } else {
        format!("admin_check={log_level},common={log_level}")
    }
}
