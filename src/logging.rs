//! Tracing setup.

use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` overrides the per-environment
/// defaults; production logs JSON, everything else pretty-prints with source
/// locations.
pub fn init_logging(env: &Environment) {
    let default_filter = match env {
        Environment::Dev => "boqgen_backend=debug,tower_http=debug,info",
        Environment::Staging => "boqgen_backend=debug,tower_http=info,info",
        Environment::Prod => "boqgen_backend=info,tower_http=info,warn",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    if env.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .init();
    }

    tracing::info!(env = ?env, "logging initialized");
}
