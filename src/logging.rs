//! Logging and tracing initialization for the Parcel CLI.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging, honoring `RUST_LOG` when set and falling
/// back to an info-level filter scoped to this crate otherwise.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "parcel=debug" } else { "parcel=info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(false).compact();

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}

#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parcel=debug"));
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_test_writer().with_target(false).compact())
            .try_init()
            .ok();
    });
}
