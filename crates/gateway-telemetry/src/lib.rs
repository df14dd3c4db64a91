//! Structured JSON logging init shared by every binary in this workspace.
//! No OTel export or cost/budget metrics: this gateway has no token/cost
//! budget concept and no OTel-pipeline requirement to serve.

#![deny(unsafe_code)]

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initialize structured JSON logging with an `EnvFilter` sourced from
/// `RUST_LOG` (default `info`). Idempotent-enough for tests: a second call
/// in the same process is a harmless no-op since
/// `set_global_default` only succeeds once.
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}
