//! Logging initialization.
//!
//! The log level is controlled by the `RUST_LOG` environment variable and
//! defaults to `info`:
//!
//! ```bash
//! RUST_LOG=debug cargo run
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with sensible defaults. Call once at startup, before
/// the server is created.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
