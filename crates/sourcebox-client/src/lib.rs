//! # sourcebox-client
//!
//! The source-side session: loads configuration and trusted roots, keeps the
//! sealed user state and sending queue in a blob store, and drives the
//! protocol core for sending messages and collecting replies.

pub mod config;
pub mod queue_handle;
pub mod session;
pub mod trusted_roots;

mod error;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use queue_handle::SendingQueueHandle;
pub use session::Session;
pub use trusted_roots::{load_trusted_roots, parse_trusted_roots};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `tracing` subscriber. Honours `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sourcebox_client=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
