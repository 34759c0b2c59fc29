// Chat session logic for the Agora client: pagination, presence, reconnect.

pub mod auth;
pub mod client;
pub mod config;
pub mod history;
pub mod presence;
pub mod session;
pub mod throttle;

use tracing_subscriber::{fmt, EnvFilter};

pub use crate::auth::SessionHandle;
pub use crate::client::ChatClient;
pub use crate::config::ClientConfig;
pub use crate::session::{ChatApi, SessionCommand, SessionEvent};

/// Install the global tracing subscriber (respects `RUST_LOG`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agora_client=debug,agora_net=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
