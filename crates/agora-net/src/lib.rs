// HTTP and realtime networking against the Agora forum backend.

pub mod backoff;
pub mod error;
pub mod rest;
pub mod socket;

pub use backoff::ReconnectPolicy;
pub use error::{NetError, Result};
pub use rest::ApiClient;
pub use socket::{spawn_socket, SocketCommand, SocketConfig, SocketNotification};
