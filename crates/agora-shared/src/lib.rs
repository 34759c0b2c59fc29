// Shared types for the Agora client: wire frames, REST payloads, constants.

pub mod constants;
pub mod error;
pub mod forum;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{ClientFrame, ServerFrame};
pub use types::{Credentials, Message, PresenceEntry, Registration, Session, UserId};
