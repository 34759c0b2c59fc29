use thiserror::Error;

/// Errors produced when encoding or decoding wire frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A frame could not be serialized to JSON.
    #[error("Frame encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Incoming socket text was not a recognizable frame.
    #[error("Frame decode error: {0}")]
    Decode(#[source] serde_json::Error),
}
