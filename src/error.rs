//! Error taxonomy for voice-bridge sessions.
//!
//! Every variant is terminal for the current session: there are no
//! automatic retries or reconnects anywhere in the pipeline. The user
//! restarts explicitly.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Microphone access denied or no input device present.
    #[error("Microphone unavailable: {0}")]
    Permission(String),

    /// Missing credentials or a failed connect/setup handshake.
    #[error("Failed to open live session: {0}")]
    TransportOpen(String),

    /// Mid-session transport failure. The session is torn down.
    #[error("Live session failed: {0}")]
    TransportRuntime(String),

    /// Speaker output could not be opened.
    #[error("Audio output unavailable: {0}")]
    Playback(String),
}
