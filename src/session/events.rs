//! Typed events received over the live session.
//!
//! One `serverContent` frame can carry several signals at once (a
//! transcript delta, an audio chunk and a turn-complete marker may all
//! co-occur), so parsing returns a list rather than a single event.

use base64::{engine::general_purpose, Engine as _};

/// Events demultiplexed from one inbound transport message.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Delta of the transcription of what the user is saying.
    InputTranscript(String),
    /// Delta of the transcription of what the model is saying.
    OutputTranscript(String),
    /// Decoded inline audio payload (raw little-endian 16-bit PCM, 24 kHz).
    Audio(Vec<u8>),
    /// The current user/model exchange is complete.
    TurnComplete,
    /// The user spoke over the model; pending playback must be cancelled.
    Interrupted,
}

/// Demultiplex one inbound message into its events.
///
/// Event order is fixed: interruption first (so playback is cancelled
/// before anything new is scheduled), then transcript deltas, audio, and
/// turn completion last. Unknown fields and non-JSON frames are ignored.
pub fn parse_server_message(msg: &str) -> Vec<LiveEvent> {
    let mut events = Vec::new();

    let Ok(json) = serde_json::from_str::<serde_json::Value>(msg) else {
        return events;
    };
    let Some(server_content) = json.get("serverContent") else {
        return events;
    };

    if server_content
        .get("interrupted")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        events.push(LiveEvent::Interrupted);
    }

    if let Some(text) = server_content
        .get("inputTranscription")
        .and_then(|t| t.get("text"))
        .and_then(|t| t.as_str())
    {
        if !text.is_empty() {
            events.push(LiveEvent::InputTranscript(text.to_string()));
        }
    }

    if let Some(text) = server_content
        .get("outputTranscription")
        .and_then(|t| t.get("text"))
        .and_then(|t| t.as_str())
    {
        if !text.is_empty() {
            events.push(LiveEvent::OutputTranscript(text.to_string()));
        }
    }

    if let Some(parts) = server_content
        .get("modelTurn")
        .and_then(|t| t.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(data) = part
                .get("inlineData")
                .and_then(|d| d.get("data"))
                .and_then(|d| d.as_str())
            {
                if let Ok(bytes) = general_purpose::STANDARD.decode(data) {
                    if !bytes.is_empty() {
                        events.push(LiveEvent::Audio(bytes));
                    }
                }
            }
        }
    }

    if server_content
        .get("turnComplete")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        events.push(LiveEvent::TurnComplete);
    }

    events
}

/// Check if the message indicates setup is complete
pub fn is_setup_complete(msg: &str) -> bool {
    msg.contains("setupComplete")
}

/// Extract a top-level server error message, if present
pub fn parse_error(msg: &str) -> Option<String> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(msg) {
        if let Some(error) = json.get("error") {
            if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                return Some(message.to_string());
            }
            return Some(error.to_string());
        }
    }
    None
}
