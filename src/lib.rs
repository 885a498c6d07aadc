//! Live voice-bridge translation sessions over the Gemini Live API.
//!
//! The pipeline: microphone capture (16 kHz mono, 4096-sample frames) ->
//! 16-bit PCM + base64 encoding -> one persistent bidirectional WebSocket
//! -> demultiplexed transcript/audio/turn events -> gapless 24 kHz
//! playback with barge-in cancellation, plus a conversation state
//! machine feeding `(status, transcript)` to the surrounding UI.

pub mod config;
pub mod error;
pub mod languages;
pub mod session;

pub use config::{load_config, save_config, Config};
pub use error::SessionError;
pub use session::{Role, SessionOptions, Status, TranscriptTurn, VoiceSession};
