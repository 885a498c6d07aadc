//! Conversation state machine and transcript assembly.

use super::events::LiveEvent;

/// Session status, mutated only by this state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Status {
    /// No session running.
    #[default]
    Idle,
    /// Session open, waiting for user speech.
    Listening,
    /// User speech detected, model has not started answering.
    Thinking,
    /// Model answer is streaming.
    Speaking,
}

/// One side of a completed exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

/// A completed transcript entry.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptTurn {
    pub role: Role,
    pub text: String,
}

/// Tracks status and assembles transcript turns from live events.
///
/// Transitions: idle -> listening -> (thinking | speaking) -> listening
/// -> ... -> idle. A new session starts from a fresh machine; nothing is
/// carried across sessions.
#[derive(Debug, Default)]
pub struct ConversationState {
    status: Status,
    user_buffer: String,
    model_buffer: String,
    transcript: Vec<TranscriptTurn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn transcript(&self) -> &[TranscriptTurn] {
        &self.transcript
    }

    /// The transport handshake finished; the session is live.
    pub fn session_opened(&mut self) {
        self.status = Status::Listening;
    }

    /// The session closed or failed. Accumulation is reset unconditionally.
    pub fn session_closed(&mut self) {
        self.status = Status::Idle;
        self.user_buffer.clear();
        self.model_buffer.clear();
        self.transcript.clear();
    }

    /// Ingest one event. Audio payloads do not pass through here; the
    /// playback scheduler consumes them directly.
    pub fn ingest(&mut self, event: &LiveEvent) {
        match event {
            LiveEvent::InputTranscript(delta) => {
                self.user_buffer.push_str(delta);
                if self.status != Status::Thinking {
                    self.status = Status::Thinking;
                }
            }
            LiveEvent::OutputTranscript(delta) => {
                self.model_buffer.push_str(delta);
                self.status = Status::Speaking;
            }
            LiveEvent::TurnComplete => {
                self.flush_turn();
                self.status = Status::Listening;
            }
            LiveEvent::Interrupted => {
                // Only audio is cancelled on barge-in; accumulated
                // transcript text is kept for the eventual turn flush.
                self.status = Status::Listening;
            }
            LiveEvent::Audio(_) => {}
        }
    }

    /// Flush accumulated text as user-then-model turns, skipping empty sides.
    fn flush_turn(&mut self) {
        let user = self.user_buffer.trim().to_string();
        let model = self.model_buffer.trim().to_string();
        self.user_buffer.clear();
        self.model_buffer.clear();

        if !user.is_empty() {
            self.transcript.push(TranscriptTurn {
                role: Role::User,
                text: user,
            });
        }
        if !model.is_empty() {
            self.transcript.push(TranscriptTurn {
                role: Role::Model,
                text: model,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_transitions_to_listening() {
        let mut state = ConversationState::new();
        assert_eq!(state.status(), Status::Idle);
        state.session_opened();
        assert_eq!(state.status(), Status::Listening);
    }

    #[test]
    fn input_delta_means_thinking_output_delta_means_speaking() {
        let mut state = ConversationState::new();
        state.session_opened();
        state.ingest(&LiveEvent::InputTranscript("hi".to_string()));
        assert_eq!(state.status(), Status::Thinking);
        state.ingest(&LiveEvent::OutputTranscript("salut".to_string()));
        assert_eq!(state.status(), Status::Speaking);
    }

    #[test]
    fn model_only_turn_emits_one_entry() {
        let mut state = ConversationState::new();
        state.session_opened();
        state.ingest(&LiveEvent::OutputTranscript("Hola".to_string()));
        assert_eq!(state.status(), Status::Speaking);
        state.ingest(&LiveEvent::TurnComplete);
        assert_eq!(state.status(), Status::Listening);
        assert_eq!(
            state.transcript(),
            &[TranscriptTurn {
                role: Role::Model,
                text: "Hola".to_string()
            }]
        );
    }

    #[test]
    fn both_sides_emit_user_then_model() {
        let mut state = ConversationState::new();
        state.session_opened();
        state.ingest(&LiveEvent::InputTranscript("hello ".to_string()));
        state.ingest(&LiveEvent::InputTranscript("there".to_string()));
        state.ingest(&LiveEvent::OutputTranscript("hola".to_string()));
        state.ingest(&LiveEvent::TurnComplete);
        let turns = state.transcript();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "hello there");
        assert_eq!(turns[1].role, Role::Model);
    }

    #[test]
    fn whitespace_only_text_is_suppressed() {
        let mut state = ConversationState::new();
        state.session_opened();
        state.ingest(&LiveEvent::InputTranscript("  \n".to_string()));
        state.ingest(&LiveEvent::TurnComplete);
        assert!(state.transcript().is_empty());
    }

    #[test]
    fn interruption_keeps_accumulated_text() {
        let mut state = ConversationState::new();
        state.session_opened();
        state.ingest(&LiveEvent::OutputTranscript("partial".to_string()));
        state.ingest(&LiveEvent::Interrupted);
        assert_eq!(state.status(), Status::Listening);
        state.ingest(&LiveEvent::TurnComplete);
        assert_eq!(state.transcript().len(), 1);
        assert_eq!(state.transcript()[0].text, "partial");
    }

    #[test]
    fn close_resets_everything() {
        let mut state = ConversationState::new();
        state.session_opened();
        state.ingest(&LiveEvent::OutputTranscript("hola".to_string()));
        state.ingest(&LiveEvent::TurnComplete);
        state.session_closed();
        assert_eq!(state.status(), Status::Idle);
        assert!(state.transcript().is_empty());
    }
}
