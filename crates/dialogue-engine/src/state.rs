use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogueState {
    /// Waiting for a hotword or a manual trigger.
    Idle,
    /// The utterance assembler is collecting audio.
    Listening,
    /// Transcription and intent resolution in flight.
    Processing,
    /// Waiting for a yes/no before executing a doubtful intent.
    IntentValidation,
    /// A request is outstanding at the dispatcher.
    AwaitResponse,
    /// Rendering the reply.
    Speaking,
}

impl DialogueState {
    pub fn as_str(self) -> &'static str {
        match self {
            DialogueState::Idle => "IDLE",
            DialogueState::Listening => "LISTENING",
            DialogueState::Processing => "PROCESSING",
            DialogueState::IntentValidation => "INTENT_VALIDATION",
            DialogueState::AwaitResponse => "AWAIT_RESPONSE",
            DialogueState::Speaking => "SPEAKING",
        }
    }
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
