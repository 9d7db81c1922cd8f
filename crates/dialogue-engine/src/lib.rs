//! Dialogue engine for the voice command assistant
//!
//! [`DialogueMachine`] drives one conversation: it assembles utterances from
//! audio segments, has them transcribed and resolved, asks for confirmation
//! when the intent is doubtful, dispatches the command and speaks the result.
//! The [`adapters`] turn raw front-end input into core requests and core
//! responses back into front-end output.

pub mod adapters;
mod confirm;
mod error;
mod events;
mod machine;
pub mod narration;
mod state;

pub use adapters::{
    AdapterContext, ApiAdapter, CliAdapter, FrontendAdapter, SpeechAdapter, SpokenReply,
};
pub use confirm::ConfirmationAnswer;
pub use error::{DialogueError, Result};
pub use events::DialogueEvent;
pub use machine::{
    needs_validation, DialogueConfig, DialogueHandle, DialogueMachine, RunOutcome,
    AUTO_EXECUTE_THRESHOLD,
};
pub use state::DialogueState;
