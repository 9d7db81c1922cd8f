use crate::DialogueState;
use command_core::CoreResponse;
use intent_parser::IntentResult;

/// Observable progress of a dialogue machine.
#[derive(Debug, Clone)]
pub enum DialogueEvent {
    StateChanged {
        from: DialogueState,
        to: DialogueState,
    },
    /// Text handed to the speech output.
    Narration(String),
    IntentResolved(IntentResult),
    Response(CoreResponse),
    /// The user ended the conversation; the machine accepts no more input.
    Finished,
}

pub(crate) type EventCallback = Box<dyn Fn(&DialogueEvent) + Send + Sync>;
