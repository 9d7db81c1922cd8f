//! voice-local: audio segments, utterance assembly and the local ASR/TTS
//! collaborator contracts, with a mock backend

mod types;
pub use types::{rms_energy, AudioSegment, FinalizeReason, FinalizedUtterance, Transcript};

mod error;
pub use error::{Result, VoiceError};

mod traits;
pub use traits::{HotwordDetector, SegmentSource, SpeechOnsetDetector, SpeechOutput, Transcriber};

mod queue;
pub use queue::SegmentQueue;

mod utterance;
pub use utterance::{AssemblerConfig, AssemblerPoll, UtteranceAssembler};

mod chain;
pub use chain::{SpeechChain, TranscriberChain};

mod capture;
pub use capture::{spawn_capture, CaptureHandle};

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::{MockSpeech, MockTranscriber, ScriptedSource};

#[cfg(feature = "audio")]
pub mod mic;

pub mod plugin;
