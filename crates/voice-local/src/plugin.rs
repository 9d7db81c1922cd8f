#[cfg(feature = "mock")]
use crate::{MockSpeech, MockTranscriber};
use crate::{SpeechOutput, Transcriber, VoiceError};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TranscriberBackendKind {
    Mock,
    WhisperCpp,
    Vosk,
}

impl std::str::FromStr for TranscriberBackendKind {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mock" => Ok(Self::Mock),
            "whisper_cpp" => Ok(Self::WhisperCpp),
            "vosk" => Ok(Self::Vosk),
            other => Err(VoiceError::BackendUnavailable(format!(
                "unknown transcriber backend: {other}"
            ))),
        }
    }
}

/// Instantiate a transcription backend. The mock replays `script`.
pub fn new_transcriber_backend(
    kind: TranscriberBackendKind,
    script: Vec<String>,
) -> Result<Box<dyn Transcriber + Send>, VoiceError> {
    match kind {
        TranscriberBackendKind::Mock => {
            #[cfg(feature = "mock")]
            {
                Ok(Box::new(MockTranscriber::scripted("mock", script)))
            }
            #[cfg(not(feature = "mock"))]
            {
                let _ = script;
                Err(VoiceError::BackendUnavailable("mock feature not enabled".into()))
            }
        }
        TranscriberBackendKind::WhisperCpp => Err(VoiceError::BackendUnavailable(
            "whisper_cpp backend not yet integrated".into(),
        )),
        TranscriberBackendKind::Vosk => Err(VoiceError::BackendUnavailable(
            "vosk backend not yet integrated".into(),
        )),
    }
}

/// Instantiate the default speech output.
pub fn new_speech_backend() -> Result<Box<dyn SpeechOutput + Send>, VoiceError> {
    #[cfg(feature = "mock")]
    {
        Ok(Box::new(MockSpeech::new()))
    }
    #[cfg(not(feature = "mock"))]
    {
        Err(VoiceError::BackendUnavailable("no speech backend compiled in".into()))
    }
}
