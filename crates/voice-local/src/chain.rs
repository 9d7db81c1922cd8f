//! Ordered fallback chains over transcription and speech backends.

use crate::{FinalizedUtterance, SpeechOutput, Transcriber, Transcript, VoiceError};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct TranscriberChain {
    engines: Vec<Box<dyn Transcriber + Send>>,
}

impl TranscriberChain {
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
        }
    }

    pub fn with_engine(mut self, engine: Box<dyn Transcriber + Send>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn push(&mut self, engine: Box<dyn Transcriber + Send>) {
        self.engines.push(engine);
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn engine_names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name().to_string()).collect()
    }

    /// Try each engine in order until one produces non-empty text.
    ///
    /// Empty audio short-circuits to `Ok(None)`. `cancelled` is checked
    /// between engines; once set, the chain stops with `VoiceError::Cancelled`.
    pub fn try_transcribe(
        &mut self,
        audio: &FinalizedUtterance,
        cancelled: &AtomicBool,
    ) -> Result<Option<Transcript>, VoiceError> {
        if audio.is_empty() {
            return Ok(None);
        }
        let mut last_error = None;
        for engine in &mut self.engines {
            if cancelled.load(Ordering::Acquire) {
                return Err(VoiceError::Cancelled);
            }
            match engine.transcribe(audio) {
                Ok(Some(t)) if !t.text.trim().is_empty() => {
                    tracing::debug!(engine = engine.name(), confidence = t.confidence, "transcribed");
                    return Ok(Some(t));
                }
                Ok(_) => {
                    tracing::debug!(engine = engine.name(), "engine returned no text");
                }
                Err(e) => {
                    tracing::warn!(engine = engine.name(), "transcription engine failed: {}", e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

impl Default for TranscriberChain {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SpeechChain {
    outputs: Vec<Box<dyn SpeechOutput + Send>>,
}

impl SpeechChain {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
        }
    }

    pub fn with_output(mut self, output: Box<dyn SpeechOutput + Send>) -> Self {
        self.outputs.push(output);
        self
    }

    /// Speak through the first output that succeeds.
    pub fn try_speak(&mut self, text: &str) -> bool {
        for output in &mut self.outputs {
            if output.speak(text) {
                return true;
            }
            tracing::warn!(output = output.name(), "speech output failed, trying next");
        }
        false
    }
}

impl Default for SpeechChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechOutput for SpeechChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn speak(&mut self, text: &str) -> bool {
        self.try_speak(text)
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::{FinalizeReason, MockSpeech, MockTranscriber};

    fn utterance(speech_segments: usize) -> FinalizedUtterance {
        FinalizedUtterance {
            samples: if speech_segments > 0 { vec![1; 160] } else { Vec::new() },
            duration_ms: 10,
            speech_segments,
            reason: FinalizeReason::LongSilence,
        }
    }

    #[test]
    fn test_falls_through_failing_engine() {
        let mut chain = TranscriberChain::new()
            .with_engine(Box::new(MockTranscriber::failing("broken")))
            .with_engine(Box::new(MockTranscriber::scripted("backup", ["quelle heure est-il"])));
        let out = chain
            .try_transcribe(&utterance(1), &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert_eq!(out.engine, "backup");
        assert_eq!(out.text, "quelle heure est-il");
    }

    #[test]
    fn test_empty_audio_skips_engines() {
        let engine = MockTranscriber::scripted("only", ["never used"]);
        let calls = engine.calls();
        let mut chain = TranscriberChain::new().with_engine(Box::new(engine));
        let out = chain
            .try_transcribe(&utterance(0), &AtomicBool::new(false))
            .unwrap();
        assert!(out.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_before_first_engine() {
        let mut chain = TranscriberChain::new()
            .with_engine(Box::new(MockTranscriber::scripted("a", ["text"])));
        let res = chain.try_transcribe(&utterance(1), &AtomicBool::new(true));
        assert!(matches!(res, Err(VoiceError::Cancelled)));
    }

    #[test]
    fn test_speech_chain_uses_first_working_output() {
        let working = MockSpeech::new();
        let log = working.spoken();
        let mut chain = SpeechChain::new()
            .with_output(Box::new(MockSpeech::failing()))
            .with_output(Box::new(working));
        assert!(chain.try_speak("bonjour"));
        assert_eq!(log.lock().as_slice(), ["bonjour".to_string()]);
    }
}
