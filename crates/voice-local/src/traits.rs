use crate::{AudioSegment, FinalizedUtterance, Result, Transcript};

/// A restartable, possibly endless producer of audio segments.
pub trait SegmentSource {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
    /// Next segment, or `None` once the source is exhausted or stopped.
    fn next_segment(&mut self) -> Option<AudioSegment>;
}

/// Speech-to-text engine contract.
pub trait Transcriber {
    fn name(&self) -> &str;

    /// `Ok(None)` means the engine heard nothing usable. Engines should not
    /// return an error for silence.
    fn transcribe(&mut self, audio: &FinalizedUtterance) -> Result<Option<Transcript>>;
}

/// Text-to-speech output contract. Returns once the text has been rendered.
pub trait SpeechOutput {
    fn name(&self) -> &str {
        "speech"
    }
    fn speak(&mut self, text: &str) -> bool;
}

/// Decides whether an idle assistant should start listening.
pub trait HotwordDetector {
    fn detect(&mut self, segment: &AudioSegment) -> bool;

    fn reset(&mut self) {}
}

/// Wakes on the first speech-flagged segment. Stands in for a real keyword
/// spotter when none is configured.
#[derive(Debug, Default)]
pub struct SpeechOnsetDetector;

impl HotwordDetector for SpeechOnsetDetector {
    fn detect(&mut self, segment: &AudioSegment) -> bool {
        segment.has_speech
    }
}
