use crate::{
    AudioSegment, FinalizedUtterance, Result, SegmentSource, SpeechOutput, Transcriber,
    Transcript, VoiceError,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Replays a fixed list of segments. Restartable: `start` rewinds.
pub struct ScriptedSource {
    script: Vec<AudioSegment>,
    cursor: usize,
    running: bool,
}

impl ScriptedSource {
    pub fn new(script: Vec<AudioSegment>) -> Self {
        Self {
            script,
            cursor: 0,
            running: false,
        }
    }

    /// One spoken turn: `speech_ms` of speech followed by `silence_ms` of silence,
    /// in 100 ms segments.
    pub fn turn(speech_ms: u32, silence_ms: u32, sample_rate_hz: u32) -> Vec<AudioSegment> {
        let mut out = Vec::new();
        for _ in 0..(speech_ms / 100).max(1) {
            out.push(AudioSegment::speech(100, sample_rate_hz));
        }
        for _ in 0..silence_ms / 100 {
            out.push(AudioSegment::silence(100, sample_rate_hz));
        }
        out
    }
}

impl SegmentSource for ScriptedSource {
    fn start(&mut self) -> Result<()> {
        self.cursor = 0;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn next_segment(&mut self) -> Option<AudioSegment> {
        if !self.running {
            return None;
        }
        let seg = self.script.get(self.cursor).cloned();
        self.cursor += 1;
        seg
    }
}

enum MockBehavior {
    Scripted(VecDeque<String>),
    Failing,
}

/// Returns scripted texts in order, then `None`.
pub struct MockTranscriber {
    name: String,
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    pub fn scripted<I, S>(name: &str, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            behavior: MockBehavior::Scripted(texts.into_iter().map(Into::into).collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            behavior: MockBehavior::Failing,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `transcribe` invocations.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Transcriber for MockTranscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn transcribe(&mut self, _audio: &FinalizedUtterance) -> Result<Option<Transcript>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &mut self.behavior {
            MockBehavior::Failing => Err(VoiceError::Transcription(format!(
                "{} is not available",
                self.name
            ))),
            MockBehavior::Scripted(texts) => Ok(texts.pop_front().map(|text| Transcript {
                text,
                confidence: 0.9,
                engine: self.name.clone(),
            })),
        }
    }
}

/// Records everything it is asked to say.
pub struct MockSpeech {
    sample_rate_hz: u32,
    working: bool,
    spoken: Arc<Mutex<Vec<String>>>,
    rendered_samples: usize,
}

impl MockSpeech {
    pub fn new() -> Self {
        Self {
            sample_rate_hz: 22050,
            working: true,
            spoken: Arc::new(Mutex::new(Vec::new())),
            rendered_samples: 0,
        }
    }

    pub fn failing() -> Self {
        Self {
            working: false,
            ..Self::new()
        }
    }

    pub fn spoken(&self) -> Arc<Mutex<Vec<String>>> {
        self.spoken.clone()
    }

    pub fn rendered_samples(&self) -> usize {
        self.rendered_samples
    }
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechOutput for MockSpeech {
    fn name(&self) -> &str {
        "mock"
    }

    fn speak(&mut self, text: &str) -> bool {
        if !self.working {
            return false;
        }
        self.rendered_samples += render_tone(text, self.sample_rate_hz).len();
        self.spoken.lock().push(text.to_string());
        true
    }
}

/// A short 440Hz sine placeholder in S16LE, length scaled by text length.
fn render_tone(text: &str, sample_rate_hz: u32) -> Vec<i16> {
    let sr = sample_rate_hz.max(8000);
    let dur_s = (text.len() as f32 / 10.0).clamp(0.2, 1.0);
    let frames = (sr as f32 * dur_s) as usize;
    let freq = 440.0_f32;
    (0..frames)
        .map(|n| {
            let t = n as f32 / sr as f32;
            ((2.0 * std::f32::consts::PI * freq * t).sin() * 3000.0) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_source_restarts() {
        let mut src = ScriptedSource::new(ScriptedSource::turn(200, 300, 16000));
        assert!(src.next_segment().is_none());
        src.start().unwrap();
        let first_pass = std::iter::from_fn(|| src.next_segment()).count();
        assert_eq!(first_pass, 5);
        src.start().unwrap();
        assert!(src.next_segment().is_some());
        src.stop();
        assert!(src.next_segment().is_none());
    }

    #[test]
    fn test_mock_speech_renders_placeholder() {
        let mut speech = MockSpeech::new();
        assert!(speech.speak("au revoir"));
        assert!(speech.rendered_samples() > 0);
        assert!(!MockSpeech::failing().speak("x"));
    }
}
