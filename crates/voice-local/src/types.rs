use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One chunk of captured audio as delivered by a segment source.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub samples: Vec<i16>,
    /// Normalized RMS energy, 0.0 and up.
    pub energy: f32,
    pub has_speech: bool,
    pub captured_at: OffsetDateTime,
}

impl AudioSegment {
    pub fn new(samples: Vec<i16>, energy: f32, has_speech: bool) -> Self {
        Self {
            samples,
            energy: energy.max(0.0),
            has_speech,
            captured_at: OffsetDateTime::now_utc(),
        }
    }

    /// Build a segment from raw PCM, classifying it as speech when its energy
    /// reaches `speech_threshold`.
    pub fn from_pcm(samples: Vec<i16>, speech_threshold: f32) -> Self {
        let energy = rms_energy(&samples);
        Self::new(samples, energy, energy >= speech_threshold)
    }

    /// A segment of digital silence lasting `duration_ms` at `sample_rate_hz`.
    pub fn silence(duration_ms: u32, sample_rate_hz: u32) -> Self {
        let n = samples_for(duration_ms, sample_rate_hz);
        Self::new(vec![0; n], 0.0, false)
    }

    /// A flat speech-flagged segment, mostly useful for scripted sources.
    pub fn speech(duration_ms: u32, sample_rate_hz: u32) -> Self {
        let n = samples_for(duration_ms, sample_rate_hz);
        Self::new(vec![4000; n], 0.12, true)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self, sample_rate_hz: u32) -> u64 {
        if sample_rate_hz == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / sample_rate_hz as u64
    }
}

fn samples_for(duration_ms: u32, sample_rate_hz: u32) -> usize {
    (duration_ms as u64 * sample_rate_hz as u64 / 1000) as usize
}

/// Root-mean-square energy of S16 PCM, scaled to 0.0..=1.0.
pub fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|s| {
            let v = *s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FinalizeReason {
    LongSilence,
    MaxDuration,
}

/// Immutable audio buffer produced once per listening cycle.
#[derive(Debug, Clone)]
pub struct FinalizedUtterance {
    pub samples: Vec<i16>,
    pub duration_ms: u64,
    pub speech_segments: usize,
    pub reason: FinalizeReason,
}

impl FinalizedUtterance {
    /// True when the cycle ended without any speech; transcription can be skipped.
    pub fn is_empty(&self) -> bool {
        self.speech_segments == 0 || self.samples.is_empty()
    }
}

/// Text produced by a transcription engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
    pub engine: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_of_silence_is_zero() {
        assert_eq!(rms_energy(&[0; 160]), 0.0);
        assert_eq!(rms_energy(&[]), 0.0);
    }

    #[test]
    fn test_from_pcm_classifies_speech() {
        let loud = AudioSegment::from_pcm(vec![8000; 160], 0.05);
        assert!(loud.has_speech);
        let quiet = AudioSegment::from_pcm(vec![10; 160], 0.05);
        assert!(!quiet.has_speech);
    }

    #[test]
    fn test_duration_from_sample_rate() {
        let seg = AudioSegment::silence(100, 16000);
        assert_eq!(seg.samples.len(), 1600);
        assert_eq!(seg.duration_ms(16000), 100);
        assert_eq!(seg.duration_ms(0), 0);
    }
}
