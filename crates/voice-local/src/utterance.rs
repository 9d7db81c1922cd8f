//! Utterance assembly: buffers segments until the speaker stops or the
//! duration cap is hit.

use crate::{AudioSegment, FinalizeReason, FinalizedUtterance};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    pub sample_rate_hz: u32,
    /// Silence shorter than this is ordinary inter-word spacing.
    pub short_silence_ms: u64,
    /// Silence at least this long ends the utterance.
    pub long_silence_ms: u64,
    pub max_duration_ms: u64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16000,
            short_silence_ms: 350,
            long_silence_ms: 1200,
            max_duration_ms: 15_000,
        }
    }
}

#[derive(Debug)]
pub enum AssemblerPoll {
    Listening,
    Ready(FinalizedUtterance),
}

#[derive(Debug, Default)]
struct Utterance {
    segments: Vec<AudioSegment>,
    speech_segments: usize,
    silence_ms: u64,
    total_ms: u64,
}

#[derive(Debug)]
enum Phase {
    Collecting,
    Ready(FinalizedUtterance),
    Done,
}

pub struct UtteranceAssembler {
    config: AssemblerConfig,
    current: Utterance,
    phase: Phase,
    dropped_segments: u64,
}

impl UtteranceAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            current: Utterance::default(),
            phase: Phase::Collecting,
            dropped_segments: 0,
        }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Start a new listening cycle, discarding anything buffered.
    pub fn reset(&mut self) {
        self.current = Utterance::default();
        self.phase = Phase::Collecting;
    }

    pub fn feed(&mut self, segment: AudioSegment) {
        if segment.is_empty() {
            self.dropped_segments += 1;
            tracing::warn!("dropping zero-length audio segment");
            return;
        }
        if !matches!(self.phase, Phase::Collecting) {
            tracing::debug!("utterance already finalized, ignoring segment");
            return;
        }

        let duration = segment.duration_ms(self.config.sample_rate_hz);
        let utt = &mut self.current;
        utt.total_ms += duration;

        if segment.has_speech {
            utt.silence_ms = 0;
            utt.speech_segments += 1;
            utt.segments.push(segment);
        } else {
            utt.silence_ms += duration;
            // Leading silence carries nothing worth transcribing.
            if utt.speech_segments > 0 {
                utt.segments.push(segment);
            }
        }

        if utt.silence_ms >= self.config.long_silence_ms {
            self.finalize(FinalizeReason::LongSilence);
        } else if utt.total_ms >= self.config.max_duration_ms {
            self.finalize(FinalizeReason::MaxDuration);
        } else if utt.speech_segments > 0 && utt.silence_ms >= self.config.short_silence_ms {
            tracing::trace!(silence_ms = utt.silence_ms, "short pause, still listening");
        }
    }

    /// Hand out the finalized buffer exactly once per cycle.
    pub fn poll(&mut self) -> AssemblerPoll {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Ready(utterance) => AssemblerPoll::Ready(utterance),
            Phase::Collecting => {
                self.phase = Phase::Collecting;
                AssemblerPoll::Listening
            }
            Phase::Done => AssemblerPoll::Listening,
        }
    }

    /// Speech has been heard and the current silence is a short pause.
    pub fn in_pause(&self) -> bool {
        matches!(self.phase, Phase::Collecting)
            && self.current.speech_segments > 0
            && self.current.silence_ms >= self.config.short_silence_ms
    }

    pub fn silence_ms(&self) -> u64 {
        self.current.silence_ms
    }

    pub fn buffered_ms(&self) -> u64 {
        self.current.total_ms
    }

    pub fn dropped_segments(&self) -> u64 {
        self.dropped_segments
    }

    fn finalize(&mut self, reason: FinalizeReason) {
        let utt = std::mem::take(&mut self.current);
        let samples = if utt.speech_segments == 0 {
            Vec::new()
        } else {
            utt.segments.into_iter().flat_map(|s| s.samples).collect()
        };
        tracing::debug!(
            ?reason,
            duration_ms = utt.total_ms,
            speech_segments = utt.speech_segments,
            "utterance finalized"
        );
        self.phase = Phase::Ready(FinalizedUtterance {
            samples,
            duration_ms: utt.total_ms,
            speech_segments: utt.speech_segments,
            reason,
        });
    }
}

impl Default for UtteranceAssembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}
