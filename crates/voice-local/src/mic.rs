//! Default microphone as a segment producer (feature `audio`).

use crate::{AudioSegment, SegmentQueue, VoiceError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

type Result<T, E = VoiceError> = core::result::Result<T, E>;

pub struct MicStream {
    _stream: cpal::Stream,
}

pub struct MicConfig {
    pub sample_rate_hz: u32,
    pub channels: u16,
}

/// Samples per emitted segment at the device rate (~30 ms at 16 kHz is 480).
const SEGMENT_FRAMES: usize = 480;

/// Open the default input device and push mono segments into `queue`.
/// Segments whose energy reaches `speech_threshold` are flagged as speech.
pub fn start_default_input_segments(
    queue: SegmentQueue,
    speech_threshold: f32,
) -> Result<(MicStream, MicConfig)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::Device("no default input device".into()))?;
    let config = device
        .default_input_config()
        .map_err(|e| VoiceError::Device(format!("input config: {e}")))?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels();
    let err_fn = |err| tracing::error!("input stream error: {err}");

    let mut buf = Vec::<i16>::with_capacity(SEGMENT_FRAMES * 2);
    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _| {
                let mono = data.chunks_exact(channels as usize).map(|f| f[0]);
                emit(mono, &mut buf, &queue, speech_threshold);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config.into(),
            move |data: &[u16], _| {
                let mono = data
                    .chunks_exact(channels as usize)
                    .map(|f| (f[0] as i32 - 32768) as i16);
                emit(mono, &mut buf, &queue, speech_threshold);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _| {
                let mono = data
                    .chunks_exact(channels as usize)
                    .map(|f| (f[0].clamp(-1.0, 1.0) * 32767.0) as i16);
                emit(mono, &mut buf, &queue, speech_threshold);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(VoiceError::Device(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| VoiceError::Device(format!("build stream: {e}")))?;

    stream
        .play()
        .map_err(|e| VoiceError::Device(format!("stream play: {e}")))?;
    Ok((
        MicStream { _stream: stream },
        MicConfig {
            sample_rate_hz: sample_rate,
            channels,
        },
    ))
}

fn emit(
    mono: impl Iterator<Item = i16>,
    buf: &mut Vec<i16>,
    queue: &SegmentQueue,
    speech_threshold: f32,
) {
    buf.extend(mono);
    while buf.len() >= SEGMENT_FRAMES {
        let rest = buf.split_off(SEGMENT_FRAMES);
        let chunk = std::mem::replace(buf, rest);
        queue.push(AudioSegment::from_pcm(chunk, speech_threshold));
    }
}
