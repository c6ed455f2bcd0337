use std::sync::Arc;
use std::time::Duration;

use crate::foundation::error::{ReelError, ReelResult};
use crate::narration::NarrationError;

/// Layout of headerless PCM returned by the synthesizer (signed 16-bit little-endian).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
        }
    }
}

impl PcmFormat {
    pub fn validate(self) -> ReelResult<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(ReelError::validation(format!(
                "pcm sample_rate {} out of range 8000..=192000",
                self.sample_rate
            )));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(ReelError::validation(format!(
                "pcm channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        Ok(())
    }
}

/// Decoded narration audio: interleaved `f32` samples in `[-1, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct NarrationClip {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl NarrationClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> ReelResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(ReelError::validation(
                "clip sample_rate and channels must be > 0",
            ));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(ReelError::validation(
                "clip sample count must be a multiple of channels",
            ));
        }
        Ok(Self {
            samples: samples.into(),
            sample_rate,
            channels,
        })
    }

    /// Silent clip lasting `duration`; handy for tests and placeholders.
    pub fn silence(duration: Duration, sample_rate: u32, channels: u16) -> Self {
        let frames = (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize;
        Self {
            samples: vec![0.0; frames * usize::from(channels.max(1))].into(),
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration(&self) -> Duration {
        let nanos = self.frames() as u128 * 1_000_000_000 / u128::from(self.sample_rate);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Decode a synthesizer payload: RIFF/WAVE via `hound`, anything else as raw s16le in `pcm`.
    pub fn decode(bytes: &[u8], pcm: PcmFormat) -> Result<Self, NarrationError> {
        if bytes.is_empty() {
            return Err(NarrationError::Decode("empty audio payload".to_owned()));
        }
        if bytes.starts_with(b"RIFF") {
            return decode_wav(bytes);
        }

        let frame_bytes = 2 * usize::from(pcm.channels.max(1));
        let usable = bytes.len() - bytes.len() % frame_bytes;
        if usable != bytes.len() {
            tracing::warn!(
                dropped = bytes.len() - usable,
                "raw pcm payload ends mid-frame; truncating"
            );
        }
        let samples = bytes[..usable]
            .chunks_exact(2)
            .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / f32::from(i16::MAX))
            .collect();
        Self::new(samples, pcm.sample_rate, pcm.channels)
            .map_err(|e| NarrationError::Decode(e.to_string()))
    }
}

fn decode_wav(bytes: &[u8]) -> Result<NarrationClip, NarrationError> {
    let decode_err = |e: hound::Error| NarrationError::Decode(format!("invalid WAV payload: {e}"));
    let mut reader = hound::WavReader::new(std::io::Cursor::new(bytes)).map_err(decode_err)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / f32::from(i16::MAX)))
            .collect::<Result<_, _>>()
            .map_err(decode_err)?,
        (hound::SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1u32 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        }
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_err)?,
        (format, bits) => {
            return Err(NarrationError::Decode(format!(
                "unsupported WAV format {format:?}/{bits} bit"
            )));
        }
    };

    NarrationClip::new(samples, spec.sample_rate, spec.channels)
        .map_err(|e| NarrationError::Decode(e.to_string()))
}
