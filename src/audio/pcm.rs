// Linear PCM helpers
//
// Outbound audio is quantized from f32 to 16-bit signed integers by scaling
// with 32768 and truncating. Values are NOT clamped: a sample at or above 1.0
// wraps around, which matches what the remote service has always received.
// Inbound audio is little-endian 16-bit PCM, interleaved across channels.

use base64::Engine;

use crate::error::{Result, VoiceError};

/// Scale factor between normalized f32 samples and 16-bit PCM
pub const PCM_SCALE: f32 = 32768.0;

/// MIME-like tag declaring raw 16-bit PCM at the given rate
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Quantize one normalized sample (truncating, wrapping on overflow)
pub fn float_to_pcm16(sample: f32) -> i16 {
    (sample * PCM_SCALE) as i32 as i16
}

/// Quantize a block of samples into little-endian PCM bytes
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| float_to_pcm16(s).to_le_bytes())
        .collect()
}

/// A decoded, playable block of audio (one plane per channel)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average all channels into a single plane
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Decode little-endian 16-bit PCM into a de-interleaved buffer
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    if channels == 0 {
        return Err(VoiceError::DecodeFailure("channel count is zero".into()));
    }
    if bytes.is_empty() {
        return Err(VoiceError::DecodeFailure("empty audio payload".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::DecodeFailure(format!(
            "odd byte count {} for 16-bit PCM",
            bytes.len()
        )));
    }

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    let channel_count = channels as usize;
    if samples.len() % channel_count != 0 {
        return Err(VoiceError::DecodeFailure(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            channel_count
        )));
    }

    let frame_count = samples.len() / channel_count;
    let planes = (0..channel_count)
        .map(|channel| {
            (0..frame_count)
                .map(|i| samples[i * channel_count + channel] as f32 / PCM_SCALE)
                .collect()
        })
        .collect();

    Ok(AudioBuffer {
        sample_rate,
        channels: planes,
    })
}

/// Decode a base64 wire payload of 16-bit PCM
pub fn decode_base64_pcm16(data: &str, sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| VoiceError::DecodeFailure(format!("invalid base64: {}", e)))?;
    decode_pcm16(&bytes, sample_rate, channels)
}

/// Convert interleaved multi-channel audio to mono by averaging channels
pub fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler, good enough for speech
pub fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }

    let out_len = (samples.len() as f64 * dst_rate as f64 / src_rate as f64) as usize;
    resample_to_len(samples, out_len)
}

/// Stretch or squeeze `samples` to exactly `out_len` samples
pub fn resample_to_len(samples: &[f32], out_len: usize) -> Vec<f32> {
    if samples.is_empty() || out_len == 0 {
        return Vec::new();
    }
    if out_len == samples.len() {
        return samples.to_vec();
    }

    let ratio = samples.len() as f64 / out_len as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = pos - idx as f64;
            if idx < last {
                (samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac) as f32
            } else {
                samples[idx.min(last)]
            }
        })
        .collect()
}
