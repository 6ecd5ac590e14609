use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::Engine;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::AudioFrame;
use super::pcm::{encode_pcm16, pcm_mime_type, resample_linear, to_mono};
use crate::live::OutboundMessage;

/// Samples per outbound frame
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Wire-ready microphone frame
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    /// Base64-encoded little-endian 16-bit PCM
    pub data: String,
    /// Format tag, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Position in capture order
    pub sequence: u64,
    pub sample_count: usize,
}

/// Cuts captured audio into fixed-size PCM frames
pub struct CapturePipeline {
    chunk_size: usize,
    sample_rate: u32,
    mime_type: String,
    pending: Vec<f32>,
    sequence: u64,
}

impl CapturePipeline {
    pub fn new(chunk_size: usize, sample_rate: u32) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            sample_rate,
            mime_type: pcm_mime_type(sample_rate),
            pending: Vec::with_capacity(chunk_size * 2),
            sequence: 0,
        }
    }

    /// Add captured samples; returns every frame that became complete
    pub fn push(&mut self, samples: &[f32]) -> Vec<EncodedFrame> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.chunk_size;
        let mut frames = Vec::with_capacity(complete);
        for _ in 0..complete {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            frames.push(self.encode(&chunk));
        }
        frames
    }

    /// Normalize a backend block to mono at the pipeline rate, then frame it
    pub fn push_frame(&mut self, frame: &AudioFrame) -> Vec<EncodedFrame> {
        if frame.channels <= 1 && frame.sample_rate == self.sample_rate {
            return self.push(&frame.samples);
        }

        let mono = to_mono(&frame.samples, frame.channels);
        let samples = resample_linear(&mono, frame.sample_rate, self.sample_rate);
        self.push(&samples)
    }

    /// Samples waiting for a full frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn encode(&mut self, chunk: &[f32]) -> EncodedFrame {
        let bytes = encode_pcm16(chunk);
        let frame = EncodedFrame {
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
            mime_type: self.mime_type.clone(),
            sequence: self.sequence,
            sample_count: chunk.len(),
        };
        self.sequence += 1;
        frame
    }
}

/// Forward captured audio to the outbound queue until either side closes
///
/// Frames are queued without waiting for the network, in capture order.
pub async fn run_capture_pump(
    mut pipeline: CapturePipeline,
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    frames_sent: Arc<AtomicU64>,
) {
    info!("Capture pump started");

    'capture: while let Some(frame) = audio_rx.recv().await {
        for encoded in pipeline.push_frame(&frame) {
            debug!("Queueing microphone frame {}", encoded.sequence);
            if outbound.send(OutboundMessage::Audio(encoded)).is_err() {
                warn!("Outbound queue closed, stopping capture pump");
                break 'capture;
            }
            frames_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    info!("Capture pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_fixed_size() {
        let mut pipeline = CapturePipeline::new(DEFAULT_CHUNK_SIZE, 16000);

        assert!(pipeline.push(&vec![0.0; 4000]).is_empty());
        assert_eq!(pipeline.pending_len(), 4000);

        let frames = pipeline.push(&vec![0.0; 4292]);
        assert_eq!(frames.len(), 2);
        assert_eq!(pipeline.pending_len(), 100);
        assert!(frames.iter().all(|f| f.sample_count == 4096));
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[1].sequence, 1);
        assert_eq!(frames[0].mime_type, "audio/pcm;rate=16000");
    }

    #[test]
    fn test_frame_payload_is_pcm16() {
        let mut pipeline = CapturePipeline::new(2, 16000);
        let frames = pipeline.push(&[0.5, -0.5]);

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&frames[0].data)
            .unwrap();
        assert_eq!(bytes, vec![0x00, 0x40, 0x00, 0xC0]);
    }

    #[test]
    fn test_push_frame_downmixes_stereo() {
        let mut pipeline = CapturePipeline::new(2, 16000);
        let frame = AudioFrame {
            samples: vec![0.5, 0.5, 0.25, 0.25],
            sample_rate: 16000,
            channels: 2,
            timestamp_ms: 0,
        };

        let frames = pipeline.push_frame(&frame);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sample_count, 2);
    }

    #[tokio::test]
    async fn test_pump_preserves_capture_order() {
        let (audio_tx, audio_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(AtomicU64::new(0));

        let pump = tokio::spawn(run_capture_pump(
            CapturePipeline::new(4, 16000),
            audio_rx,
            out_tx,
            Arc::clone(&sent),
        ));

        for i in 0..3 {
            audio_tx
                .send(AudioFrame {
                    samples: vec![0.0; 6],
                    sample_rate: 16000,
                    channels: 1,
                    timestamp_ms: i * 10,
                })
                .await
                .unwrap();
        }
        drop(audio_tx);
        pump.await.unwrap();

        let mut sequences = Vec::new();
        while let Ok(OutboundMessage::Audio(frame)) = out_rx.try_recv() {
            sequences.push(frame.sequence);
        }
        // 18 samples -> four 4-sample frames
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        assert_eq!(sent.load(Ordering::Relaxed), 4);
    }
}
