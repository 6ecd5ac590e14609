// Integration tests for WAV file input
//
// These tests write small WAV fixtures to a temp dir and verify they load and
// replay through the capture path correctly.

use std::path::{Path, PathBuf};

use anyhow::Result;
use studio_voice::audio::{
    AudioFile, CaptureBackend, CaptureConfig, CapturePipeline, WavFileBackend,
};
use studio_voice::VoiceError;
use tempfile::TempDir;

fn write_wav(dir: &Path, name: &str, sample_rate: u32, channels: u16, samples: &[i16]) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "tone.wav", 16000, 1, &vec![8192; 16000])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 16000);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    assert_eq!(audio.samples[0], 0.25);
    assert!(audio.path.contains("tone.wav"));
    Ok(())
}

#[test]
fn test_stereo_file_is_downmixed() -> Result<()> {
    let dir = TempDir::new()?;
    // left at 0.5, right silent
    let interleaved: Vec<i16> = (0..800).flat_map(|_| [16384, 0]).collect();
    let path = write_wav(dir.path(), "stereo.wav", 16000, 2, &interleaved)?;

    let audio = AudioFile::open(&path)?;
    let mono = audio.to_mono(16000);

    assert_eq!(audio.channels, 2);
    assert!((audio.duration_seconds - 0.05).abs() < 1e-9);
    assert_eq!(mono.len(), 800);
    assert!(mono.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");
    let result = AudioFile::open(&path);

    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[tokio::test]
async fn test_missing_file_is_device_unavailable() {
    let mut backend = WavFileBackend::new(
        PathBuf::from("/nonexistent/input.wav"),
        CaptureConfig::default(),
    );

    let err = backend.acquire().await.unwrap_err();
    assert!(matches!(err, VoiceError::DeviceUnavailable(_)));
}

#[tokio::test]
async fn test_file_replay_feeds_capture_pipeline() -> Result<()> {
    let dir = TempDir::new()?;
    // 48kHz on disk, 10240 samples once resampled to 16kHz
    let path = write_wav(dir.path(), "speech.wav", 48000, 1, &vec![4096; 30720])?;

    let mut backend = WavFileBackend::new(path, CaptureConfig::default()).without_pacing();
    backend.acquire().await?;
    let mut audio_rx = backend.start().await?;

    let mut pipeline = CapturePipeline::new(4096, 16000);
    let mut frames = Vec::new();
    while let Some(block) = audio_rx.recv().await {
        assert_eq!(block.sample_rate, 16000);
        frames.extend(pipeline.push_frame(&block));
    }

    assert_eq!(frames.len(), 2);
    assert_eq!(pipeline.pending_len(), 2048);
    assert!(frames.iter().enumerate().all(|(i, f)| f.sequence == i as u64));

    backend.stop().await?;
    assert!(!backend.is_capturing());
    Ok(())
}
