//! Fixed-window audio recording.
//!
//! The voice-capture coordinator asks for exactly one window per cycle.
//! There is no cancellation point inside a recording: once started it runs
//! for the full duration.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AudioError;

/// Mono PCM samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Records one fixed-length window from an input device.
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    /// Record for `duration`, returning mono audio at `sample_rate()`.
    async fn record(&self, duration: Duration) -> Result<AudioClip, AudioError>;

    fn sample_rate(&self) -> u32;
}

// =============================================================================
// Sample conversion
// =============================================================================

/// Average interleaved frames down to a single channel.
pub fn downmix(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear resampling. Adequate for speech headed to Whisper.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (input.len() as f64 / ratio).ceil() as usize;
    let last = input.len() - 1;

    (0..output_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx0 = (src.floor() as usize).min(last);
            let idx1 = (idx0 + 1).min(last);
            let frac = (src - idx0 as f64) as f32;
            input[idx0] * (1.0 - frac) + input[idx1] * frac
        })
        .collect()
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Recorder that waits out the window and returns a quiet tone.
///
/// Honors the full duration with `tokio::time::sleep`, so tests running on
/// paused time observe the same timing as a real capture.
#[derive(Debug)]
pub struct MockRecorder {
    sample_rate: u32,
    fail: AtomicBool,
    recordings: AtomicUsize,
}

impl Default for MockRecorder {
    fn default() -> Self {
        Self::new(16_000)
    }
}

impl MockRecorder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            fail: AtomicBool::new(false),
            recordings: AtomicUsize::new(0),
        }
    }

    /// Make subsequent recordings fail with a stream error.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of recordings started.
    pub fn recordings(&self) -> usize {
        self.recordings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioRecorder for MockRecorder {
    async fn record(&self, duration: Duration) -> Result<AudioClip, AudioError> {
        self.recordings.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(duration).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(AudioError::Stream("mock device unplugged".to_string()));
        }

        let n = (duration.as_secs_f64() * self.sample_rate as f64) as usize;
        let rate = self.sample_rate as f32;
        let samples = (0..n)
            .map(|i| 0.05 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate).sin())
            .collect();
        tracing::debug!(samples = n, "Mock recording complete");
        Ok(AudioClip::new(samples, self.sample_rate))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

// =============================================================================
// cpal implementation
// =============================================================================

/// Records from the default input device.
///
/// The stream is opened, held for the window, and dropped on a blocking
/// thread; the device's native format is downmixed and resampled to the
/// target rate afterwards.
#[cfg(feature = "microphone")]
pub struct CpalRecorder {
    sample_rate: u32,
}

#[cfg(feature = "microphone")]
impl CpalRecorder {
    /// Probe for an input device. Fails when none is present.
    pub fn new(sample_rate: u32) -> Result<Self, AudioError> {
        use cpal::traits::{DeviceTrait, HostTrait};

        let device = cpal::default_host()
            .default_input_device()
            .ok_or(AudioError::NoDevice)?;
        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate,
            "Microphone recorder ready"
        );
        Ok(Self { sample_rate })
    }

    fn record_blocking(target_rate: u32, duration: Duration) -> Result<AudioClip, AudioError> {
        use std::sync::{Arc, Mutex};

        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let device = cpal::default_host()
            .default_input_device()
            .ok_or(AudioError::NoDevice)?;
        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::Stream(format!("no input config: {}", e)))?;
        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let device_rate = config.sample_rate.0;
        let device_channels = config.channels;

        let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| tracing::error!(error = %err, "Audio stream error"),
                None,
            )
            .map_err(|e| AudioError::Stream(format!("failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(format!("failed to start input stream: {}", e)))?;
        std::thread::sleep(duration);
        drop(stream);

        let raw = std::mem::take(&mut *buffer.lock().unwrap_or_else(|p| p.into_inner()));
        let mono = downmix(&raw, device_channels);
        let samples = resample(&mono, device_rate, target_rate);

        tracing::debug!(
            device_rate,
            device_channels,
            target_rate,
            samples = samples.len(),
            "Microphone recording complete"
        );
        Ok(AudioClip::new(samples, target_rate))
    }
}

#[cfg(feature = "microphone")]
#[async_trait]
impl AudioRecorder for CpalRecorder {
    async fn record(&self, duration: Duration) -> Result<AudioClip, AudioError> {
        let rate = self.sample_rate;
        tokio::task::spawn_blocking(move || Self::record_blocking(rate, duration))
            .await
            .map_err(|e| AudioError::Stream(format!("recording worker panicked: {}", e)))?
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
