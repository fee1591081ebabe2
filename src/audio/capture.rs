use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Raw audio delivered by a capture source (16-bit PCM, interleaved).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM samples (i16, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Milliseconds since capture started
    pub offset_ms: u64,
}

/// Configuration for a capture source.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (sources downsample toward it where possible)
    pub sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// How often buffered samples are flushed to the frame channel
    pub flush_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz for speech recognition
            channels: 1,        // Mono
            flush_interval: Duration::from_millis(100),
        }
    }
}

/// Audio capture source.
///
/// The microphone implementation lives in [`super::mic`]; tests provide
/// scripted implementations of this trait.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Begin capturing.
    ///
    /// Returns a channel receiver that will receive PCM frames. The flush
    /// granularity of those frames is an implementation detail of the
    /// source, not a contract. Fails with
    /// [`CaptureError::DeviceUnavailable`] when no usable input device
    /// exists.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// End capture and release the underlying device.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if the source is currently capturing
    fn is_active(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}
