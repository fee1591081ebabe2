use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::capture::{AudioFrame, CaptureConfig, CaptureSource};
use crate::error::CaptureError;

const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Microphone capture source backed by the default cpal input device.
///
/// The cpal stream is not `Send`, so it is owned by a dedicated capture
/// thread for the lifetime of the session. The audio callback pushes
/// converted samples into a shared buffer; the capture thread flushes that
/// buffer to the frame channel on a fixed interval and drops the stream
/// (releasing the device) when the active flag clears.
pub struct MicSource {
    config: CaptureConfig,
    active: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MicSource {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            active: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

#[async_trait]
impl CaptureSource for MicSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.active.load(Ordering::SeqCst) {
            return Err(CaptureError::Stream(
                "microphone source already capturing".to_string(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();

        self.active.store(true, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        let config = self.config.clone();

        let worker = thread::spawn(move || {
            capture_thread(config, active, frame_tx, ready_tx);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                self.active.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                self.active.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(CaptureError::Stream(
                    "capture thread exited during startup".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.active.store(false, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            let joined = tokio::task::spawn_blocking(move || worker.join()).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!("microphone capture thread panicked"),
                Err(e) => warn!("failed to join capture thread: {e}"),
            }
        }

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        // The capture thread checks this flag every flush interval and
        // drops the stream on exit, so the device is released even when
        // stop() was never called.
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Runs on the dedicated capture thread: opens the device, plays the
/// stream, flushes buffered samples on the configured interval, and drops
/// the stream on exit.
fn capture_thread(
    config: CaptureConfig,
    active: Arc<AtomicBool>,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
) {
    let host = cpal::default_host();

    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable));
            return;
        }
    };

    let supported = match device.default_input_config() {
        Ok(supported) => supported,
        Err(_) => {
            let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable));
            return;
        }
    };

    info!(
        "Microphone input: {} Hz, {} channels, {:?}",
        supported.sample_rate().0,
        supported.channels(),
        supported.sample_format()
    );

    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();
    let device_rate = stream_config.sample_rate.0;
    let device_channels = stream_config.channels;

    let buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));

    let stream = match build_stream(&device, &stream_config, sample_format, Arc::clone(&buffer)) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    let mut sent_samples: u64 = 0;
    loop {
        thread::sleep(config.flush_interval);
        let stopping = !active.load(Ordering::SeqCst);

        let drained: Vec<i16> = {
            let mut buf = buffer.lock().unwrap();
            std::mem::take(&mut *buf)
        };

        if !drained.is_empty() {
            let (samples, sample_rate, channels) =
                normalize(drained, device_rate, device_channels, &config);

            let offset_ms =
                sent_samples * 1000 / (u64::from(sample_rate) * u64::from(channels)).max(1);
            sent_samples += samples.len() as u64;

            let frame = AudioFrame {
                samples,
                sample_rate,
                channels,
                offset_ms,
            };

            if frame_tx.blocking_send(frame).is_err() {
                break;
            }
        }

        if stopping {
            break;
        }
    }

    // Dropping the stream releases the input device.
    drop(stream);
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: SampleFormat,
    buffer: Arc<Mutex<Vec<i16>>>,
) -> Result<cpal::Stream, CaptureError> {
    match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, buffer),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, buffer),
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, buffer),
        other => Err(CaptureError::DeviceConfig(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Arc<Mutex<Vec<i16>>>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let err_fn = |err: cpal::StreamError| warn!("audio stream error: {err}");

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut buf = buffer.lock().unwrap();
                buf.reserve(data.len());
                for &sample in data {
                    buf.push(i16::from_sample(sample));
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))
}

/// Normalize device samples toward the configured target format: fold
/// stereo to mono first, then decimate toward the target rate.
fn normalize(
    samples: Vec<i16>,
    device_rate: u32,
    device_channels: u16,
    target: &CaptureConfig,
) -> (Vec<i16>, u32, u16) {
    let (samples, channels) = if device_channels == 2 && target.channels == 1 {
        (stereo_to_mono(samples), 1)
    } else {
        (samples, device_channels)
    };

    let (samples, sample_rate) = if channels == 1 {
        decimate(samples, device_rate, target.sample_rate)
    } else {
        (samples, device_rate)
    };

    (samples, sample_rate, channels)
}

/// Downsample by decimation. Integer ratios only; the effective output
/// rate is returned alongside the samples.
fn decimate(samples: Vec<i16>, device_rate: u32, target_rate: u32) -> (Vec<i16>, u32) {
    if device_rate <= target_rate {
        return (samples, device_rate);
    }

    let ratio = device_rate / target_rate;
    if ratio <= 1 {
        return (samples, device_rate);
    }

    let decimated: Vec<i16> = samples.iter().step_by(ratio as usize).copied().collect();
    (decimated, device_rate / ratio)
}

/// Fold stereo to mono by summing channels (no division, to preserve
/// volume).
fn stereo_to_mono(samples: Vec<i16>) -> Vec<i16> {
    let mut mono = Vec::with_capacity(samples.len() / 2);

    for pair in samples.chunks_exact(2) {
        let sum = i32::from(pair[0]) + i32::from(pair[1]);
        mono.push(sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16);
    }

    mono
}
