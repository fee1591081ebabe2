use chrono::{DateTime, Utc};
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::capture::AudioFrame;

/// A time-boxed slice of recorded audio, encoded as a standalone WAV
/// payload so it can be transcribed independently of its neighbors.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Monotonically increasing per-session chunk number (0-indexed)
    pub sequence: u64,
    /// Encoded WAV bytes
    pub bytes: Vec<u8>,
    /// When the chunk was finalized
    pub captured_at: DateTime<Utc>,
}

/// Timer-driven chunk slicer.
///
/// Receives capture frames and, on a fixed wall-clock interval, finalizes
/// everything buffered since the previous tick into one [`AudioChunk`].
/// A tick that finds an empty buffer is skipped without consuming a
/// sequence number. When the frame channel closes (recording stopped),
/// the loop exits immediately; partial data buffered after the last full
/// tick is discarded for chunk purposes; it remains part of the full
/// recording blob held by the recorder.
pub struct ChunkScheduler {
    interval: Duration,
}

impl ChunkScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run the slicing loop until the frame channel closes.
    ///
    /// Returns the number of chunks emitted.
    pub async fn run(
        self,
        mut frames: mpsc::Receiver<AudioFrame>,
        chunks: mpsc::Sender<AudioChunk>,
    ) -> u64 {
        let mut pending: Vec<i16> = Vec::new();
        let mut format: Option<(u32, u16)> = None;
        let mut sequence: u64 = 0;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // An interval's first tick completes immediately; consume it so the
        // first chunk covers a full interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                received = frames.recv() => match received {
                    Some(frame) => {
                        format.get_or_insert((frame.sample_rate, frame.channels));
                        pending.extend_from_slice(&frame.samples);
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    let Some((sample_rate, channels)) = format else {
                        continue;
                    };
                    if pending.is_empty() {
                        continue;
                    }

                    let samples = std::mem::take(&mut pending);
                    match encode_wav(&samples, sample_rate, channels) {
                        Ok(bytes) => {
                            debug!(sequence, samples = samples.len(), "chunk finalized");
                            let chunk = AudioChunk {
                                sequence,
                                bytes,
                                captured_at: Utc::now(),
                            };
                            if chunks.send(chunk).await.is_err() {
                                break;
                            }
                            sequence += 1;
                        }
                        Err(e) => {
                            warn!(sequence, error = %e, "failed to encode chunk, dropping");
                        }
                    }
                }
            }
        }

        info!("chunk scheduling complete: {} chunks emitted", sequence);
        sequence
    }
}

/// Encode 16-bit PCM samples as an in-memory WAV payload.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
