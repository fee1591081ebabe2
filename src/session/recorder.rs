use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::events::{RecordingMode, SessionEvent, SessionStatus};
use super::stats::SessionStats;
use super::transcript::{TranscriptAccumulator, TranscriptFragment};
use crate::audio::{encode_wav, AudioChunk, AudioFrame, CaptureSource, ChunkScheduler};
use crate::error::SessionError;
use crate::speech::SpeechService;

const CHUNK_CHANNEL_CAPACITY: usize = 32;
const FANOUT_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Everything captured over one session, materialized at stop time.
#[derive(Debug, Default)]
struct RecordedAudio {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

/// Per-session state queried by the HTTP layer and mutated by the
/// pipeline tasks.
struct SessionState {
    status: SessionStatus,
    session_id: Option<String>,
    mode: RecordingMode,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    transcript: TranscriptAccumulator,
    refined: Option<String>,
}

struct Shared {
    /// Cleared first on stop: gates fragment acceptance, the elapsed
    /// ticker, and chunk dispatch.
    is_recording: AtomicBool,
    elapsed_secs: AtomicU64,
    chunks_dispatched: AtomicU64,
    state: Mutex<SessionState>,
}

/// Capture source and task handles for the active session.
#[derive(Default)]
struct Lifecycle {
    capture: Option<Box<dyn CaptureSource>>,
    ingest: Option<JoinHandle<RecordedAudio>>,
    scheduler: Option<JoinHandle<u64>>,
    dispatch: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

/// Recorder state machine: owns the recording lifecycle
/// (idle → recording → stopped), the capture source, the streaming
/// pipeline tasks, and the once-per-session finalization pass.
///
/// At most one session is active at a time; a start command while
/// recording is rejected with [`SessionError::InvalidState`]. Stop is
/// idempotent. The transcription/refinement collaborator is injected at
/// construction.
pub struct Recorder {
    config: SessionConfig,
    speech: Arc<dyn SpeechService>,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    events: broadcast::Sender<SessionEvent>,
}

impl Recorder {
    pub fn new(config: SessionConfig, speech: Arc<dyn SpeechService>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let state = SessionState {
            status: SessionStatus::Idle,
            session_id: None,
            mode: config.default_mode,
            started_at: None,
            transcript: TranscriptAccumulator::new(),
            refined: None,
        };

        Self {
            config,
            speech,
            shared: Arc::new(Shared {
                is_recording: AtomicBool::new(false),
                elapsed_secs: AtomicU64::new(0),
                chunks_dispatched: AtomicU64::new(0),
                state: Mutex::new(state),
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
            events,
        }
    }

    pub fn default_mode(&self) -> RecordingMode {
        self.config.default_mode
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Start a new recording session.
    ///
    /// Rejects with [`SessionError::InvalidState`] while a session is
    /// recording (the given source is not touched). A capture failure
    /// aborts the start and leaves the machine idle. On success all
    /// session data from a prior run is reset and a fresh session id is
    /// returned.
    pub async fn start(
        &self,
        mode: RecordingMode,
        mut source: Box<dyn CaptureSource>,
    ) -> Result<String, SessionError> {
        let mut lifecycle = self.lifecycle.lock().await;

        {
            let state = self.shared.state.lock().await;
            if state.status == SessionStatus::Recording {
                warn!("start rejected: session already recording");
                return Err(SessionError::InvalidState);
            }
        }

        let frames = source.start().await?;

        let session_id = format!("rec-{}", uuid::Uuid::new_v4());
        info!("starting recording session {session_id} ({mode:?})");

        {
            let mut state = self.shared.state.lock().await;
            state.status = SessionStatus::Recording;
            state.session_id = Some(session_id.clone());
            state.mode = mode;
            state.started_at = Some(chrono::Utc::now());
            state.transcript.reset();
            state.refined = None;
        }
        self.shared.elapsed_secs.store(0, Ordering::SeqCst);
        self.shared.chunks_dispatched.store(0, Ordering::SeqCst);
        self.shared.is_recording.store(true, Ordering::SeqCst);

        lifecycle.ticker = Some(self.spawn_elapsed_ticker());

        match mode {
            RecordingMode::Streaming => {
                let (fanout_tx, fanout_rx) = mpsc::channel(FANOUT_CHANNEL_CAPACITY);
                let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

                lifecycle.ingest = Some(spawn_ingest(frames, Some(fanout_tx)));
                lifecycle.scheduler = Some(tokio::spawn(
                    ChunkScheduler::new(self.config.chunk_interval).run(fanout_rx, chunk_tx),
                ));
                lifecycle.dispatch = Some(self.spawn_dispatch(session_id.clone(), chunk_rx));
            }
            RecordingMode::SingleShot => {
                lifecycle.ingest = Some(spawn_ingest(frames, None));
            }
        }

        lifecycle.capture = Some(source);

        let _ = self.events.send(SessionEvent::Started {
            session_id: session_id.clone(),
            mode,
        });

        Ok(session_id)
    }

    /// Stop the active session and run finalization.
    ///
    /// A no-op while idle or already stopped. Future chunk ticks are
    /// cancelled immediately; transcription calls already in flight are
    /// not awaited and their late results are discarded. The microphone
    /// is released before anything else on this path can fail.
    pub async fn stop(&self) -> Result<SessionStats, SessionError> {
        let mut lifecycle = self.lifecycle.lock().await;

        {
            let state = self.shared.state.lock().await;
            if state.status != SessionStatus::Recording {
                debug!("stop ignored: no active recording");
                drop(state);
                return Ok(self.stats().await);
            }
        }

        // Refuse new fragments and chunk dispatches from here on.
        self.shared.is_recording.store(false, Ordering::SeqCst);

        if let Some(mut capture) = lifecycle.capture.take() {
            if let Err(e) = capture.stop().await {
                warn!("capture source shutdown reported an error: {e}");
            }
        }

        if let Some(ticker) = lifecycle.ticker.take() {
            ticker.abort();
        }

        // Wind down in dependency order: the closed capture channel ends
        // the ingest task, whose exit closes the scheduler's input, whose
        // exit closes the dispatcher's input.
        let recorded = match lifecycle.ingest.take() {
            Some(handle) => match handle.await {
                Ok(recorded) => recorded,
                Err(e) => {
                    error!("ingest task panicked: {e}");
                    RecordedAudio::default()
                }
            },
            None => RecordedAudio::default(),
        };
        if let Some(handle) = lifecycle.scheduler.take() {
            if let Err(e) = handle.await {
                error!("chunk scheduler task panicked: {e}");
            }
        }
        if let Some(handle) = lifecycle.dispatch.take() {
            if let Err(e) = handle.await {
                error!("dispatch task panicked: {e}");
            }
        }

        let (session_id, mode, transcript_at_stop) = {
            let mut state = self.shared.state.lock().await;
            state.status = SessionStatus::Stopped;
            (
                state.session_id.clone().unwrap_or_default(),
                state.mode,
                state.transcript.text().to_string(),
            )
        };

        let elapsed = self.shared.elapsed_secs.load(Ordering::SeqCst);
        info!("recording session {session_id} stopped after {elapsed}s");
        let _ = self.events.send(SessionEvent::Stopped {
            session_id: session_id.clone(),
            elapsed_secs: elapsed,
        });

        // Finalization: at most once per session, only after the Stopped
        // transition, serialized by the lifecycle lock held above.
        match mode {
            RecordingMode::Streaming => {
                self.finalize(&session_id, &transcript_at_stop).await?;
            }
            RecordingMode::SingleShot => {
                if recorded.samples.is_empty() {
                    info!("empty recording, skipping transcription");
                } else {
                    let blob =
                        encode_wav(&recorded.samples, recorded.sample_rate, recorded.channels)?;
                    let text = self.speech.transcribe(blob, "recording.wav").await?;
                    {
                        let mut state = self.shared.state.lock().await;
                        state.transcript.append(TranscriptFragment {
                            sequence: 0,
                            text: text.clone(),
                        });
                    }
                    self.finalize(&session_id, &text).await?;
                }
            }
        }

        Ok(self.stats().await)
    }

    /// Refine the session transcript and publish the result.
    ///
    /// Skipped entirely when there is nothing to refine (stop before the
    /// first chunk, or a recording with no recognized speech).
    async fn finalize(&self, session_id: &str, transcript: &str) -> Result<(), SessionError> {
        if transcript.trim().is_empty() {
            info!("no transcript accumulated, skipping refinement");
            return Ok(());
        }

        let refined = self.speech.refine(transcript).await?;

        {
            let mut state = self.shared.state.lock().await;
            state.refined = Some(refined.clone());
        }

        let _ = self.events.send(SessionEvent::Finalized {
            session_id: session_id.to_string(),
            output: refined,
        });

        Ok(())
    }

    pub async fn status(&self) -> SessionStatus {
        self.shared.state.lock().await.status
    }

    /// Running transcript accumulated so far.
    pub async fn transcript(&self) -> String {
        self.shared.state.lock().await.transcript.text().to_string()
    }

    /// Refined output, once finalization has produced one.
    pub async fn refined_output(&self) -> Option<String> {
        self.shared.state.lock().await.refined.clone()
    }

    pub async fn stats(&self) -> SessionStats {
        let state = self.shared.state.lock().await;
        SessionStats {
            session_id: state.session_id.clone(),
            status: state.status,
            mode: state.mode,
            started_at: state.started_at,
            elapsed_secs: self.shared.elapsed_secs.load(Ordering::SeqCst),
            chunks_dispatched: self.shared.chunks_dispatched.load(Ordering::SeqCst),
            transcript_fragments: state.transcript.fragment_count(),
            transcript_chars: state.transcript.text().len(),
        }
    }

    /// One-second display counter, independent of chunk timing.
    fn spawn_elapsed_ticker(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                if !shared.is_recording.load(Ordering::SeqCst) {
                    break;
                }
                shared.elapsed_secs.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    /// Hands each finalized chunk to the transcription collaborator on its
    /// own task, so chunk production never waits on transcription latency.
    /// Per-chunk failures are logged and contribute nothing; completions
    /// that land after stop are discarded.
    fn spawn_dispatch(
        &self,
        session_id: String,
        mut chunks: mpsc::Receiver<AudioChunk>,
    ) -> JoinHandle<()> {
        let speech = Arc::clone(&self.speech);
        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();

        tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                if !shared.is_recording.load(Ordering::SeqCst) {
                    debug!(
                        sequence = chunk.sequence,
                        "discarding chunk finalized after stop"
                    );
                    continue;
                }

                shared.chunks_dispatched.fetch_add(1, Ordering::SeqCst);
                let _ = events.send(SessionEvent::ChunkReady {
                    session_id: session_id.clone(),
                    sequence: chunk.sequence,
                });

                let speech = Arc::clone(&speech);
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    let filename = format!("chunk-{:03}.wav", chunk.sequence);
                    match speech.transcribe(chunk.bytes, &filename).await {
                        Ok(text) => {
                            if shared.is_recording.load(Ordering::SeqCst) {
                                let mut state = shared.state.lock().await;
                                state.transcript.append(TranscriptFragment {
                                    sequence: chunk.sequence,
                                    text,
                                });
                            } else {
                                debug!(
                                    sequence = chunk.sequence,
                                    "dropping transcription that completed after stop"
                                );
                            }
                        }
                        Err(e) => {
                            warn!(
                                sequence = chunk.sequence,
                                error = %e,
                                "chunk transcription failed, session continues"
                            );
                        }
                    }
                });
            }
        })
    }
}

/// Accumulates every captured frame into the full recording blob and, in
/// streaming mode, forwards frames to the chunk scheduler.
fn spawn_ingest(
    mut frames: mpsc::Receiver<AudioFrame>,
    fanout: Option<mpsc::Sender<AudioFrame>>,
) -> JoinHandle<RecordedAudio> {
    tokio::spawn(async move {
        let mut recorded = RecordedAudio::default();

        while let Some(frame) = frames.recv().await {
            if recorded.sample_rate == 0 {
                recorded.sample_rate = frame.sample_rate;
                recorded.channels = frame.channels;
            }
            recorded.samples.extend_from_slice(&frame.samples);

            if let Some(tx) = &fanout {
                // A closed scheduler input only ends chunking; the full
                // recording keeps accumulating.
                let _ = tx.send(frame).await;
            }
        }

        recorded
    })
}
