// Shared test doubles for the recorder and HTTP tests: a capture source
// that replays scripted frames on a schedule, and a speech service with
// scripted per-call replies.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use voiceprompt::{AudioFrame, CaptureError, CaptureSource, SpeechError, SpeechService};

/// A mono 16kHz frame with the given number of samples.
pub fn frame(offset_ms: u64, samples: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![100i16; samples],
        sample_rate: 16000,
        channels: 1,
        offset_ms,
    }
}

/// Capture source that sends each scripted frame at its offset (milliseconds
/// from start) and keeps the frame channel open until stopped.
pub struct ScriptedCapture {
    script: Vec<(u64, AudioFrame)>,
    started: Arc<AtomicBool>,
    hold: Option<mpsc::Sender<AudioFrame>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ScriptedCapture {
    pub fn new(script: Vec<(u64, AudioFrame)>) -> Self {
        Self {
            script,
            started: Arc::new(AtomicBool::new(false)),
            hold: None,
            task: None,
        }
    }

    /// Flag that flips once start() is called; lets tests assert a source
    /// was never touched.
    pub fn started_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.started)
    }
}

#[async_trait]
impl CaptureSource for ScriptedCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        self.started.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(64);
        let script = std::mem::take(&mut self.script);
        let sender = tx.clone();

        self.task = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for (at_ms, frame) in script {
                tokio::time::sleep_until(start + Duration::from_millis(at_ms)).await;
                if sender.send(frame).await.is_err() {
                    break;
                }
            }
        }));
        self.hold = Some(tx);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        // Dropping the held sender closes the frame channel.
        self.hold.take();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.hold.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// One scripted reply for a transcription call, consumed in call order.
pub enum Reply {
    Text(&'static str),
    /// Completes with the text only after the given delay.
    TextAfter(&'static str, u64),
    Fail,
}

/// Speech service double that records every call it receives.
pub struct MockSpeech {
    replies: Mutex<VecDeque<Reply>>,
    refine_fails: AtomicBool,
    pub transcribe_calls: AtomicUsize,
    pub refine_calls: AtomicUsize,
    /// (filename, payload) per transcription call
    pub transcribed: Mutex<Vec<(String, Vec<u8>)>>,
    /// Transcript handed to each refinement call
    pub refined_inputs: Mutex<Vec<String>>,
}

impl MockSpeech {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            refine_fails: AtomicBool::new(false),
            transcribe_calls: AtomicUsize::new(0),
            refine_calls: AtomicUsize::new(0),
            transcribed: Mutex::new(Vec::new()),
            refined_inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn with_failing_refine(replies: Vec<Reply>) -> Arc<Self> {
        let mock = Self::new(replies);
        mock.refine_fails.store(true, Ordering::SeqCst);
        mock
    }
}

#[async_trait]
impl SpeechService for MockSpeech {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, SpeechError> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        self.transcribed
            .lock()
            .await
            .push((filename.to_string(), audio));

        let reply = self.replies.lock().await.pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text.to_string()),
            Some(Reply::TextAfter(text, delay_ms)) => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(text.to_string())
            }
            Some(Reply::Fail) => Err(SpeechError::TranscriptionFailed(
                "scripted failure".to_string(),
            )),
            None => Ok(String::new()),
        }
    }

    async fn refine(&self, transcript: &str) -> Result<String, SpeechError> {
        self.refine_calls.fetch_add(1, Ordering::SeqCst);
        self.refined_inputs.lock().await.push(transcript.to_string());

        if self.refine_fails.load(Ordering::SeqCst) {
            return Err(SpeechError::RefinementFailed("scripted failure".to_string()));
        }
        Ok(format!("prompt: {transcript}"))
    }
}
