use std::sync::Arc;

use crate::audio::CaptureConfig;
use crate::session::Recorder;
use crate::speech::SpeechService;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Upstream transcription/refinement client (injected, not global)
    pub speech: Arc<dyn SpeechService>,

    /// The single recorder instance (at most one active session)
    pub recorder: Arc<Recorder>,

    /// Capture format used when handlers acquire the microphone
    pub capture: CaptureConfig,
}

impl AppState {
    pub fn new(
        speech: Arc<dyn SpeechService>,
        recorder: Arc<Recorder>,
        capture: CaptureConfig,
    ) -> Self {
        Self {
            speech,
            recorder,
            capture,
        }
    }
}
