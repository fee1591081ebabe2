use chrono::{DateTime, Utc};
use serde::Serialize;

use super::events::{RecordingMode, SessionStatus};

/// Statistics about the current (or most recent) recording session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Session identifier, absent before the first start
    pub session_id: Option<String>,

    /// Lifecycle state
    pub status: SessionStatus,

    /// Recording mode of the session
    pub mode: RecordingMode,

    /// When the recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Whole seconds elapsed while recording (display counter)
    pub elapsed_secs: u64,

    /// Number of audio chunks handed to the transcription dispatcher
    pub chunks_dispatched: u64,

    /// Number of transcript fragments appended so far
    pub transcript_fragments: usize,

    /// Length of the running transcript in bytes
    pub transcript_chars: usize,
}
