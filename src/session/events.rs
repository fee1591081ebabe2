use serde::{Deserialize, Serialize};

/// How a session turns audio into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordingMode {
    /// Transcribe once, after the entire recording finishes.
    SingleShot,
    /// Transcribe incrementally, chunk by chunk, while recording continues.
    Streaming,
}

/// Recording lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Recording,
    Stopped,
}

/// Typed lifecycle events emitted by the recorder.
///
/// Subscribers (HTTP layer, logging, tests) observe the pipeline through
/// these instead of reaching into recorder internals.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started {
        session_id: String,
        mode: RecordingMode,
    },
    ChunkReady {
        session_id: String,
        sequence: u64,
    },
    Stopped {
        session_id: String,
        elapsed_secs: u64,
    },
    Finalized {
        session_id: String,
        output: String,
    },
}
