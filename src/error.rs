use thiserror::Error;

/// Errors raised while acquiring or running an audio capture source.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Permission denied, or no input device exists on this host.
    #[error("no audio input device available")]
    DeviceUnavailable,

    #[error("audio input device rejected the requested configuration: {0}")]
    DeviceConfig(String),

    #[error("failed to start capture stream: {0}")]
    Stream(String),
}

/// Errors from the upstream transcription/refinement collaborators.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("refinement failed: {0}")]
    RefinementFailed(String),
}

/// Errors surfaced by the recorder state machine.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A start command arrived while a session was already recording.
    #[error("a recording session is already active")]
    InvalidState,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Speech(#[from] SpeechError),

    #[error("failed to encode recording: {0}")]
    Encode(#[from] hound::Error),
}
