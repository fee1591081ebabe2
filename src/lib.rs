pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod speech;

pub use audio::{
    encode_wav, AudioChunk, AudioFrame, CaptureConfig, CaptureSource, ChunkScheduler, MicSource,
};
pub use config::Config;
pub use error::{CaptureError, SessionError, SpeechError};
pub use http::{create_router, AppState};
pub use session::{
    Recorder, RecordingMode, SessionConfig, SessionEvent, SessionStats, SessionStatus,
    TranscriptAccumulator, TranscriptFragment,
};
pub use speech::{SpeechClient, SpeechService};
