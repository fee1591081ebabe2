//! Recording session management
//!
//! This module provides the `Recorder` abstraction that manages:
//! - Audio capture acquisition and guaranteed release
//! - The recording lifecycle state machine (idle → recording → stopped)
//! - Chunk scheduling and transcription dispatch in streaming mode
//! - Running-transcript accumulation
//! - The once-per-session refinement pass

mod config;
mod events;
mod recorder;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use events::{RecordingMode, SessionEvent, SessionStatus};
pub use recorder::Recorder;
pub use stats::SessionStats;
pub use transcript::{TranscriptAccumulator, TranscriptFragment};
