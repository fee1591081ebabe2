use std::time::Duration;

use super::events::RecordingMode;

/// Configuration for recording sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Mode used when a start command does not name one
    pub default_mode: RecordingMode,

    /// Wall-clock interval between chunk finalizations in streaming mode
    /// Default: 3 seconds
    pub chunk_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_mode: RecordingMode::Streaming,
            chunk_interval: Duration::from_millis(3000),
        }
    }
}
