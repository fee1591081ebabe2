use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::CaptureConfig;
use crate::session::{RecordingMode, SessionConfig};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureSettings,
    pub session: SessionSettings,
    pub speech: SpeechSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct CaptureSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub flush_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    pub mode: RecordingMode,
    pub chunk_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechSettings {
    pub base_url: String,
    pub transcription_model: String,
    pub refinement_model: String,
    /// Fixed recognition language passed to the transcription collaborator.
    pub language: String,
    pub request_timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.capture.sample_rate,
            channels: self.capture.channels,
            flush_interval: Duration::from_millis(self.capture.flush_interval_ms),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            default_mode: self.session.mode,
            chunk_interval: Duration::from_millis(self.session.chunk_interval_ms),
        }
    }
}
