//! Upstream speech collaborators: transcription and refinement.
//!
//! Both are opaque remote calls against an OpenAI-compatible API. The
//! trait is the seam between the pipeline and the network: the recorder
//! and the HTTP handlers receive an `Arc<dyn SpeechService>` constructed
//! once at the composition root.

mod client;

use async_trait::async_trait;

use crate::error::SpeechError;

pub use client::SpeechClient;

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Transcribe one encoded audio payload (a single chunk or a whole
    /// recording) into text.
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, SpeechError>;

    /// Rewrite a raw transcript into a well-formed instruction prompt.
    async fn refine(&self, transcript: &str) -> Result<String, SpeechError>;
}
