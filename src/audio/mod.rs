pub mod capture;
pub mod chunk;
pub mod mic;

pub use capture::{AudioFrame, CaptureConfig, CaptureSource};
pub use chunk::{encode_wav, AudioChunk, ChunkScheduler};
pub use mic::MicSource;
