//! HTTP API server
//!
//! Two surfaces share one router:
//! - Recording control, driving the capture pipeline on this host:
//!   POST /record/start, POST /record/stop, GET /record/status,
//!   GET /record/transcript, GET /health
//! - Proxy endpoints for clients that capture audio themselves:
//!   POST /api/transcribe-chunk (multipart chunk → transcription) and
//!   POST /api/process-audio (multipart recording or JSON transcript →
//!   transcription + refined prompt)

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
