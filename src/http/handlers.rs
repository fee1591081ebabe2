use super::state::AppState;
use crate::audio::MicSource;
use crate::error::{SessionError, SpeechError};
use crate::session::{RecordingMode, SessionStats};
use crate::speech::SpeechService;
use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    /// Recording mode (defaults to the configured mode)
    pub mode: Option<RecordingMode>,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub session_id: String,
    pub status: String,
    pub mode: RecordingMode,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub transcript: String,
    pub processed_output: Option<String>,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub transcript: String,
    pub processed_output: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscribeChunkResponse {
    pub transcription: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessTextRequest {
    pub transcription: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessAudioResponse {
    pub transcription: String,
    #[serde(rename = "processedOutput")]
    pub processed_output: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Recording control
// ============================================================================

/// POST /record/start
/// Start a new recording session from the microphone
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> Response {
    let mode = req.mode.unwrap_or_else(|| state.recorder.default_mode());
    let source = Box::new(MicSource::new(state.capture.clone()));

    match state.recorder.start(mode, source).await {
        Ok(session_id) => {
            info!("recording started: {session_id}");
            (
                StatusCode::OK,
                Json(StartRecordingResponse {
                    session_id,
                    status: "recording".to_string(),
                    mode,
                }),
            )
                .into_response()
        }
        Err(SessionError::InvalidState) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "a recording session is already active".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("failed to start recording: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed to start recording: {e}"),
                }),
            )
                .into_response()
        }
    }
}

/// POST /record/stop
/// Stop the active session and run finalization; a no-op when idle
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    match state.recorder.stop().await {
        Ok(stats) => {
            let transcript = state.recorder.transcript().await;
            let processed_output = state.recorder.refined_output().await;
            (
                StatusCode::OK,
                Json(StopRecordingResponse {
                    transcript,
                    processed_output,
                    stats,
                }),
            )
                .into_response()
        }
        Err(e) => {
            // The transcript survives a failed final step; it stays
            // available on GET /record/transcript.
            error!("failed to finalize recording: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed to finalize recording: {e}"),
                }),
            )
                .into_response()
        }
    }
}

/// GET /record/status
pub async fn get_status(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.recorder.stats().await)).into_response()
}

/// GET /record/transcript
/// The running transcript (and refined output, once available)
pub async fn get_transcript(State(state): State<AppState>) -> Response {
    let transcript = state.recorder.transcript().await;
    let processed_output = state.recorder.refined_output().await;
    (
        StatusCode::OK,
        Json(TranscriptResponse {
            transcript,
            processed_output,
        }),
    )
        .into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// Proxy endpoints
// ============================================================================

/// POST /api/transcribe-chunk
/// Transcribe one audio chunk supplied as a multipart `file` field
pub async fn transcribe_chunk(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let payload = match read_file_field(&mut multipart).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return bad_request("no file provided"),
        Err(response) => return response,
    };

    match state.speech.transcribe(payload, "chunk.wav").await {
        Ok(transcription) => {
            (StatusCode::OK, Json(TranscribeChunkResponse { transcription })).into_response()
        }
        Err(e) => {
            error!("chunk transcription failed: {e}");
            upstream_error(e)
        }
    }
}

/// POST /api/process-audio
/// Two payload shapes:
/// - multipart with a `file` field: transcribe the whole recording, then
///   refine the transcript
/// - JSON `{ "transcription": ... }`: refine already-transcribed text
pub async fn process_audio(State(state): State<AppState>, req: Request) -> Response {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let transcription = if content_type.starts_with("application/json") {
        let Json(body) = match Json::<ProcessTextRequest>::from_request(req, &()).await {
            Ok(json) => json,
            Err(e) => return bad_request(&format!("invalid JSON body: {e}")),
        };
        match body.transcription {
            Some(text) if !text.trim().is_empty() => text,
            _ => return bad_request("no transcription provided"),
        }
    } else {
        let mut multipart = match Multipart::from_request(req, &()).await {
            Ok(multipart) => multipart,
            Err(e) => return bad_request(&format!("expected multipart payload: {e}")),
        };
        let payload = match read_file_field(&mut multipart).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return bad_request("no file provided"),
            Err(response) => return response,
        };
        match state.speech.transcribe(payload, "recording.wav").await {
            Ok(text) => text,
            Err(e) => {
                error!("recording transcription failed: {e}");
                return upstream_error(e);
            }
        }
    };

    match state.speech.refine(&transcription).await {
        Ok(processed_output) => (
            StatusCode::OK,
            Json(ProcessAudioResponse {
                transcription,
                processed_output,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("refinement failed: {e}");
            upstream_error(e)
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Find the `file` field in a multipart payload and read it fully.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<Vec<u8>>, Response> {
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    match field.bytes().await {
                        Ok(bytes) => return Ok(Some(bytes.to_vec())),
                        Err(e) => {
                            return Err(bad_request(&format!("failed to read file field: {e}")))
                        }
                    }
                }
            }
            Ok(None) => return Ok(None),
            Err(e) => return Err(bad_request(&format!("malformed multipart payload: {e}"))),
        }
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn upstream_error(e: SpeechError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}
