use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use voiceprompt::{create_router, AppState, Config, Recorder, SpeechClient, SpeechService};

#[derive(Parser)]
#[command(name = "voiceprompt", about = "Voice-to-prompt recording service")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/voiceprompt")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Transcribe and refine a single recorded file, then exit
    Process { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    let api_key = std::env::var(&cfg.speech.api_key_env).unwrap_or_default();
    let speech = Arc::new(SpeechClient::new(cfg.speech.clone(), api_key)?);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg, speech).await,
        Command::Process { file } => process_file(&file, speech.as_ref()).await,
    }
}

async fn serve(cfg: Config, speech: Arc<SpeechClient>) -> Result<()> {
    let speech: Arc<dyn SpeechService> = speech;
    let recorder = Arc::new(Recorder::new(cfg.session_config(), Arc::clone(&speech)));
    let state = AppState::new(speech, recorder, cfg.capture_config());

    let app = create_router(state);
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);

    info!("{} listening on {}", cfg.service.name, addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Single-shot batch mode: feed one already-encoded recording through the
/// transcription and refinement collaborators and print both results.
async fn process_file(path: &Path, speech: &SpeechClient) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("recording.wav");

    info!("processing {} ({} bytes)", filename, bytes.len());

    let transcript = speech.transcribe(bytes, filename).await?;
    println!("transcript:\n{transcript}\n");

    let refined = speech.refine(&transcript).await?;
    println!("prompt:\n{refined}");

    Ok(())
}
