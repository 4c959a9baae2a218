use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use voicewire::{Config, LiveSession, SessionEvent, WavFileSource};

#[derive(Parser)]
#[command(name = "voicewire", about = "Bidirectional audio streaming client")]
struct Cli {
    /// Config file path, without extension
    #[arg(long, default_value = "config/voicewire")]
    config: String,

    /// WAV file streamed as microphone input
    #[arg(long)]
    input: Option<PathBuf>,

    /// Text prompt sent once the session is active
    #[arg(long)]
    text: Option<String>,

    /// Start with the microphone muted
    #[arg(long)]
    muted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).context("Failed to load config")?;

    let session_config = cfg.session_config();
    info!("Voicewire v0.1.0, session {}", session_config.session_id);

    let frame_duration = Duration::from_millis(cfg.audio.frame_duration_ms);
    let session = LiveSession::connect(session_config).await?;
    let mut events = session.subscribe();

    if cli.muted {
        session.set_muted(true);
    }

    if let Some(input) = &cli.input {
        let source = WavFileSource::new(input, frame_duration);
        session.start_capture(Box::new(source)).await?;
    }

    // With only a text prompt there is nothing to do after the model's
    // reply; with live audio we run until the user stops us.
    let exit_on_turn_complete = cli.text.is_some() && cli.input.is_none();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Ready) => {
                    info!("Session active");
                    if let Some(text) = &cli.text {
                        session.send_text(text).await?;
                    }
                }
                Ok(SessionEvent::Transcript { text, is_final }) => {
                    if is_final {
                        println!("\nyou: {}", text);
                    } else {
                        print!("\r{}", text);
                        std::io::stdout().flush().ok();
                    }
                }
                Ok(SessionEvent::ModelText(text)) => println!("model: {}", text),
                Ok(SessionEvent::TurnComplete) => {
                    info!("Turn complete");
                    if exit_on_turn_complete {
                        break;
                    }
                }
                Ok(SessionEvent::Interrupted) => info!("Server interrupted the turn"),
                Ok(SessionEvent::ServerError(message)) => warn!("Server error: {}", message),
                Ok(SessionEvent::TransportError(message)) => warn!("Transport error: {}", message),
                Ok(SessionEvent::Disconnected) => break,
                Err(RecvError::Lagged(skipped)) => warn!("Event stream lagged, skipped {}", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    let stats = session.disconnect().await;
    info!(
        "Session over: {:.1}s, {} frames sent ({} bytes), {} segments played, {} transcripts",
        stats.duration_secs,
        stats.frames_sent,
        stats.bytes_sent,
        stats.segments_played,
        stats.transcripts_received
    );

    Ok(())
}
