use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use studio_voice::audio::{CaptureBackendFactory, CaptureConfig, MicrophoneBackend};
use studio_voice::{
    create_router, AppState, AudioSource, Config, ExternalContext, GeminiLiveTransport,
    SessionConfig, SessionStatus, SpeakerOutput, View, VoiceSession,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "studio-voice")]
#[command(about = "Realtime voice assistant session engine")]
struct Cli {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/studio-voice")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Talk to the assistant until Ctrl+C
    Run {
        /// Replay a WAV file instead of using the microphone
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Text file attached as document context
        #[arg(short, long)]
        document: Option<PathBuf>,

        /// Display name of the attached document
        #[arg(long)]
        document_name: Option<String>,
    },
    /// Serve the HTTP control API
    Serve,
    /// List audio input and output devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Devices => list_devices(),
        Command::Run {
            input,
            document,
            document_name,
        } => {
            let cfg = Config::load(&cli.config)?;
            let context = load_context(document, document_name)?;
            run(cfg, input, context).await
        }
        Command::Serve => {
            let cfg = Config::load(&cli.config)?;
            serve(cfg).await
        }
    }
}

fn build_session(cfg: &Config, input: Option<PathBuf>) -> Result<VoiceSession> {
    let session_config = SessionConfig::from(cfg);
    session_config.validate()?;

    let capture_config = CaptureConfig {
        target_sample_rate: session_config.input_sample_rate,
        device: cfg.audio.input_device.clone(),
        ..CaptureConfig::default()
    };
    let source = match input {
        Some(path) => AudioSource::File(path),
        None => AudioSource::Microphone,
    };
    let capture = CaptureBackendFactory::create(source, capture_config);
    let output = SpeakerOutput::new(cfg.audio.output_device.clone());

    let api_key = cfg.api_key()?;
    let transport = GeminiLiveTransport::from_config(&cfg.live, api_key);

    let navigator = |view: View| -> Result<()> {
        info!("Assistant navigated to {}", view);
        println!("-> {}", view);
        Ok(())
    };

    Ok(VoiceSession::new(
        session_config,
        capture,
        Box::new(output),
        Arc::new(transport),
        Box::new(navigator),
    ))
}

fn load_context(document: Option<PathBuf>, name: Option<String>) -> Result<ExternalContext> {
    let Some(path) = document else {
        return Ok(ExternalContext {
            document: None,
            name,
        });
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;
    let name = name.or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
    });

    Ok(ExternalContext {
        document: Some(text),
        name,
    })
}

async fn run(cfg: Config, input: Option<PathBuf>, context: ExternalContext) -> Result<()> {
    let mut session = build_session(&cfg, input)?;
    session.set_context(context);

    let (handle, task) = session.spawn();
    let mut snapshots = handle.watch();

    handle.start().await?;
    if handle.status().status == SessionStatus::Standby {
        handle.shutdown().await?;
        let _ = task.await;
        bail!("Voice session failed to start; see log output");
    }

    info!("Session active, press Ctrl+C to stop");
    let mut last_transcript = String::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.transcript != last_transcript && !snapshot.transcript.is_empty() {
                    println!("you: {}", snapshot.transcript);
                    last_transcript = snapshot.transcript.clone();
                }
                if snapshot.status == SessionStatus::Standby {
                    info!("Session ended by the remote side");
                    break;
                }
            }
        }
    }

    let stats = handle.stop().await?;
    info!(
        "Session summary: {} frames sent, {} units played, {} interruptions, {} function calls",
        stats.frames_sent, stats.units_scheduled, stats.interruptions, stats.tool_calls
    );

    handle.shutdown().await?;
    task.await.context("Session task panicked")?;
    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    let session = build_session(&cfg, None)?;
    let (handle, task) = session.spawn();

    let app = create_router(AppState::new(handle.clone()));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("{} listening on http://{}", cfg.service.name, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    handle.shutdown().await?;
    task.await.context("Session task panicked")?;
    Ok(())
}

fn list_devices() -> Result<()> {
    println!("Input devices:");
    for name in MicrophoneBackend::list_input_devices()? {
        println!("  {}", name);
    }

    println!("Output devices:");
    for name in SpeakerOutput::list_output_devices()? {
        println!("  {}", name);
    }
    Ok(())
}
