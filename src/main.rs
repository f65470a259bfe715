use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lookout::backend::HttpBackend;
use lookout::camera::{CaptureCommandSource, FrameSource, StillImageSource};
use lookout::session::{
    ListeningState, ScanState, SessionController, SessionHandle, SessionOptions, SpeechState,
};
use lookout::speech::{MutedSpeech, SpeechOutput, SynthesizedSpeech};
use lookout::voice::{MicVoiceInput, NoVoice, VoiceInput};
use lookout::Config;

/// Lookout - camera vision assistant
#[derive(Parser)]
#[command(name = "lookout", version, about)]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "LOOKOUT_BACKEND_URL")]
    backend: Option<String>,

    /// Seconds between continuous scans
    #[arg(long, env = "LOOKOUT_SCAN_INTERVAL")]
    interval: Option<u64>,

    /// Capture command writing one JPEG frame to stdout
    #[arg(long, env = "LOOKOUT_CAPTURE_COMMAND")]
    capture_command: Option<String>,

    /// Analyze a still JPEG instead of running a capture command
    #[arg(long)]
    still_image: Option<PathBuf>,

    /// Disable voice input (for machines without a microphone)
    #[arg(long, env = "LOOKOUT_DISABLE_VOICE")]
    disable_voice: bool,

    /// Mute narration (print descriptions and answers only)
    #[arg(long)]
    mute: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Continuously scan and narrate the scene (default)
    Watch,
    /// Analyze one frame and print the description
    Describe,
    /// Ask a question about the current scene
    Ask {
        /// The question to ask
        question: String,
    },
    /// Listen for one spoken question and answer it
    Listen,
    /// Check backend availability
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,lookout=info",
        1 => "info,lookout=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;

    if let Some(backend) = cli.backend {
        config.backend_url = backend;
    }
    if let Some(interval) = cli.interval {
        anyhow::ensure!(interval > 0, "scan interval must be at least one second");
        config.scan_interval_secs = interval;
    }
    if let Some(command) = cli.capture_command {
        config.capture_command = Some(command);
    }
    if let Some(path) = cli.still_image {
        config.still_image = Some(path);
    }
    if cli.disable_voice {
        config.voice_enabled = false;
    }

    let backend = Arc::new(HttpBackend::new(&config.backend_url)?);

    match cli.command {
        Some(Command::Health) => return health(&backend).await,
        Some(Command::Ask { question }) => return ask(&config, backend, cli.mute, question).await,
        _ => {}
    }

    let frames = frame_source(&config)?;
    let speech = speech_output(&config, cli.mute)?;
    let voice: Box<dyn VoiceInput> = if config.voice_enabled {
        Box::new(MicVoiceInput::new(Arc::clone(&backend)))
    } else {
        Box::new(NoVoice)
    };

    let options = SessionOptions {
        scan_interval: Duration::from_secs(config.scan_interval_secs),
        locale: config.locale.clone(),
        speech: lookout::speech::SpeechParams::default(),
    };

    let (controller, handle) = SessionController::new(backend, frames, voice, speech, options);
    let session = tokio::spawn(controller.run());

    match cli.command {
        Some(Command::Describe) => describe(&handle).await?,
        Some(Command::Listen) => listen(&handle).await?,
        Some(Command::Watch) | None => watch(&handle).await?,
        Some(Command::Ask { .. } | Command::Health) => unreachable!("handled above"),
    }

    handle.shutdown().await.ok();
    session.await?;
    Ok(())
}

/// Pick a frame source: still image wins, then capture command
fn frame_source(config: &Config) -> anyhow::Result<Box<dyn FrameSource>> {
    if let Some(path) = &config.still_image {
        return Ok(Box::new(StillImageSource::new(path.clone())));
    }
    if let Some(command) = &config.capture_command {
        return Ok(Box::new(CaptureCommandSource::new(command.clone())));
    }
    anyhow::bail!(
        "no camera configured: set a capture command (--capture-command or \
         [camera].capture_command) or a still image (--still-image)"
    )
}

fn speech_output(config: &Config, mute: bool) -> anyhow::Result<Box<dyn SpeechOutput>> {
    if mute {
        return Ok(Box::new(MutedSpeech));
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) => Ok(Box::new(SynthesizedSpeech::new(key, config.tts_voice.clone())?)),
        Err(_) => {
            tracing::warn!("OPENAI_API_KEY not set, narration muted");
            Ok(Box::new(MutedSpeech))
        }
    }
}

/// Run continuous scanning until Ctrl-C, printing each new description
async fn watch(handle: &SessionHandle) -> anyhow::Result<()> {
    let mut status = handle.status();
    handle.start_scanning().await?;

    let mut last_description = None;
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                if let Some(analysis) = snapshot.analysis {
                    if last_description.as_ref() != Some(&analysis.description) {
                        println!("[{}] {}", analysis.produced_at.format("%H:%M:%S"), analysis.description);
                        last_description = Some(analysis.description);
                    }
                }
                if let Some(error) = snapshot.camera_error {
                    anyhow::bail!("camera failed: {error}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Run one analysis and print the description
async fn describe(handle: &SessionHandle) -> anyhow::Result<()> {
    let mut status = handle.status();
    handle.analyze_now().await?;

    let snapshot = tokio::time::timeout(
        Duration::from_secs(60),
        status.wait_for(|s| s.analysis.is_some() || s.camera_error.is_some()),
    )
    .await
    .map_err(|_| anyhow::anyhow!("analysis timed out"))??
    .clone();

    if let Some(error) = snapshot.camera_error {
        anyhow::bail!("camera failed: {error}");
    }
    if let Some(analysis) = snapshot.analysis {
        println!("{}", analysis.description);
    }
    wait_for_silence(handle).await;
    Ok(())
}

/// Ask a typed question directly, without opening a camera
async fn ask(
    config: &Config,
    backend: Arc<HttpBackend>,
    mute: bool,
    question: String,
) -> anyhow::Result<()> {
    use lookout::backend::RemoteAssistant;

    let client_id = uuid::Uuid::new_v4().to_string();
    let answer = backend.ask_question(&question, &client_id).await?;
    println!("{answer}");

    if !mute {
        if let Ok(mut speech) = speech_output(config, false) {
            let (tx, mut rx) = tokio::sync::mpsc::channel(4);
            speech.speak(
                lookout::speech::Utterance {
                    id: 1,
                    text: answer,
                    params: lookout::speech::SpeechParams::default(),
                },
                tx,
            );
            // Drain lifecycle events until the utterance ends
            while let Some(event) = rx.recv().await {
                if matches!(
                    event,
                    lookout::session::SessionEvent::SpeechFinished(_)
                        | lookout::session::SessionEvent::SpeechFailed(..)
                ) {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Capture one spoken question, answer it, and print the answer
async fn listen(handle: &SessionHandle) -> anyhow::Result<()> {
    let mut status = handle.status();
    handle.start_listening().await?;

    let snapshot = status
        .wait_for(|s| s.listening == ListeningState::Listening || s.notice.is_some())
        .await?
        .clone();
    if let Some(notice) = snapshot.notice {
        anyhow::bail!("{}", notice.message);
    }
    println!("Listening...");

    let snapshot = tokio::time::timeout(
        Duration::from_secs(120),
        status.wait_for(|s| {
            s.question.last_answer.is_some()
                || (s.listening == ListeningState::Idle && s.notice.is_some())
        }),
    )
    .await
    .map_err(|_| anyhow::anyhow!("listening timed out"))??
    .clone();

    if let Some(question) = snapshot.question.last_question {
        println!("> {question}");
    }
    match snapshot.question.last_answer {
        Some(answer) => println!("{answer}"),
        None => {
            if let Some(notice) = snapshot.notice {
                anyhow::bail!("{}", notice.message);
            }
        }
    }
    wait_for_silence(handle).await;
    Ok(())
}

/// Let an in-flight utterance finish before teardown cancels it
async fn wait_for_silence(handle: &SessionHandle) {
    let mut status = handle.status();
    let _ = tokio::time::timeout(
        Duration::from_secs(30),
        status.wait_for(|s| s.speech == SpeechState::Silent && s.scan == ScanState::Idle),
    )
    .await;
}

async fn health(backend: &HttpBackend) -> anyhow::Result<()> {
    let health = backend.health().await?;
    println!("status:  {}", health.status);
    println!("whisper: {}", if health.whisper_loaded { "loaded" } else { "unavailable" });
    println!("vision:  {}", if health.vision_loaded { "loaded" } else { "unavailable" });
    Ok(())
}
