use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use do_not_lie::audio::{AudioFile, FileDevice};
use do_not_lie::config::{expand_path, AnalyzerKind};
use do_not_lie::{
    create_router, AnalysisAdapter, AppState, AudioBackendFactory, AudioDevice, AudioSource,
    Config, Detector, MicrophoneSession, NatsAnalyzer, SimulatedAnalyzer, WaveformRenderer,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "do-not-lie")]
#[command(about = "Record a statement and find out if it was the truth")]
struct Cli {
    /// Config file, without extension
    #[arg(short, long, default_value = "config/do-not-lie")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,

    /// Record once, analyze, and print the verdict
    Record {
        /// Seconds to record
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Replay an audio file instead of the microphone
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Write the clip as WAV; relative paths land in the recordings directory
        #[arg(long)]
        save_wav: Option<String>,

        /// Write the last live waveform frame as PNG
        #[arg(long)]
        snapshot: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Do Not Lie v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Record {
            seconds,
            file,
            save_wav,
            snapshot,
        } => {
            let source = match file {
                Some(path) => AudioSource::File(path),
                None => cfg.audio.source(),
            };
            record(cfg, source, Duration::from_secs(seconds), save_wav, snapshot).await
        }
    }
}

async fn build_detector(cfg: &Config, source: AudioSource) -> Result<Arc<Detector>> {
    let device: Arc<dyn AudioDevice> = match source {
        AudioSource::File(path) => {
            let audio = AudioFile::open(&path)?;
            info!(
                "Replaying {} ({:.1}s, {} Hz, {} channels)",
                path.display(),
                audio.duration_seconds,
                audio.sample_rate,
                audio.channels
            );
            Arc::new(FileDevice::from_audio(audio, cfg.audio.backend_config()))
        }
        source => Arc::from(AudioBackendFactory::create(source, cfg.audio.backend_config())?),
    };
    info!("Audio device: {}", device.name());

    let session = Arc::new(MicrophoneSession::new(device, cfg.audio.session_config()));

    let analyzer: Arc<dyn AnalysisAdapter> = match cfg.analysis.adapter {
        AnalyzerKind::Simulated => {
            let latency = Duration::from_millis(cfg.analysis.latency_ms);
            Arc::new(match cfg.analysis.seed {
                Some(seed) => SimulatedAnalyzer::seeded(latency, seed),
                None => SimulatedAnalyzer::new(latency),
            })
        }
        AnalyzerKind::Nats => Arc::new(
            NatsAnalyzer::connect(
                &cfg.analysis.nats_url,
                Duration::from_millis(cfg.analysis.timeout_ms),
            )
            .await?
            .with_subject(cfg.analysis.subject.clone()),
        ),
    };
    info!("Analysis adapter: {}", analyzer.name());

    Ok(Arc::new(
        Detector::new(session, analyzer)
            .with_timeout(Duration::from_millis(cfg.analysis.timeout_ms)),
    ))
}

async fn serve(cfg: Config) -> Result<()> {
    let detector = build_detector(&cfg, cfg.audio.source()).await?;
    let renderer = WaveformRenderer::new(cfg.waveform.width, cfg.waveform.height)?;

    let state = AppState::new(Arc::clone(&detector), renderer);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    detector.session().teardown().await;
    Ok(())
}

async fn record(
    cfg: Config,
    source: AudioSource,
    duration: Duration,
    save_wav: Option<String>,
    snapshot: Option<String>,
) -> Result<()> {
    let detector = build_detector(&cfg, source).await?;
    let session = detector.session();

    let permission = session.probe_permission().await;
    info!("Microphone permission: {:?}", permission);

    detector
        .start()
        .await
        .context("Failed to start recording")?;

    info!("Recording for {} seconds, speak now", duration.as_secs());
    tokio::time::sleep(duration).await;

    if let Some(path) = snapshot {
        let mut renderer = WaveformRenderer::new(cfg.waveform.width, cfg.waveform.height)?;
        detector.paint(&mut renderer);
        renderer.save_png(expand_path(&path))?;
    }

    let Some((clip, ticket)) = detector.stop().await else {
        warn!("Recording ended before it could be finalized");
        if let Some(e) = session.last_error().await {
            anyhow::bail!("Recording failed: {}", e);
        }
        return Ok(());
    };

    info!(
        "Captured {} bytes ({})",
        clip.len(),
        clip.duration_secs()
            .map(|s| format!("{:.1}s", s))
            .unwrap_or_else(|| clip.media_type().to_string())
    );

    if let Some(path) = save_wav {
        let path = cfg.audio.recordings_dir().join(expand_path(&path));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        clip.save_wav(&path)?;
    }

    info!("Analyzing your statement...");
    let analysis = detector.complete_analysis(ticket, &clip).await;

    println!("{}", analysis.share_text());
    Ok(())
}
