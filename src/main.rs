// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use study_guardian::pipeline::{
    run_calibration, EventEmitter, JpegImageWriter, JsonlStorage, LogAlertSink, MonitoringSession,
    PipelineMetrics, ReplayFrameSource, SessionRunner,
};
use study_guardian::posture::{PostureCalibrator, PostureClassifier};
use study_guardian::recognition::Gallery;
use study_guardian::Config;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/settings.yaml";

#[derive(Parser, Debug)]
#[command(name = "study-guardian", about = "Study-desk posture monitor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay frames through the monitoring session
    Run {
        #[arg(default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Derive posture thresholds from good-posture frames and save them
    Calibrate {
        #[arg(default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Samples to collect before finishing
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        samples: Option<u64>,
    },
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Sets the returned flag on Ctrl-C; the loop checks it between frames
fn install_stop_handler() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl-C received");
            flag.store(true, Ordering::Relaxed);
        }
    });
    stop
}

#[tokio::main]
async fn main() -> Result<()> {
    let command = Cli::parse().command.unwrap_or(Command::Run {
        config: PathBuf::from(DEFAULT_CONFIG_PATH),
    });
    let config_path = match &command {
        Command::Run { config } | Command::Calibrate { config, .. } => config.clone(),
    };

    let config = Config::load(&config_path)?;
    init_logging(&config);
    info!("🪑 Study Guardian starting");
    info!("✓ Configuration loaded from {}", config_path.display());

    let result = match command {
        Command::Run { .. } => run(config).await,
        Command::Calibrate { samples, .. } => calibrate(config, config_path, samples).await,
    };
    if let Err(e) = &result {
        error!("❌ {:#}", e);
    }
    result
}

async fn run(config: Config) -> Result<()> {
    config.validate()?;

    let gallery = Gallery::load_dir(&config.recognition.gallery_dir)?;
    if gallery.is_empty() {
        warn!("⚠️  No known faces; everyone will be reported as unknown");
    }

    let metrics = PipelineMetrics::new();
    let emitter = EventEmitter::new(
        Box::new(JsonlStorage::open(&config.storage.events_path)?),
        Box::new(LogAlertSink),
        Box::new(JpegImageWriter::new(&config.capture)),
        metrics.clone(),
    );
    let source = ReplayFrameSource::open(&config.source.replay_path)?;
    let target_fps = config.source.target_fps;
    let session = MonitoringSession::new(config, gallery, emitter, metrics)?;
    info!("✓ Session ready");

    let stop = install_stop_handler();
    let report = tokio::task::spawn_blocking(move || {
        let mut runner = SessionRunner::new(session, Box::new(source), target_fps);
        runner.run(&stop)
    })
    .await??;

    info!(
        "✓ Done: {} frames, {} alerts, {:.1} FPS",
        report.frames, report.metrics.alerts_opened, report.metrics.fps
    );
    Ok(())
}

async fn calibrate(mut config: Config, config_path: PathBuf, samples: Option<u64>) -> Result<()> {
    config.validate()?;
    let mut calibrator = match samples {
        Some(n) => PostureCalibrator::new(
            n as usize,
            study_guardian::posture::calibration::DEFAULT_NOSE_MARGIN,
            study_guardian::posture::calibration::DEFAULT_ANGLE_MARGIN,
        ),
        None => PostureCalibrator::default(),
    };
    let classifier = PostureClassifier::new(config.posture.clone());
    let mut source = ReplayFrameSource::open(&config.source.replay_path)?;

    let stop = install_stop_handler();
    let result = tokio::task::spawn_blocking(move || {
        run_calibration(&mut source, &classifier, &mut calibrator, &stop)
    })
    .await??;

    info!(
        "✓ Calibrated over {} samples: avg nose_drop={:.3}, avg neck_angle={:.1}°",
        result.samples, result.avg_nose_drop, result.avg_neck_angle
    );
    info!(
        "  New thresholds: nose_drop={:.3}, neck_angle={:.1}°",
        result.nose_drop, result.neck_angle
    );

    result.apply(&mut config.posture);
    config.validate()?;
    config.save(&config_path)?;
    info!("✓ Saved calibration to {}", config_path.display());
    Ok(())
}
