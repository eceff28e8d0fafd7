mod engine;
mod sink;

use engine::SceneAnalyzer;
use frame_pacer::{InferenceEngine, PacingController, ResultSink};
use frame_pacer_common::config::Config;
use frame_pacer_common::frame::Frame;
use frame_pacer_ingest::ffmpeg::{self, FfmpegSource};
use frame_pacer_ingest::{mjpeg, IngestError};
use sink::LogSink;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        input = config.source.input,
        realtime = config.source.realtime,
        policy = ?config.pacing.policy,
        hash_size = config.analysis.hash_size,
        motion_threshold = config.analysis.motion_threshold,
        "starting frame-pacer analyzer"
    );

    ffmpeg::check_ffmpeg_available(&config.source.ffmpeg_path).await;

    let mut source = match FfmpegSource::spawn(&config.source) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to start frame source");
            std::process::exit(1);
        }
    };
    let Some(stdout) = source.take_stdout() else {
        error!(error = %IngestError::MissingStdout, "failed to start frame source");
        std::process::exit(1);
    };

    let (tx, mut rx) = mpsc::channel(config.pacing.channel_capacity);
    let max_frame_bytes = config.source.max_frame_bytes;
    let chunk_bytes = config.source.read_chunk_bytes;
    let reader =
        tokio::spawn(async move { mjpeg::read_frames(stdout, tx, max_frame_bytes, chunk_bytes).await });

    let analyzer = SceneAnalyzer::new(config.analysis.clone());
    let mut pacer = PacingController::new(analyzer, LogSink, config.pacing.policy);

    info!("entering frame pacing loop");
    let interrupted = run_pacing_loop(&mut rx, &mut pacer).await;
    if interrupted {
        source.kill().await;
    }
    drop(rx);

    match reader.await {
        Ok(Ok(frames)) => debug!(frames, "frame reader finished"),
        Ok(Err(e)) => warn!(error = %e, "frame reader failed"),
        Err(e) => warn!(error = %e, "frame reader task failed"),
    }
    if let Err(e) = source.wait().await {
        warn!(error = %e, "could not collect ffmpeg exit status");
    }

    // Let the in-flight analysis finish before reporting.
    pacer.wait_idle().await;
    let stats = pacer.stats();
    info!(
        frames_seen = stats.frames_seen,
        accepted = stats.accepted,
        dropped = stats.dropped,
        completed = stats.completed,
        failed = stats.failed,
        drop_rate = format!("{:.3}", stats.drop_rate()),
        "pacing summary"
    );
}

/// Feed frames to the controller until the stream ends or Ctrl-C arrives.
/// Returns `true` when interrupted.
async fn run_pacing_loop<E, S>(
    rx: &mut mpsc::Receiver<Frame>,
    pacer: &mut PacingController<E, S>,
) -> bool
where
    E: InferenceEngine,
    S: ResultSink<E::Output>,
{
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => {
                    pacer.on_frame(frame);
                    if pacer.frames_seen() % 100 == 0 {
                        let stats = pacer.stats();
                        debug!(
                            frames_seen = stats.frames_seen,
                            accepted = stats.accepted,
                            dropped = stats.dropped,
                            "frames processed"
                        );
                    }
                }
                None => {
                    info!("frame source ended");
                    return false;
                }
            },
            _ = &mut shutdown => {
                info!("interrupt received, stopping frame source");
                return true;
            }
        }
    }
}
