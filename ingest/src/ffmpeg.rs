use frame_pacer_common::config::SourceConfig;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::IngestError;

/// A running ffmpeg process writing motion JPEG to its stdout.
pub struct FfmpegSource {
    child: Child,
    stdout: Option<ChildStdout>,
}

/// Build the ffmpeg argument list for `config`.
///
/// Audio is dropped and every video frame is re-encoded as a standalone
/// JPEG written back to back on `pipe:1`.
pub fn build_args(config: &SourceConfig) -> Vec<String> {
    let mut args: Vec<String> = vec!["-loglevel".into(), config.loglevel.clone()];
    if config.realtime {
        args.push("-re".into());
    }
    args.extend([
        "-i".into(),
        config.input.clone(),
        "-an".into(),
        "-c:v".into(),
        "mjpeg".into(),
        "-pix_fmt".into(),
        config.pix_fmt.clone(),
        "-f".into(),
        "image2pipe".into(),
    ]);
    if let Some(filter) = config.video_filter.as_deref().filter(|f| !f.trim().is_empty()) {
        args.push("-vf".into());
        args.push(filter.to_string());
    }
    args.push("pipe:1".into());
    args
}

impl FfmpegSource {
    /// Spawn ffmpeg with stdout piped and everything else discarded.
    pub fn spawn(config: &SourceConfig) -> Result<Self, IngestError> {
        let args = build_args(config);

        let mut child = Command::new(&config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| IngestError::Spawn(e.to_string()))?;

        let stdout = child.stdout.take();

        info!(
            ffmpeg = config.ffmpeg_path,
            input = config.input,
            realtime = config.realtime,
            pid = child.id(),
            "ffmpeg frame source started"
        );
        debug!(args = ?args, "ffmpeg arguments");

        Ok(Self { child, stdout })
    }

    /// Take the MJPEG stream. Returns `None` after the first call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Wait for ffmpeg to exit and log how it ended.
    pub async fn wait(&mut self) -> Result<ExitStatus, IngestError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| IngestError::Wait(e.to_string()))?;
        info!(code = ?status.code(), signal = ?exit_signal(&status), "ffmpeg exit");
        Ok(status)
    }

    /// Kill ffmpeg. A process that already exited is not an error.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "ffmpeg kill failed, process likely already exited");
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Check whether ffmpeg is runnable. Logs a warning if not found.
pub async fn check_ffmpeg_available(ffmpeg_path: &str) -> bool {
    match Command::new(ffmpeg_path).arg("-version").output().await {
        Ok(out) if out.status.success() => {
            debug!(ffmpeg = ffmpeg_path, "ffmpeg is available");
            true
        }
        Ok(_) => {
            warn!(ffmpeg = ffmpeg_path, "ffmpeg returned non-zero for -version; frame source may fail");
            false
        }
        Err(e) => {
            warn!(
                error = %e,
                ffmpeg = ffmpeg_path,
                "ffmpeg not found; install ffmpeg or set source.ffmpeg_path"
            );
            false
        }
    }
}
