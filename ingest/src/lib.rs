pub mod ffmpeg;
pub mod mjpeg;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("ffmpeg stdout was not captured")]
    MissingStdout,
    #[error("failed to read frame stream: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to wait for ffmpeg: {0}")]
    Wait(String),
}
