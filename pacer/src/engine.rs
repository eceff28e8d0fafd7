use frame_pacer_common::frame::Frame;
use std::future::Future;

/// The inference seam: turns one decoded-on-demand frame into a result.
///
/// Implementations may keep state across frames. The pacing controller
/// guarantees `infer` is never called concurrently on the same engine.
pub trait InferenceEngine: Send + Sync + 'static {
    type Output: Send + 'static;

    fn infer(&self, frame: Frame) -> impl Future<Output = Result<Self::Output, InferenceError>> + Send;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum InferenceError {
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("inference failed: {0}")]
    Engine(String),
    #[error("inference panicked: {0}")]
    Panicked(String),
}
