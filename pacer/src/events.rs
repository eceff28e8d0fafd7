use std::time::Duration;
use tokio::sync::mpsc;

use crate::engine::InferenceError;

/// Observability signal emitted by the pacing controller.
#[derive(Debug)]
pub enum PacerEvent<R> {
    /// The frame was handed to the engine.
    FrameAccepted { seq: u64 },
    /// The frame was parked while busy (`DropPolicy::Latest` only).
    FrameDeferred { seq: u64 },
    /// The frame was discarded and will never be revisited.
    FrameDropped { seq: u64 },
    InferenceCompleted {
        seq: u64,
        output: R,
        elapsed: Duration,
    },
    InferenceError { seq: u64, cause: InferenceError },
}

impl<R> PacerEvent<R> {
    pub fn seq(&self) -> u64 {
        match self {
            PacerEvent::FrameAccepted { seq }
            | PacerEvent::FrameDeferred { seq }
            | PacerEvent::FrameDropped { seq }
            | PacerEvent::InferenceCompleted { seq, .. }
            | PacerEvent::InferenceError { seq, .. } => *seq,
        }
    }
}

/// Consumer of pacing events and inference results.
///
/// Called from the arrival path and from the inference task, so it must not
/// block.
pub trait ResultSink<R>: Send + Sync + 'static {
    fn record(&self, event: PacerEvent<R>);
}

/// Forwards every event into an unbounded channel.
pub struct ChannelSink<R> {
    tx: mpsc::UnboundedSender<PacerEvent<R>>,
}

impl<R> ChannelSink<R> {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PacerEvent<R>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl<R: Send + 'static> ResultSink<R> for ChannelSink<R> {
    fn record(&self, event: PacerEvent<R>) {
        // A closed receiver just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}
