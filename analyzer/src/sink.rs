use frame_pacer::{PacerEvent, ResultSink};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

/// Writes every pacing event to the tracing subscriber.
///
/// Completed results are logged as a single JSON line so they can be picked
/// out of the log stream by field.
pub struct LogSink;

impl<R> ResultSink<R> for LogSink
where
    R: Serialize + Send + 'static,
{
    fn record(&self, event: PacerEvent<R>) {
        match event {
            PacerEvent::FrameAccepted { seq } => trace!(seq, "accepted"),
            PacerEvent::FrameDeferred { seq } => trace!(seq, "parked"),
            PacerEvent::FrameDropped { seq } => debug!(seq, "dropped"),
            PacerEvent::InferenceCompleted {
                seq,
                output,
                elapsed,
            } => match serde_json::to_string(&output) {
                Ok(json) => info!(
                    seq,
                    elapsed_ms = elapsed.as_millis() as u64,
                    result = %json,
                    "analysis"
                ),
                Err(e) => warn!(seq, error = %e, "failed to serialize analysis result"),
            },
            PacerEvent::InferenceError { seq, cause } => {
                warn!(seq, error = %cause, "analysis failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_pacer::InferenceError;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn records_every_event_kind() {
        let sink = LogSink;
        sink.record(PacerEvent::<u32>::FrameAccepted { seq: 1 });
        sink.record(PacerEvent::<u32>::FrameDeferred { seq: 2 });
        sink.record(PacerEvent::<u32>::FrameDropped { seq: 3 });
        sink.record(PacerEvent::InferenceCompleted {
            seq: 1,
            output: 7u32,
            elapsed: Duration::from_millis(12),
        });
        sink.record(PacerEvent::<u32>::InferenceError {
            seq: 4,
            cause: InferenceError::Decode("truncated".into()),
        });
    }

    #[test]
    fn unserializable_result_is_not_fatal() {
        // JSON object keys must be strings.
        let mut output = HashMap::new();
        output.insert((1u8, 2u8), 3u8);
        LogSink.record(PacerEvent::InferenceCompleted {
            seq: 9,
            output,
            elapsed: Duration::ZERO,
        });
    }
}
