use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frame_pacer_common::config::DropPolicy;
use frame_pacer_common::frame::Frame;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::engine::{InferenceEngine, InferenceError};
use crate::events::{PacerEvent, ResultSink};
use crate::guard::BusyGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
    /// No inference in flight; the next frame is accepted.
    Idle,
    /// One inference in flight; arriving frames are dropped or parked.
    Busy,
}

/// Point-in-time counters for one controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacerStats {
    pub frames_seen: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
}

impl PacerStats {
    /// Fraction of arrived frames that were dropped, 0.0 when nothing arrived.
    pub fn drop_rate(&self) -> f64 {
        if self.frames_seen == 0 {
            return 0.0;
        }
        self.dropped as f64 / self.frames_seen as f64
    }
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// State shared between the controller and its in-flight inference task.
struct Shared {
    state: Arc<watch::Sender<PacerState>>,
    /// Parked frame for `DropPolicy::Latest`. Its lock also serializes the
    /// busy release against arrivals so a parked frame is never stranded.
    parked: Mutex<Option<Frame>>,
    counters: Counters,
}

impl Shared {
    fn parked(&self) -> MutexGuard<'_, Option<Frame>> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admits at most one frame at a time into an [`InferenceEngine`].
///
/// `on_frame` is meant to be driven by a single caller in arrival order. It
/// never waits on inference: an accepted frame runs on a spawned tokio task
/// that owns the busy state until the engine returns, fails or panics.
pub struct PacingController<E: InferenceEngine, S: ResultSink<E::Output>> {
    engine: Arc<E>,
    sink: Arc<S>,
    policy: DropPolicy,
    shared: Arc<Shared>,
    frames_seen: u64,
}

impl<E, S> PacingController<E, S>
where
    E: InferenceEngine,
    S: ResultSink<E::Output>,
{
    pub fn new(engine: E, sink: S, policy: DropPolicy) -> Self {
        let (state, _) = watch::channel(PacerState::Idle);
        Self {
            engine: Arc::new(engine),
            sink: Arc::new(sink),
            policy,
            shared: Arc::new(Shared {
                state: Arc::new(state),
                parked: Mutex::new(None),
                counters: Counters::default(),
            }),
            frames_seen: 0,
        }
    }

    /// Handle one frame boundary event. Must be called within a tokio runtime.
    pub fn on_frame(&mut self, frame: Frame) {
        self.frames_seen += 1;
        let seq = frame.seq;

        let mut parked = self.shared.parked();
        let Some(guard) = BusyGuard::try_acquire(&self.shared.state) else {
            match self.policy {
                DropPolicy::Drop => {
                    drop(parked);
                    self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(seq, "busy, frame dropped");
                    self.sink.record(PacerEvent::FrameDropped { seq });
                }
                DropPolicy::Latest => {
                    if let Some(stale) = parked.replace(frame) {
                        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(seq = stale.seq, replaced_by = seq, "parked frame dropped");
                        self.sink.record(PacerEvent::FrameDropped { seq: stale.seq });
                    }
                    drop(parked);
                    trace!(seq, "busy, frame parked");
                    self.sink.record(PacerEvent::FrameDeferred { seq });
                }
            }
            return;
        };
        drop(parked);

        self.shared.counters.accepted.fetch_add(1, Ordering::Relaxed);
        debug!(seq, bytes = frame.payload_size(), engine = self.engine.name(), "frame accepted");
        self.sink.record(PacerEvent::FrameAccepted { seq });
        self.submit(guard, frame);
    }

    fn submit(&self, guard: BusyGuard, frame: Frame) {
        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let mut frame = frame;
            loop {
                run_inference(&*engine, &*sink, &shared.counters, frame).await;

                frame = {
                    let mut parked = shared.parked();
                    match parked.take() {
                        Some(next) => next,
                        None => {
                            // Release while holding the slot lock.
                            drop(guard);
                            break;
                        }
                    }
                };
                shared.counters.accepted.fetch_add(1, Ordering::Relaxed);
                debug!(seq = frame.seq, "parked frame accepted");
                sink.record(PacerEvent::FrameAccepted { seq: frame.seq });
            }
        });
    }

    pub fn state(&self) -> PacerState {
        *self.shared.state.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.state() == PacerState::Busy
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    pub fn stats(&self) -> PacerStats {
        let counters = &self.shared.counters;
        PacerStats {
            frames_seen: self.frames_seen,
            accepted: counters.accepted.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Resolve once no inference is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.state.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|state| *state == PacerState::Idle).await;
    }
}

/// Run one inference and report its outcome. Never panics, never fails.
async fn run_inference<E, S>(engine: &E, sink: &S, counters: &Counters, frame: Frame)
where
    E: InferenceEngine,
    S: ResultSink<E::Output>,
{
    let seq = frame.seq;
    let started = Instant::now();

    // The call itself sits inside the async block so a panic raised before
    // the engine hands back a future is caught too.
    let outcome = AssertUnwindSafe(async move { engine.infer(frame).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(InferenceError::Panicked(panic_message(payload))));

    match outcome {
        Ok(output) => {
            let elapsed = started.elapsed();
            counters.completed.fetch_add(1, Ordering::Relaxed);
            debug!(seq, elapsed_ms = elapsed.as_millis() as u64, "inference complete");
            sink.record(PacerEvent::InferenceCompleted {
                seq,
                output,
                elapsed,
            });
        }
        Err(cause) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            debug!(seq, error = %cause, "inference failed");
            sink.record(PacerEvent::InferenceError { seq, cause });
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}
