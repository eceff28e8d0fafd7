//! Frame pacing between a bursty frame source and a slower, non-reentrant
//! inference engine.
//!
//! A [`PacingController`] admits at most one frame into inference at a time.
//! Frames arriving while an inference is in flight are dropped (or parked in
//! a single slot, see [`DropPolicy::Latest`]), so the engine always works on
//! the freshest frame available when it becomes free.

pub mod controller;
pub mod engine;
pub mod events;
mod guard;

pub use controller::{PacerState, PacerStats, PacingController};
pub use engine::{InferenceEngine, InferenceError};
pub use events::{ChannelSink, PacerEvent, ResultSink};
pub use frame_pacer_common::config::DropPolicy;
