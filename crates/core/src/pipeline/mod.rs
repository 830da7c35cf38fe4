//! # Pipeline
//!
//! The quality-gated retrieval loop and its events.

pub mod controller;
pub mod events;
pub mod stage;

pub use controller::{IterationController, PipelineResult};
pub use events::{PipelineEvent, PipelineEventKind};
pub use stage::{IterationLoop, LoopState, Termination};
