//! Domain types for the research loop registry.

pub mod checkpoint;
pub mod loop_record;
pub mod scoring;

pub use checkpoint::{CheckpointRecord, DecisionKind, DecisionRecord, Recommendation};
pub use loop_record::{LoopPriority, LoopRecord, LoopState};
