//! Loopscope - an agent-scoped registry for multi-round research loops
//!
//! Loopscope tracks research topics through an explicit cycle of agent
//! checkpoints and operator continue/close decisions, scores every
//! checkpoint, and serves triage views (hot, needs-decision, needs-review,
//! stale) over a single file-backed store shared across processes.

pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod registry;
pub mod sanitize;
pub mod storage;
pub mod triage;

pub use error::{RegistryError, Result};
pub use registry::ResearchLoopRegistry;
