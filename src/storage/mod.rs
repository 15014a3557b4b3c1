//! Persistence for the research loop registry.
//!
//! One JSON document holds every loop; an advisory sidecar lock serializes
//! read-modify-write cycles across processes. Readers that only observe
//! state load the document without the lock.

pub mod document;
pub mod lock;

pub use document::{load_document, save_document, RegistryDocument, SCHEMA_VERSION};
pub use lock::StoreLock;
