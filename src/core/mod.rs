//! Core primitives.
//!
//! Building blocks shared by the log book, the engine transport and the
//! interactor: ordered execution and state fingerprints.

pub mod hash;
pub mod queue;

// Re-export core types
pub use hash::{state_hash, StateHash, StateHasher};
pub use queue::{QueueError, SerialQueue};
