//! Fast emotional reading of user messages.
//!
//! Everything here is pure: the persisted tracker in `instinct_memory`
//! combines these pieces with storage.

pub mod classifier;
pub mod guidance;
pub mod transitions;

pub use classifier::{classify, signals_frustration, signals_satisfaction};
pub use guidance::{guidance, guidance_line};
pub use transitions::{decide, is_allowed, successors, HoldReason, TransitionOutcome};
