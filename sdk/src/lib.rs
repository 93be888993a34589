//! Triptych SDK
//!
//! Shared types and errors for the Triptych engine and the programs that
//! drive it. Callers that persist suspended runs only need this crate.

/// Error types and handling
pub mod errors;

/// Run state types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, TriptychErrorExt};
pub use types::{
    flatten_critiques, CritiqueMap, GeneratorIndex, RedoSet, RunOutcome, RunState, StatePatch,
    GENERATOR_COUNT,
};
