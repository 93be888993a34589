//! Conductor System
//!
//! Orchestrates the three draft generators, the critic and the editor over a
//! shared run state, and owns the per-generator conversation sessions.

pub mod critic;
pub mod decision;
pub mod editor;
pub mod generator;
pub mod orchestrator;
pub mod prompter;
pub mod prompts;
pub mod sessions;
pub mod step_log;

#[cfg(test)]
mod testing;

pub use critic::{Critic, CriticVerdict, Verdict};
pub use decision::{decide, Route};
pub use editor::Editor;
pub use generator::Generator;
pub use orchestrator::{Limits, Orchestrator};
pub use prompter::{Prompter, RefinementOutcome};
pub use prompts::{PromptKind, PromptSet};
pub use sessions::{EvictionPolicy, SessionHandle, SessionStore};
pub use step_log::{JsonlStepLog, MemoryStepLog, NullStepLog, StepLog, StepRecord};
