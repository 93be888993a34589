//! Routing after the critic
//!
//! A pure function of the run state. Rules are checked in a fixed order:
//! 1. clarification questions pending: suspend for the user
//! 2. refinement ceiling reached: go to the editor
//! 3. critiques present: run the generators again
//! 4. otherwise the drafts are approved: go to the editor

use sdk::types::RunState;
use std::fmt;

/// Where the graph goes after the critic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    AwaitUser,
    Generator,
    Editor,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::AwaitUser => write!(f, "await_user"),
            Route::Generator => write!(f, "generator"),
            Route::Editor => write!(f, "editor"),
        }
    }
}

/// Choose the next stage
pub fn decide(state: &RunState, max_iterations: u32) -> Route {
    if !state.questions_for_user.is_empty() {
        tracing::info!(
            run_id = %state.run_id,
            "Critic has {} question(s) for the user",
            state.questions_for_user.len()
        );
        return Route::AwaitUser;
    }

    if state.iteration_count >= max_iterations {
        tracing::info!(
            run_id = %state.run_id,
            "Iteration limit {} reached, handing drafts to the editor",
            max_iterations
        );
        return Route::Editor;
    }

    if !state.critiques_flat.is_empty() {
        tracing::info!(
            run_id = %state.run_id,
            iteration = state.iteration_count,
            "Drafts need revision ({} critique(s))",
            state.critiques_flat.len()
        );
        return Route::Generator;
    }

    tracing::info!(run_id = %state.run_id, "Drafts approved");
    Route::Editor
}
