//! Orchestrator
//!
//! Drives one run through the graph:
//!
//! ```text
//! Generator -> Critic -> decide -> Generator (loop)
//!                               -> Editor -> end
//!                               -> await user (suspend)
//! ```
//!
//! Every invocation starts at the Generator. A run suspended for the user is
//! resumed by invoking the graph again with the answer merged into the saved
//! state. Each node execution counts against a hard step ceiling that is
//! independent of the refinement ceiling.

use crate::conductor::critic::Critic;
use crate::conductor::decision::{decide, Route};
use crate::conductor::editor::Editor;
use crate::conductor::generator::Generator;
use crate::conductor::prompts::PromptSet;
use crate::conductor::sessions::{EvictionPolicy, SessionStore};
use crate::conductor::step_log::StepLog;
use crate::config::Config;
use crate::llm::router::ModelRouter;
use sdk::errors::EngineError;
use sdk::types::RunState;
use std::sync::Arc;

/// Refinement and step ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Generator cycles after which the editor is forced
    pub max_iterations: u32,
    /// Node executions allowed per invocation
    pub step_limit: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            step_limit: 25,
        }
    }
}

impl Limits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.orchestration.max_iterations,
            step_limit: config.orchestration.step_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Generator,
    Critic,
    Editor,
}

/// Runs the generator, critic and editor graph
pub struct Orchestrator {
    generator: Generator,
    critic: Critic,
    editor: Editor,
    sessions: Arc<SessionStore>,
    limits: Limits,
}

impl Orchestrator {
    pub fn new(
        router: Arc<ModelRouter>,
        prompts: Arc<PromptSet>,
        step_log: Arc<dyn StepLog>,
        limits: Limits,
        eviction: EvictionPolicy,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(eviction));

        Self {
            generator: Generator::new(
                Arc::clone(&router),
                Arc::clone(&prompts),
                Arc::clone(&sessions),
                Arc::clone(&step_log),
            ),
            critic: Critic::new(
                Arc::clone(&router),
                Arc::clone(&prompts),
                Arc::clone(&step_log),
            ),
            editor: Editor::new(router, prompts, step_log),
            sessions,
            limits,
        }
    }

    /// Orchestrator configured from the `[orchestration]` and `[sessions]` sections
    pub fn from_config(
        config: &Config,
        router: Arc<ModelRouter>,
        prompts: Arc<PromptSet>,
        step_log: Arc<dyn StepLog>,
    ) -> Self {
        Self::new(
            router,
            prompts,
            step_log,
            Limits::from_config(config),
            config.sessions.eviction_policy(),
        )
    }

    /// Generator sessions of every run handled by this orchestrator
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Start a new run
    pub async fn start(
        &self,
        run_id: impl Into<String>,
        topic: impl Into<String>,
        attached_content: Option<String>,
    ) -> Result<RunState, EngineError> {
        self.run_once(RunState::fresh(run_id, topic, attached_content))
            .await
    }

    /// Continue a run that was suspended for the user
    ///
    /// # Errors
    /// Returns `EngineError::NotAwaitingUser` if the state has no pending questions.
    pub async fn resume(
        &self,
        suspended: RunState,
        answer: impl Into<String>,
    ) -> Result<RunState, EngineError> {
        if suspended.questions_for_user.is_empty() {
            return Err(EngineError::NotAwaitingUser(suspended.run_id));
        }
        self.run_once(suspended.resume(answer)).await
    }

    /// Run the graph from the Generator until it suspends or finishes.
    ///
    /// The returned state has pending questions, a final summary, or neither.
    ///
    /// # Errors
    /// - `EngineError::InvalidState` if the state has no run id or topic
    /// - `EngineError::AgentCallFailed` if the critic or editor call fails
    /// - `EngineError::StepLimitExceeded` if the step ceiling is hit
    pub async fn run_once(&self, mut state: RunState) -> Result<RunState, EngineError> {
        if state.run_id.trim().is_empty() {
            return Err(EngineError::InvalidState("run id is empty".to_string()));
        }
        if state.topic.trim().is_empty() {
            return Err(EngineError::InvalidState("topic is empty".to_string()));
        }
        if !state.questions_for_user.is_empty() {
            tracing::warn!(
                run_id = %state.run_id,
                "Run entered with unanswered questions; they will be replaced by the next verdict"
            );
        }

        let mut node = Node::Generator;
        let mut steps: u32 = 0;

        loop {
            steps += 1;
            if steps > self.limits.step_limit {
                tracing::error!(
                    run_id = %state.run_id,
                    "Step limit {} exceeded at iteration {}",
                    self.limits.step_limit,
                    state.iteration_count
                );
                return Err(EngineError::StepLimitExceeded {
                    limit: self.limits.step_limit,
                });
            }

            tracing::debug!(run_id = %state.run_id, step = steps, "Entering {:?}", node);

            node = match node {
                Node::Generator => {
                    let patch = self.generator.run(&state).await;
                    state = state.apply(patch);
                    Node::Critic
                }
                Node::Critic => {
                    let patch = self.critic.run(&state).await?;
                    state = state.apply(patch);
                    match decide(&state, self.limits.max_iterations) {
                        Route::AwaitUser => return Ok(state),
                        Route::Generator => Node::Generator,
                        Route::Editor => Node::Editor,
                    }
                }
                Node::Editor => {
                    let patch = self.editor.run(&state).await?;
                    return Ok(state.apply(patch));
                }
            };
        }
    }
}
