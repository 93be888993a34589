//! Generator stage
//!
//! Produces or revises the three drafts. Only the generators in the redo set
//! are called, concurrently, and each one continues its own session:
//!
//! - empty session: full request (topic, style, attachment, critiques, answer)
//! - existing session: only this generator's critiques plus the user's answer
//!
//! A failed call never reaches the drafts. The previous draft is kept, the
//! session is discarded so the next attempt starts clean, and the cycle goes on.

use crate::conductor::prompts::{or_none, style_for, PromptKind, PromptSet};
use crate::conductor::sessions::SessionStore;
use crate::conductor::step_log::{StepLog, StepRecord};
use crate::llm::router::{AgentRole, ModelRouter};
use crate::llm::{LLMError, Message};
use crate::secrets::scrub;
use futures::future::join_all;
use sdk::types::{GeneratorIndex, RedoSet, RunState, StatePatch};
use serde_json::json;
use std::sync::Arc;

/// Result of one generator call
#[derive(Debug)]
struct Attempt {
    index: GeneratorIndex,
    revision: bool,
    result: Result<String, LLMError>,
}

/// Generator stage
pub struct Generator {
    router: Arc<ModelRouter>,
    prompts: Arc<PromptSet>,
    sessions: Arc<SessionStore>,
    step_log: Arc<dyn StepLog>,
}

impl Generator {
    pub fn new(
        router: Arc<ModelRouter>,
        prompts: Arc<PromptSet>,
        sessions: Arc<SessionStore>,
        step_log: Arc<dyn StepLog>,
    ) -> Self {
        Self {
            router,
            prompts,
            sessions,
            step_log,
        }
    }

    /// Run one generator cycle. Never fails: call errors stay local to their draft.
    pub async fn run(&self, state: &RunState) -> StatePatch {
        let iteration = state.iteration_count + 1;
        let pending = pending_generators(state, iteration);

        let mut attempts =
            join_all(pending.iter().map(|&index| self.attempt(state, index))).await;
        attempts.sort_by_key(|attempt| attempt.index);

        let mut drafts = state.drafts.clone();

        for attempt in attempts {
            let agent = AgentRole::Generator(attempt.index);
            let mut metadata = json!({
                "style": style_for(attempt.index),
                "revision": attempt.revision,
                "has_attached_content": state.attached_content.is_some(),
                "has_critiques": !state.critiques_for(attempt.index).is_empty(),
                "has_user_response": state.user_response.is_some(),
            });

            match attempt.result {
                Ok(draft) => {
                    metadata["success"] = json!(true);
                    self.step_log.record(
                        StepRecord::new(&state.run_id, agent, &state.topic, iteration, draft.clone())
                            .with_metadata(metadata),
                    );
                    drafts[attempt.index.slot()] = draft;
                }
                Err(e) => {
                    let message = scrub(&e.to_string());
                    tracing::warn!(
                        run_id = %state.run_id,
                        "Generator {} failed, keeping its previous draft: {}",
                        attempt.index,
                        message
                    );
                    metadata["success"] = json!(false);
                    metadata["error"] = json!(message);
                    self.step_log.record(
                        StepRecord::new(&state.run_id, agent, &state.topic, iteration, "")
                            .with_metadata(metadata),
                    );
                }
            }
        }

        tracing::info!(
            run_id = %state.run_id,
            iteration,
            "Generator cycle finished ({} draft(s) requested)",
            pending.len()
        );

        StatePatch {
            drafts: Some(drafts),
            clear_user_response: true,
            advance_iteration: true,
            drafts_to_redo: Some(RedoSet::new()),
            ..Default::default()
        }
    }

    async fn attempt(&self, state: &RunState, index: GeneratorIndex) -> Attempt {
        let session = self.sessions.get(&state.run_id, index);
        let mut history = session.lock().await;

        let revision = !history.is_empty();
        let request = if revision {
            self.revision_request(state, index)
        } else {
            self.initial_request(state, index)
        };

        let mut messages = history.clone();
        messages.push(Message::user(request));

        match self
            .router
            .call(AgentRole::Generator(index), &messages)
            .await
        {
            Ok(draft) => {
                messages.push(Message::assistant(draft.clone()));
                *history = messages;
                Attempt {
                    index,
                    revision,
                    result: Ok(draft),
                }
            }
            Err(e) => {
                drop(history);
                self.sessions.remove(&state.run_id, index);
                Attempt {
                    index,
                    revision,
                    result: Err(e),
                }
            }
        }
    }

    fn initial_request(&self, state: &RunState, index: GeneratorIndex) -> String {
        let critiques = state.critiques_for(index).join("\n");
        self.prompts.render(
            PromptKind::Generator,
            &[
                ("topic", state.topic.as_str()),
                ("style", style_for(index)),
                ("attachment", or_none(state.attached_content.as_deref())),
                ("critiques", or_none(Some(critiques.as_str()))),
                ("user_response", or_none(state.user_response.as_deref())),
            ],
        )
    }

    fn revision_request(&self, state: &RunState, index: GeneratorIndex) -> String {
        let critiques = state.critiques_for(index).join("\n");
        self.prompts.render(
            PromptKind::Revision,
            &[
                ("critiques", or_none(Some(critiques.as_str()))),
                ("user_response", or_none(state.user_response.as_deref())),
            ],
        )
    }
}

/// Generators to call on the cycle that will become `iteration`
fn pending_generators(state: &RunState, iteration: u32) -> RedoSet {
    if !state.drafts_to_redo.is_empty() {
        return state.drafts_to_redo.clone();
    }

    if iteration == 1 {
        return GeneratorIndex::ALL.into_iter().collect();
    }

    tracing::warn!(
        run_id = %state.run_id,
        "Generator cycle {} started with nothing to redo; drafts carried forward",
        iteration
    );
    RedoSet::new()
}
