//! Request refinement
//!
//! Optional step run by the caller before a fresh run. The model either
//! rewrites the request into a precise topic or asks clarification questions.
//! Any failure, including a reply that is not valid JSON, lets the request
//! through unchanged.

use crate::conductor::prompts::{or_none, PromptKind, PromptSet};
use crate::conductor::step_log::{StepLog, StepRecord};
use crate::llm::router::{AgentRole, ModelRouter};
use crate::llm::{parse_json_reply, Message};
use crate::secrets::scrub;
use sdk::types::{RunState, StatePatch};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// What the refinement step decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefinementOutcome {
    /// The request is usable; carries the prepared topic
    Refined(String),
    /// The request needs answers first
    NeedsClarification(Vec<String>),
    /// The step failed or had nothing to add
    Unchanged,
}

impl RefinementOutcome {
    /// State changes implied by the outcome
    pub fn into_patch(self) -> StatePatch {
        match self {
            RefinementOutcome::Refined(topic) => StatePatch {
                topic: Some(topic),
                questions_for_user: Some(Vec::new()),
                ..Default::default()
            },
            RefinementOutcome::NeedsClarification(questions) => StatePatch {
                questions_for_user: Some(questions),
                ..Default::default()
            },
            RefinementOutcome::Unchanged => StatePatch {
                questions_for_user: Some(Vec::new()),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRefinement {
    prompt_is_valid: bool,
    #[serde(default)]
    prepared_prompt: Option<String>,
    #[serde(default)]
    clarification_questions: Vec<String>,
}

/// Parse a refinement reply
pub fn decode_refinement(raw: &str) -> Option<RefinementOutcome> {
    let parsed: RawRefinement = parse_json_reply(raw).ok()?;

    if parsed.prompt_is_valid {
        let topic = parsed
            .prepared_prompt
            .filter(|topic| !topic.trim().is_empty())?;
        return Some(RefinementOutcome::Refined(topic));
    }

    let questions: Vec<String> = parsed
        .clarification_questions
        .into_iter()
        .filter(|question| !question.trim().is_empty())
        .collect();
    if questions.is_empty() {
        return None;
    }
    Some(RefinementOutcome::NeedsClarification(questions))
}

/// Request refinement agent
pub struct Prompter {
    router: Arc<ModelRouter>,
    prompts: Arc<PromptSet>,
    step_log: Arc<dyn StepLog>,
}

impl Prompter {
    pub fn new(router: Arc<ModelRouter>, prompts: Arc<PromptSet>, step_log: Arc<dyn StepLog>) -> Self {
        Self {
            router,
            prompts,
            step_log,
        }
    }

    /// Ask the model whether the request is precise enough
    pub async fn refine(&self, state: &RunState) -> RefinementOutcome {
        let questions = state.questions_for_user.join("\n");
        let request = self.prompts.render(
            PromptKind::Prompter,
            &[
                ("prompt", state.topic.as_str()),
                ("questions", or_none(Some(questions.as_str()))),
                ("user_response", or_none(state.user_response.as_deref())),
            ],
        );

        let reply = match self
            .router
            .call(AgentRole::Prompter, &[Message::user(request)])
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                let message = scrub(&e.to_string());
                tracing::warn!("Request refinement failed, using the request as is: {}", message);
                self.step_log.record(
                    StepRecord::new(&state.run_id, AgentRole::Prompter, &state.topic, 0, "")
                        .with_metadata(json!({ "success": false, "error": message })),
                );
                return RefinementOutcome::Unchanged;
            }
        };

        let outcome = decode_refinement(&reply).unwrap_or(RefinementOutcome::Unchanged);
        let label = match &outcome {
            RefinementOutcome::Refined(_) => "refined",
            RefinementOutcome::NeedsClarification(_) => "needs_clarification",
            RefinementOutcome::Unchanged => "unchanged",
        };

        self.step_log.record(
            StepRecord::new(&state.run_id, AgentRole::Prompter, &state.topic, 0, reply)
                .with_metadata(json!({ "success": true, "outcome": label })),
        );

        outcome
    }
}
