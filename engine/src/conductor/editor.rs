//! Editor stage: merges the three drafts into the final document.

use crate::conductor::prompts::{or_none, PromptKind, PromptSet};
use crate::conductor::step_log::{StepLog, StepRecord};
use crate::llm::router::{AgentRole, ModelRouter};
use crate::llm::Message;
use crate::secrets::scrub;
use sdk::errors::EngineError;
use sdk::types::{RunState, StatePatch};
use serde_json::json;
use std::sync::Arc;

/// Separator placed between drafts in the editor request
pub const DRAFT_SEPARATOR: &str = "\n\n---\n\n";

/// Editor stage
pub struct Editor {
    router: Arc<ModelRouter>,
    prompts: Arc<PromptSet>,
    step_log: Arc<dyn StepLog>,
}

impl Editor {
    pub fn new(router: Arc<ModelRouter>, prompts: Arc<PromptSet>, step_log: Arc<dyn StepLog>) -> Self {
        Self {
            router,
            prompts,
            step_log,
        }
    }

    /// Produce the final document
    ///
    /// # Errors
    /// A failed model call is fatal to the run.
    pub async fn run(&self, state: &RunState) -> Result<StatePatch, EngineError> {
        let drafts = state.drafts.join(DRAFT_SEPARATOR);
        let critiques = state.critiques_flat.join("\n");
        let request = self.prompts.render(
            PromptKind::Editor,
            &[
                ("topic", state.topic.as_str()),
                ("drafts", drafts.as_str()),
                ("critiques", or_none(Some(critiques.as_str()))),
            ],
        );

        let result = self
            .router
            .call(AgentRole::Editor, &[Message::user(request)])
            .await;

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                let message = scrub(&e.to_string());
                self.step_log.record(
                    StepRecord::new(
                        &state.run_id,
                        AgentRole::Editor,
                        &state.topic,
                        state.iteration_count,
                        "",
                    )
                    .with_metadata(json!({ "success": false, "error": message })),
                );
                return Err(EngineError::AgentCallFailed {
                    agent: AgentRole::Editor.to_string(),
                    message,
                });
            }
        };

        self.step_log.record(
            StepRecord::new(
                &state.run_id,
                AgentRole::Editor,
                &state.topic,
                state.iteration_count,
                summary.clone(),
            )
            .with_metadata(json!({
                "success": true,
                "critiques_count": state.critiques_flat.len(),
            })),
        );

        tracing::info!(run_id = %state.run_id, "Final document ready");

        Ok(StatePatch {
            final_summary: Some(summary),
            ..Default::default()
        })
    }
}
