//! Critic stage
//!
//! Reviews the three drafts together and returns per-generator critiques,
//! clarification questions and the set of drafts to redo. A reply that cannot
//! be decoded is never read as approval: the raw text becomes a critique for
//! every generator and all three drafts are redone.

use crate::conductor::prompts::{PromptKind, PromptSet};
use crate::conductor::step_log::{StepLog, StepRecord};
use crate::llm::router::{AgentRole, ModelRouter};
use crate::llm::{parse_json_reply, Message};
use crate::secrets::scrub;
use sdk::errors::EngineError;
use sdk::types::{CritiqueMap, GeneratorIndex, RedoSet, RunState, StatePatch};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A successfully decoded critic reply
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verdict {
    pub critiques_by_generator: CritiqueMap,
    pub questions_for_user: Vec<String>,
    pub drafts_to_redo: RedoSet,
}

/// Why a critic reply could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("reply is not valid verdict JSON: {0}")]
    Json(String),

    #[error("reply has no critiques_by_generator object")]
    MissingCritiques,

    #[error("critique key '{0}' is not a generator number")]
    InvalidKey(String),
}

/// Outcome of reading a critic reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriticVerdict {
    Decoded(Verdict),
    /// Carries the raw reply text
    Malformed(String),
}

impl CriticVerdict {
    /// Classify a raw reply
    pub fn from_reply(raw: &str) -> Self {
        match decode_verdict(raw) {
            Ok(verdict) => CriticVerdict::Decoded(verdict),
            Err(e) => {
                tracing::warn!("Critic reply could not be decoded ({}); redoing every draft", e);
                CriticVerdict::Malformed(raw.to_string())
            }
        }
    }

    /// State changes implied by this verdict
    pub fn into_patch(self) -> StatePatch {
        let (verdict, critiques_flat) = match self {
            CriticVerdict::Decoded(verdict) => (verdict, None),
            // The raw text is one critique shared by all three drafts
            CriticVerdict::Malformed(raw) => (
                Verdict {
                    critiques_by_generator: GeneratorIndex::ALL
                        .into_iter()
                        .map(|index| (index, vec![raw.clone()]))
                        .collect(),
                    questions_for_user: Vec::new(),
                    drafts_to_redo: GeneratorIndex::ALL.into_iter().collect(),
                },
                Some(vec![raw]),
            ),
        };

        StatePatch {
            critiques_by_generator: Some(verdict.critiques_by_generator),
            critiques_flat,
            questions_for_user: Some(verdict.questions_for_user),
            drafts_to_redo: Some(verdict.drafts_to_redo),
            ..Default::default()
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, CriticVerdict::Decoded(_))
    }
}

/// Wire shape of the critic reply
#[derive(Debug, Deserialize)]
struct RawVerdict {
    critiques_by_generator: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    questions_for_user: Option<Vec<String>>,
    #[serde(default)]
    drafts_to_redo: Option<Vec<i64>>,
}

/// Decode a critic reply, tolerating markdown code fences around the JSON.
///
/// Keys of `critiques_by_generator` must be generator numbers; numbers
/// outside 1..=3 are skipped with a warning, as are such entries in
/// `drafts_to_redo`. A missing or empty redo list is derived from the
/// generators that received at least one critique.
pub fn decode_verdict(raw: &str) -> Result<Verdict, DecodeError> {
    let parsed: RawVerdict =
        parse_json_reply(raw).map_err(|e| DecodeError::Json(e.to_string()))?;

    let raw_critiques = parsed
        .critiques_by_generator
        .ok_or(DecodeError::MissingCritiques)?;

    let mut critiques_by_generator = CritiqueMap::new();
    for (key, critiques) in raw_critiques {
        let number: i64 = key
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidKey(key.clone()))?;

        let Some(index) = to_index(number) else {
            tracing::warn!("Ignoring critiques for unknown generator {}", number);
            continue;
        };

        let critiques: Vec<String> = critiques
            .into_iter()
            .filter(|critique| !critique.trim().is_empty())
            .collect();
        if !critiques.is_empty() {
            critiques_by_generator
                .entry(index)
                .or_default()
                .extend(critiques);
        }
    }

    let explicit: RedoSet = parsed
        .drafts_to_redo
        .unwrap_or_default()
        .into_iter()
        .filter_map(|number| {
            let index = to_index(number);
            if index.is_none() {
                tracing::warn!("Ignoring redo request for unknown generator {}", number);
            }
            index
        })
        .collect();

    let drafts_to_redo = if explicit.is_empty() {
        critiques_by_generator.keys().copied().collect()
    } else {
        explicit
    };

    Ok(Verdict {
        critiques_by_generator,
        questions_for_user: parsed
            .questions_for_user
            .unwrap_or_default()
            .into_iter()
            .filter(|question| !question.trim().is_empty())
            .collect(),
        drafts_to_redo,
    })
}

fn to_index(number: i64) -> Option<GeneratorIndex> {
    u8::try_from(number).ok().and_then(GeneratorIndex::new)
}

/// Critic stage
pub struct Critic {
    router: Arc<ModelRouter>,
    prompts: Arc<PromptSet>,
    step_log: Arc<dyn StepLog>,
}

impl Critic {
    pub fn new(router: Arc<ModelRouter>, prompts: Arc<PromptSet>, step_log: Arc<dyn StepLog>) -> Self {
        Self {
            router,
            prompts,
            step_log,
        }
    }

    /// Review the current drafts
    ///
    /// # Errors
    /// A failed model call is fatal: there is no earlier verdict to fall back on.
    pub async fn run(&self, state: &RunState) -> Result<StatePatch, EngineError> {
        let request = self.prompts.render(
            PromptKind::Critic,
            &[
                ("topic", state.topic.as_str()),
                ("draft_1", state.draft(GeneratorIndex::FIRST)),
                ("draft_2", state.draft(GeneratorIndex::SECOND)),
                ("draft_3", state.draft(GeneratorIndex::THIRD)),
            ],
        );

        let reply = match self
            .router
            .call(AgentRole::Critic, &[Message::user(request)])
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                let message = scrub(&e.to_string());
                self.step_log.record(
                    StepRecord::new(
                        &state.run_id,
                        AgentRole::Critic,
                        &state.topic,
                        state.iteration_count,
                        "",
                    )
                    .with_metadata(json!({ "error": message })),
                );
                return Err(EngineError::AgentCallFailed {
                    agent: AgentRole::Critic.to_string(),
                    message,
                });
            }
        };

        let verdict = CriticVerdict::from_reply(&reply);
        let metadata = match &verdict {
            CriticVerdict::Decoded(decoded) => json!({
                "parsed_successfully": true,
                "critiques_count": decoded.critiques_by_generator.values().map(Vec::len).sum::<usize>(),
                "questions_count": decoded.questions_for_user.len(),
                "drafts_to_redo": decoded.drafts_to_redo,
            }),
            CriticVerdict::Malformed(_) => json!({
                "parsed_successfully": false,
                "drafts_to_redo": [1, 2, 3],
            }),
        };

        self.step_log.record(
            StepRecord::new(
                &state.run_id,
                AgentRole::Critic,
                &state.topic,
                state.iteration_count,
                reply,
            )
            .with_metadata(metadata),
        );

        Ok(verdict.into_patch())
    }
}
