//! Run state types
//!
//! `RunState` is the single record threaded through the orchestration graph.
//! Stages never mutate it in place: each one returns a `StatePatch` and the
//! orchestrator folds it in with `RunState::apply`. The state is plain serde
//! data so callers can persist a suspended run and hand it back unchanged.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Number of draft generators
pub const GENERATOR_COUNT: usize = 3;

/// Identifies one of the three fixed-style draft generators (1..=3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GeneratorIndex(u8);

impl GeneratorIndex {
    pub const FIRST: Self = Self(1);
    pub const SECOND: Self = Self(2);
    pub const THIRD: Self = Self(3);

    /// All generator indices in ascending order
    pub const ALL: [Self; GENERATOR_COUNT] = [Self::FIRST, Self::SECOND, Self::THIRD];

    /// Build an index from a 1-based number, rejecting anything outside 1..=3
    pub fn new(value: u8) -> Option<Self> {
        (1..=GENERATOR_COUNT as u8)
            .contains(&value)
            .then_some(Self(value))
    }

    /// 1-based value
    pub fn get(self) -> u8 {
        self.0
    }

    /// Position of this generator's draft in `RunState::drafts`
    pub fn slot(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<u8> for GeneratorIndex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("generator index {} is outside 1..=3", value))
    }
}

impl From<GeneratorIndex> for u8 {
    fn from(index: GeneratorIndex) -> Self {
        index.0
    }
}

impl fmt::Display for GeneratorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-generator critiques, keyed by generator index
pub type CritiqueMap = BTreeMap<GeneratorIndex, Vec<String>>;

/// Set of generators that must be regenerated on the next cycle
pub type RedoSet = BTreeSet<GeneratorIndex>;

/// Flatten per-generator critiques into the legacy single list.
///
/// Concatenates in ascending generator order, keeping repeats.
pub fn flatten_critiques(by_generator: &CritiqueMap) -> Vec<String> {
    by_generator.values().flatten().cloned().collect()
}

/// State of one run, threaded through every stage of the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Stable identifier of the whole multi-turn run
    pub run_id: String,

    /// The working request
    pub topic: String,

    /// Supplementary material for the generators
    #[serde(default)]
    pub attached_content: Option<String>,

    /// Exactly three drafts; unset slots are empty strings
    #[serde(default)]
    pub drafts: [String; GENERATOR_COUNT],

    /// Legacy flattened critiques, always derived from `critiques_by_generator`
    #[serde(default)]
    pub critiques_flat: Vec<String>,

    /// Critiques addressed to each generator
    #[serde(default)]
    pub critiques_by_generator: CritiqueMap,

    /// Clarification questions; non-empty means the run must suspend
    #[serde(default)]
    pub questions_for_user: Vec<String>,

    /// The user's answer, consumed by the next generator cycle
    #[serde(default)]
    pub user_response: Option<String>,

    /// Final merged document
    #[serde(default)]
    pub final_summary: Option<String>,

    /// Number of generator cycles executed so far
    #[serde(default)]
    pub iteration_count: u32,

    /// Generators to redo on the next cycle
    #[serde(default)]
    pub drafts_to_redo: RedoSet,
}

impl RunState {
    /// Create the state of a fresh run
    pub fn fresh(
        run_id: impl Into<String>,
        topic: impl Into<String>,
        attached_content: Option<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            topic: topic.into(),
            attached_content,
            drafts: Default::default(),
            critiques_flat: Vec::new(),
            critiques_by_generator: CritiqueMap::new(),
            questions_for_user: Vec::new(),
            user_response: None,
            final_summary: None,
            iteration_count: 0,
            drafts_to_redo: RedoSet::new(),
        }
    }

    /// Prepare a suspended state for re-entry with the user's answer.
    ///
    /// Pending questions are cleared. An empty redo set becomes "all
    /// generators"; a redo set named by the critic is kept, so only those
    /// generators see the answer.
    pub fn resume(mut self, answer: impl Into<String>) -> Self {
        self.user_response = Some(answer.into());
        self.questions_for_user.clear();
        self.final_summary = None;
        if self.drafts_to_redo.is_empty() {
            self.drafts_to_redo = GeneratorIndex::ALL.into_iter().collect();
        }
        self
    }

    /// Fold a stage's patch into the state, producing the next state
    pub fn apply(mut self, patch: StatePatch) -> Self {
        if let Some(topic) = patch.topic {
            self.topic = topic;
        }
        if let Some(drafts) = patch.drafts {
            self.drafts = drafts;
        }
        if let Some(by_generator) = patch.critiques_by_generator {
            self.critiques_flat = patch
                .critiques_flat
                .unwrap_or_else(|| flatten_critiques(&by_generator));
            self.critiques_by_generator = by_generator;
        }
        if let Some(questions) = patch.questions_for_user {
            self.questions_for_user = questions;
        }
        if patch.clear_user_response {
            self.user_response = None;
        }
        if let Some(summary) = patch.final_summary {
            self.final_summary = Some(summary);
        }
        if patch.advance_iteration {
            self.iteration_count += 1;
        }
        if let Some(redo) = patch.drafts_to_redo {
            self.drafts_to_redo = redo;
        }
        self
    }

    /// Draft produced by the given generator
    pub fn draft(&self, index: GeneratorIndex) -> &str {
        &self.drafts[index.slot()]
    }

    /// Critiques addressed to the given generator
    pub fn critiques_for(&self, index: GeneratorIndex) -> &[String] {
        self.critiques_by_generator
            .get(&index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Fields changed by one stage.
///
/// The iteration counter can only move forward by one and the user response
/// can only be cleared, which keeps both invariants mechanical.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub topic: Option<String>,
    pub drafts: Option<[String; GENERATOR_COUNT]>,
    pub critiques_by_generator: Option<CritiqueMap>,
    /// Replaces the flat view derived from `critiques_by_generator`
    pub critiques_flat: Option<Vec<String>>,
    pub questions_for_user: Option<Vec<String>>,
    pub clear_user_response: bool,
    pub final_summary: Option<String>,
    pub advance_iteration: bool,
    pub drafts_to_redo: Option<RedoSet>,
}

/// Terminal classification of a state returned by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The critic needs clarification; persist the state and resume later
    AwaitingUser(Vec<String>),

    /// The editor produced the final document
    Completed(String),

    /// The run ended without producing a document
    Exhausted,
}

impl RunOutcome {
    pub fn from_state(state: &RunState) -> Self {
        if !state.questions_for_user.is_empty() {
            Self::AwaitingUser(state.questions_for_user.clone())
        } else if let Some(summary) = &state.final_summary {
            Self::Completed(summary.clone())
        } else {
            Self::Exhausted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(value: u8) -> GeneratorIndex {
        GeneratorIndex::new(value).unwrap()
    }

    #[test]
    fn test_generator_index_bounds() {
        assert!(GeneratorIndex::new(0).is_none());
        assert!(GeneratorIndex::new(4).is_none());
        assert_eq!(index(2).slot(), 1);
        assert_eq!(GeneratorIndex::ALL.len(), 3);
    }

    #[test]
    fn test_fresh_state_has_three_empty_drafts() {
        let state = RunState::fresh("run-1", "Rust ownership", None);
        assert_eq!(state.drafts.len(), 3);
        assert!(state.drafts.iter().all(String::is_empty));
        assert_eq!(state.iteration_count, 0);
    }

    #[test]
    fn test_flatten_concatenates_in_generator_order() {
        let mut map = CritiqueMap::new();
        map.insert(index(3), vec!["c".to_string()]);
        map.insert(index(1), vec!["a".to_string(), "shared".to_string(), "shared".to_string()]);
        map.insert(index(2), vec!["shared".to_string()]);
        assert_eq!(flatten_critiques(&map), vec!["a", "shared", "shared", "shared", "c"]);
    }

    #[test]
    fn test_patch_can_supply_flat_view() {
        let mut map = CritiqueMap::new();
        for i in GeneratorIndex::ALL {
            map.insert(i, vec!["raw reply".to_string()]);
        }
        let next = RunState::fresh("run-1", "t", None).apply(StatePatch {
            critiques_by_generator: Some(map),
            critiques_flat: Some(vec!["raw reply".to_string()]),
            ..Default::default()
        });
        assert_eq!(next.critiques_flat, vec!["raw reply"]);
        assert_eq!(next.critiques_for(index(3)), ["raw reply".to_string()]);
    }

    #[test]
    fn test_apply_recomputes_flat_view() {
        let state = RunState::fresh("run-1", "t", None);
        let mut map = CritiqueMap::new();
        map.insert(index(2), vec!["too short".to_string()]);
        let next = state.apply(StatePatch {
            critiques_by_generator: Some(map),
            ..Default::default()
        });
        assert_eq!(next.critiques_flat, vec!["too short"]);
        assert_eq!(next.critiques_for(index(2)), ["too short".to_string()]);
        assert!(next.critiques_for(index(1)).is_empty());
    }

    #[test]
    fn test_apply_advances_iteration_by_one() {
        let state = RunState::fresh("run-1", "t", None);
        let next = state.apply(StatePatch {
            advance_iteration: true,
            ..Default::default()
        });
        assert_eq!(next.iteration_count, 1);
        let same = next.clone().apply(StatePatch::default());
        assert_eq!(same.iteration_count, 1);
    }

    #[test]
    fn test_resume_sets_answer_and_redo_all() {
        let mut state = RunState::fresh("run-1", "t", None);
        state.iteration_count = 2;
        state.questions_for_user = vec!["Which audience?".to_string()];

        let resumed = state.resume("Beginners");
        assert_eq!(resumed.user_response.as_deref(), Some("Beginners"));
        assert!(resumed.questions_for_user.is_empty());
        assert_eq!(resumed.iteration_count, 2);
        assert_eq!(resumed.drafts_to_redo.len(), 3);
    }

    #[test]
    fn test_resume_keeps_explicit_redo_set() {
        let mut state = RunState::fresh("run-1", "t", None);
        state.drafts_to_redo.insert(index(2));
        let resumed = state.resume("answer");
        assert_eq!(resumed.drafts_to_redo.into_iter().collect::<Vec<_>>(), vec![index(2)]);
    }

    #[test]
    fn test_state_json_round_trip() {
        let mut state = RunState::fresh("run-1", "t", Some("notes".to_string()));
        state.drafts = ["A".to_string(), "B".to_string(), String::new()];
        state.critiques_by_generator.insert(index(1), vec!["fix".to_string()]);
        state.drafts_to_redo.insert(index(1));

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""critiques_by_generator":{"1":["fix"]}"#));
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_state_rejects_out_of_range_index() {
        let json = r#"{"run_id":"r","topic":"t","drafts_to_redo":[4]}"#;
        assert!(serde_json::from_str::<RunState>(json).is_err());
    }

    #[test]
    fn test_outcome_classification() {
        let mut state = RunState::fresh("run-1", "t", None);
        assert_eq!(RunOutcome::from_state(&state), RunOutcome::Exhausted);

        state.final_summary = Some("done".to_string());
        assert_eq!(
            RunOutcome::from_state(&state),
            RunOutcome::Completed("done".to_string())
        );

        state.questions_for_user = vec!["q".to_string()];
        assert!(matches!(
            RunOutcome::from_state(&state),
            RunOutcome::AwaitingUser(_)
        ));
    }
}
