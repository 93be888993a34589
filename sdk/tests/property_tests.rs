use proptest::prelude::*;
use sdk::errors::{EngineError, TriptychErrorExt};
use sdk::types::{GeneratorIndex, RunState, StatePatch};

proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Database(error_str.clone()),
            EngineError::LLMProvider(error_str.clone()),
            EngineError::MissingCredential(error_str.clone()),
            EngineError::InvalidState(error_str.clone()),
            EngineError::AgentCallFailed { agent: "critic".to_string(), message: error_str.clone() },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains("types.rs"));
        }
    }
}

proptest! {
    #[test]
    fn test_generator_index_accepts_only_one_to_three(value in any::<u8>()) {
        let index = GeneratorIndex::new(value);
        prop_assert_eq!(index.is_some(), (1..=3).contains(&value));
        if let Some(index) = index {
            prop_assert!(index.slot() < 3);
        }
    }
}

proptest! {
    #[test]
    fn test_patches_never_lose_drafts_or_iterations(
        advances in proptest::collection::vec(any::<bool>(), 0..20),
        draft in "[a-z]{0,12}",
    ) {
        let mut state = RunState::fresh("run", "topic", None);
        let mut previous = 0;
        for advance in advances {
            state = state.apply(StatePatch {
                drafts: Some([draft.clone(), String::new(), draft.clone()]),
                advance_iteration: advance,
                ..Default::default()
            });
            prop_assert_eq!(state.drafts.len(), 3);
            prop_assert!(state.iteration_count >= previous);
            prop_assert!(state.iteration_count - previous <= 1);
            previous = state.iteration_count;
        }
    }
}

proptest! {
    #[test]
    fn test_run_state_json_round_trip(
        topic in "\\PC{0,40}",
        answer in proptest::option::of("\\PC{0,40}"),
        iterations in 0u32..50,
    ) {
        let mut state = RunState::fresh("run-id", topic, None);
        state.user_response = answer;
        state.iteration_count = iterations;

        let json = serde_json::to_string(&state).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, state);
    }
}
