//! Property tests for the validated value types.

use proptest::prelude::*;
use relinquish::testing::prelude::*;
use relinquish::{CleanupMode, LifecycleState, ResourceName};

proptest! {
    #[test]
    fn prop_resource_names_survive_serde(name in arb_resource_name()) {
        let json = serde_json::to_string(&name).unwrap();
        let parsed: ResourceName = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, name);
    }

    #[test]
    fn prop_padded_names_are_trimmed(name in arb_resource_name(), pad in 0usize..4) {
        let padded = format!("{}{}{}", " ".repeat(pad), name.as_ref(), " ".repeat(pad));
        prop_assert_eq!(ResourceName::parse(padded).unwrap(), name);
    }

    #[test]
    fn prop_blank_names_are_rejected(blank in "[ \t]{0,8}") {
        prop_assert!(ResourceName::parse(blank).is_err());
    }

    #[test]
    fn prop_released_states_are_terminal(state in arb_lifecycle_state()) {
        let released = matches!(state, LifecycleState::Releasing | LifecycleState::Released);
        prop_assert_eq!(state.was_released(), released);
        prop_assert_eq!(state >= LifecycleState::Releasing, released);
    }

    #[test]
    fn prop_cleanup_modes_serialize_by_name(mode in arb_cleanup_mode()) {
        let json = serde_json::to_string(&mode).unwrap();
        prop_assert_eq!(json, format!("\"{mode:?}\""));
        let back: CleanupMode = serde_json::from_str(&format!("\"{mode:?}\"")).unwrap();
        prop_assert_eq!(back, mode);
    }
}
