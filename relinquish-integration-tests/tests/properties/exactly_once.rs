//! Property tests for the exactly-once release guarantee under contention.

use proptest::prelude::*;
use relinquish::testing::prelude::*;
use relinquish::{release_with_mode, Releasable, Release, ReleaseMode, ReleaseState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_routine_runs_once_for_any_number_of_callers(
        modes in prop::collection::vec(arb_release_mode(), 2..8)
    ) {
        let (counter, releaser) = counting_releaser();
        let barrier = Arc::new(Barrier::new(modes.len()));
        let handles: Vec<_> = modes
            .into_iter()
            .map(|mode| {
                let releaser = Arc::clone(&releaser);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    release_with_mode(releaser.as_ref(), mode).unwrap()
                })
            })
            .collect();
        let performed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|performed| *performed)
            .count();

        prop_assert_eq!(performed, 1);
        prop_assert_eq!(counter.count(), 1);
        prop_assert!(releaser.was_released());
    }

    #[test]
    fn prop_listeners_fire_once_unless_unsubscribed(
        listeners in 0usize..16,
        unsubscribe_mask in any::<u16>(),
    ) {
        let state = ReleaseState::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut kept = 0;
        for index in 0..listeners {
            let fired = Arc::clone(&fired);
            let id = state
                .subscribe(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            if unsubscribe_mask & (1 << index) != 0 {
                prop_assert!(state.unsubscribe(id));
            } else {
                kept += 1;
            }
        }

        prop_assert!(state.request_release());
        prop_assert!(!state.request_release());
        state.mark_released();
        prop_assert_eq!(fired.load(Ordering::SeqCst), kept);
        prop_assert!(state.subscribe(|| ()).is_err());
    }

    #[test]
    fn prop_failing_routine_still_ends_released(mode in arb_release_mode()) {
        let (counter, releaser) = failing_releaser("boom");
        let outcome = release_with_mode(releaser.as_ref(), mode);
        match mode {
            ReleaseMode::Explicit => prop_assert!(outcome.unwrap_err().is_release_failure()),
            ReleaseMode::Implicit => prop_assert!(outcome.unwrap()),
        }
        prop_assert!(releaser.was_released());
        prop_assert!(!releaser.release().unwrap());
        prop_assert_eq!(counter.count(), 1);
    }
}
