//! Property tests comparing a collection against a simple model.
//!
//! Random sequences of add, remove, direct release and clear are applied to a
//! `ReleaseCollection`. At every step the collection must agree with the
//! model, and after the collection is released every resource must have run
//! its routine exactly once if it was still owned or released directly, and
//! never if it was detached.

use proptest::prelude::*;
use relinquish::testing::prelude::*;
use relinquish::{
    AsyncRelease, AsyncReleaseCollection, Releasable, Release, ReleaseCollection, Releaser,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Member,
    Detached,
    Released,
}

struct Tracked {
    counter: ReleaseCounter,
    resource: Arc<Releaser>,
    status: Status,
}

fn apply(collection: &ReleaseCollection, created: &mut Vec<Tracked>, op: CollectionOp) {
    match op {
        CollectionOp::Add => {
            let (counter, resource) = counting_releaser();
            collection.add(resource.clone()).unwrap();
            created.push(Tracked {
                counter,
                resource,
                status: Status::Member,
            });
        }
        CollectionOp::Remove(index) if !created.is_empty() => {
            let len = created.len();
            let tracked = &mut created[index % len];
            let removed = collection.remove(&tracked.resource).unwrap();
            assert_eq!(removed, tracked.status == Status::Member);
            if removed {
                tracked.status = Status::Detached;
            }
        }
        CollectionOp::ReleaseMember(index) if !created.is_empty() => {
            let len = created.len();
            let tracked = &mut created[index % len];
            let performed = tracked.resource.release().unwrap();
            assert_eq!(performed, tracked.status != Status::Released);
            tracked.status = Status::Released;
        }
        CollectionOp::Clear => {
            let owned = created
                .iter()
                .filter(|t| t.status == Status::Member)
                .count();
            let detached = collection.clear().unwrap();
            assert_eq!(detached.len(), owned);
            for tracked in created.iter_mut().filter(|t| t.status == Status::Member) {
                tracked.status = Status::Detached;
            }
        }
        CollectionOp::Remove(_) | CollectionOp::ReleaseMember(_) => {}
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_collection_matches_model(ops in arb_collection_ops(40)) {
        let collection = ReleaseCollection::new();
        let mut created = Vec::new();

        for op in ops {
            apply(&collection, &mut created, op);
            let owned = created.iter().filter(|t| t.status == Status::Member).count();
            prop_assert_eq!(collection.len(), owned);
            for tracked in &created {
                prop_assert_eq!(
                    collection.contains(&tracked.resource),
                    tracked.status == Status::Member
                );
            }
        }

        prop_assert!(collection.release().unwrap());
        prop_assert!(collection.is_empty());
        for tracked in &created {
            let expected = usize::from(tracked.status != Status::Detached);
            prop_assert_eq!(tracked.counter.count(), expected);
            prop_assert_eq!(tracked.resource.was_released(), tracked.status != Status::Detached);
        }
    }

    #[test]
    fn prop_add_after_release_always_fails(before in 0usize..10, after in 1usize..5) {
        let collection = ReleaseCollection::new();
        let early: Vec<_> = (0..before).map(|_| counting_releaser()).collect();
        for (_, resource) in &early {
            collection.add(resource.clone()).unwrap();
        }
        collection.release().unwrap();

        for _ in 0..after {
            let (counter, late) = counting_releaser();
            let err = collection.add(late.clone()).unwrap_err();
            prop_assert!(err.is_invalid_state());
            prop_assert!(late.is_alive());
            prop_assert_eq!(counter.count(), 0);
        }
        prop_assert!(early.iter().all(|(counter, _)| counter.count() == 1));
    }

    #[test]
    fn prop_async_collection_releases_in_reverse_insertion_order(count in 0usize..24) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let order = runtime.block_on(async {
            let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
            let collection = AsyncReleaseCollection::new();
            for index in 0..count {
                let log = Arc::clone(&log);
                let member = Arc::new(relinquish::AsyncReleaser::from_fn(move || async move {
                    tokio::task::yield_now().await;
                    log.lock().push(index);
                }));
                collection.add_async(member).unwrap();
            }
            collection.release_async().await.unwrap();
            let order = log.lock().clone();
            order
        });
        let expected: Vec<usize> = (0..count).rev().collect();
        prop_assert_eq!(order, expected);
    }
}
