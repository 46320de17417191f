//! Property tests for the optimistic cache against the in-memory store.

use std::time::Duration;

use proptest::prelude::*;
use proptest::sample::Index;

use phone_catalog::store::memory::InMemoryStore;
use phone_catalog::store::Operation;
use phone_catalog::{Phone, PhoneCache, PhoneDraft};

#[derive(Debug, Clone)]
enum Op {
    Add(PhoneDraft),
    Update(Index, PhoneDraft),
    Remove(Index),
}

fn draft_strategy() -> impl Strategy<Value = PhoneDraft> {
    ("[A-Z][a-z]{1,6}", "[A-Z0-9]{1,5}", 0.0f64..10_000.0)
        .prop_map(|(brand, model, price)| PhoneDraft::new(brand, model, price))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        draft_strategy().prop_map(Op::Add),
        (any::<Index>(), draft_strategy()).prop_map(|(i, d)| Op::Update(i, d)),
        any::<Index>().prop_map(Op::Remove),
    ]
}

fn seeded() -> Vec<Phone> {
    (0..5)
        .map(|i| Phone::new(format!("-S{i:03}"), "Seed", format!("M{i}"), 100.0 * i as f64))
        .collect()
}

/// Applies `ops` optimistically, lets every store call settle in whatever
/// order the latencies produce, and returns the model, the final cache list
/// and the store contents.
fn run(ops: Vec<Op>, latencies: [u64; 3]) -> (Vec<Phone>, Vec<Phone>, Vec<Phone>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    let local = tokio::task::LocalSet::new();

    runtime.block_on(local.run_until(async move {
        let store = InMemoryStore::with_phones(seeded());
        let (cache, initial) = PhoneCache::open(store.clone());
        initial.await;

        for (op, millis) in [Operation::Add, Operation::Update, Operation::Remove]
            .into_iter()
            .zip(latencies)
        {
            store.set_latency(op, Duration::from_millis(millis)).await;
        }

        let mut model = cache.phones().unwrap();
        let mut pending = Vec::new();
        for op in ops {
            let confirmed: Vec<Phone> = cache
                .phones()
                .unwrap()
                .into_iter()
                .filter(|p| !p.id.is_provisional())
                .collect();
            match op {
                Op::Add(draft) => {
                    let p = cache.add(draft.clone()).unwrap();
                    model.push(draft.with_id(p.id().unwrap().clone()));
                    pending.push(p);
                }
                Op::Update(index, draft) => {
                    if confirmed.is_empty() {
                        continue;
                    }
                    let target = confirmed[index.index(confirmed.len())].with_fields(draft);
                    let slot = model.iter_mut().find(|p| p.id == target.id).unwrap();
                    *slot = target.clone();
                    pending.push(cache.update(target).unwrap());
                }
                Op::Remove(index) => {
                    if confirmed.is_empty() {
                        continue;
                    }
                    let id = confirmed[index.index(confirmed.len())].id.clone();
                    model.retain(|p| p.id != id);
                    pending.push(cache.remove(id).unwrap());
                }
            }
        }

        let handles: Vec<_> = pending.into_iter().map(tokio::task::spawn_local).collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(cache.state().is_success());
        (model, cache.phones().unwrap(), store.snapshot().await)
    }))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn successful_sequences_match_pure_model(
        ops in prop::collection::vec(op_strategy(), 0..20),
        latencies in [0u64..50, 0u64..50, 0u64..50],
    ) {
        let (model, cached, stored) = run(ops, latencies);

        prop_assert_eq!(model.len(), cached.len());
        for (expected, actual) in model.iter().zip(&cached) {
            if expected.id.is_provisional() {
                prop_assert!(!actual.id.is_provisional());
                prop_assert_eq!(&expected.brand, &actual.brand);
                prop_assert_eq!(&expected.model, &actual.model);
                prop_assert_eq!(expected.price.to_bits(), actual.price.to_bits());
            } else {
                prop_assert!(expected.same_fields(actual));
            }
        }

        // Concurrent calls on one id may reach the store in any order, so
        // only presence is compared.
        for phone in &cached {
            prop_assert!(stored.iter().any(|s| s.id == phone.id));
        }
    }
}
