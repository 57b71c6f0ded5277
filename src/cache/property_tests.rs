//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check store behavior over generated keys and operation sequences.

use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::{CacheKey, CacheStore};

// == Test Configuration ==
const TEST_WINDOW: Duration = Duration::from_secs(1800);

// == Strategies ==
/// Generates key components, including separator and escape characters
fn component_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:\\\\]{1,16}".prop_map(|s| s)
}

fn key_strategy() -> impl Strategy<Value = CacheKey> {
    (component_strategy(), component_strategy(), component_strategy())
        .prop_map(|(account, sub, attribute)| CacheKey::new(account, sub, attribute))
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,64}".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: CacheKey, value: String },
    Get { key: CacheKey },
    InvalidateAll,
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (key_strategy(), value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        4 => key_strategy().prop_map(|key| CacheOp::Get { key }),
        1 => Just(CacheOp::InvalidateAll),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Storing a pair and reading it back before expiration returns the stored value.
    #[test]
    fn prop_roundtrip_storage(key in key_strategy(), value in value_strategy()) {
        let mut store = CacheStore::new(TEST_WINDOW);

        store.set(key.clone(), value.clone());

        prop_assert_eq!(store.get(&key), Some(value));
    }

    // The last write to a key wins.
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        first in value_strategy(),
        second in value_strategy(),
    ) {
        let mut store = CacheStore::new(TEST_WINDOW);

        store.set(key.clone(), first);
        store.set(key.clone(), second.clone());

        prop_assert_eq!(store.get(&key), Some(second));
        prop_assert_eq!(store.len(), 1);
    }

    // Composite strings are equal exactly when the component tuples are equal.
    #[test]
    fn prop_composite_key_is_injective(
        a in (component_strategy(), component_strategy(), component_strategy()),
        b in (component_strategy(), component_strategy(), component_strategy()),
    ) {
        let left = CacheKey::new(a.0.clone(), a.1.clone(), a.2.clone());
        let right = CacheKey::new(b.0.clone(), b.1.clone(), b.2.clone());

        prop_assert_eq!(left.as_str() == right.as_str(), a == b);
    }

    // After invalidation nothing written earlier is observable, and later writes are.
    #[test]
    fn prop_invalidation_hides_everything(
        before in prop::collection::vec((key_strategy(), value_strategy()), 1..30),
        after in prop::collection::vec((key_strategy(), value_strategy()), 0..10),
    ) {
        let mut store = CacheStore::new(TEST_WINDOW);

        for (key, value) in &before {
            store.set(key.clone(), value.clone());
        }
        store.invalidate_all();
        for (key, value) in &after {
            store.set(key.clone(), value.clone());
        }

        let rewritten: HashMap<&CacheKey, &String> =
            after.iter().map(|(key, value)| (key, value)).collect();

        for (key, _) in &before {
            match rewritten.get(key) {
                Some(value) => {
                    let found = store.get(key);
                    prop_assert_eq!(found.as_ref(), Some(*value));
                }
                None => {
                    prop_assert_eq!(store.get(key), None);
                }
            }
        }
    }

    // The store agrees with a model map that is cleared on every invalidation.
    #[test]
    fn prop_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let mut store = CacheStore::new(TEST_WINDOW);
        let mut model: HashMap<CacheKey, String> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(key.clone(), value.clone());
                    model.insert(key, value);
                }
                CacheOp::Get { key } => {
                    prop_assert_eq!(store.get(&key), model.get(&key).cloned());
                }
                CacheOp::InvalidateAll => {
                    store.invalidate_all();
                    model.clear();
                }
            }
        }

        let live = store.enumerate();
        prop_assert_eq!(live.len(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(live.get(key.as_str()), Some(value));
        }
    }
}

// == Property Test for Concurrent Operation Correctness ==
// Exercises shared access through Arc<RwLock<CacheStore>>

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // Concurrent writers on distinct keys all land; readers only ever see whole values.
    #[test]
    fn prop_concurrent_operation_correctness(
        entries in prop::collection::hash_map(
            (component_strategy(), component_strategy()),
            value_strategy(),
            1..40,
        ),
    ) {
        tokio_test::block_on(async {
            let store = CacheStore::shared(TEST_WINDOW);
            let mut handles = vec![];

            for ((account, attribute), value) in entries.clone() {
                let writer = store.clone();
                let reader = store.clone();
                let key = CacheKey::new(account, "001", attribute);
                let read_key = key.clone();
                let expected = value.clone();

                handles.push(tokio::spawn(async move {
                    writer.write().await.set(key, value);
                    Ok::<_, String>(())
                }));
                handles.push(tokio::spawn(async move {
                    match reader.write().await.get(&read_key) {
                        Some(seen) if seen != expected => {
                            Err(format!("Read torn value {:?} for {}", seen, read_key))
                        }
                        _ => Ok(()),
                    }
                }));
            }

            for handle in handles {
                let result = handle.await.expect("Task should not panic");
                prop_assert!(result.is_ok(), "Concurrent operation failed: {:?}", result);
            }

            let mut cache = store.write().await;
            for ((account, attribute), value) in &entries {
                let key = CacheKey::new(account.clone(), "001", attribute.clone());
                let found = cache.get(&key);
                prop_assert_eq!(found.as_ref(), Some(value));
            }

            Ok(())
        })?;
    }
}
