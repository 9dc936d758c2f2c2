//! Property-based invariant tests for dependency tracking.
//!
//! These tests verify invariants that must hold for any sequence of writes:
//!
//! 1. An effect re-runs exactly when a write changes a value it read.
//! 2. An enumerating effect re-runs exactly when membership changes.
//! 3. Sequence mutations leave the raw data equal to a plain `Vec` model.
//! 4. A computed value always equals its getter applied to current state.
//! 5. Stopping an effect removes every subscription it held.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use observer_core::reactive::Runtime;
use observer_core::{computed, effect, reactive, stop, Key, Observed, Value};
use proptest::prelude::*;
use serde_json::json;

// ── Helpers ─────────────────────────────────────────────────────────────

const KEYS: usize = 4;

fn key(k: usize) -> String {
    format!("k{k}")
}

fn record_with_zeroes() -> Observed {
    let state = reactive(json!({})).into_observed().unwrap();
    for k in 0..KEYS {
        state.set(key(k), 0);
    }
    state
}

#[derive(Debug, Clone)]
enum SeqOp {
    Push(i32),
    Pop,
    Set(usize, i32),
    Delete(usize),
    Truncate(usize),
}

fn seq_op_strategy() -> impl Strategy<Value = SeqOp> {
    prop_oneof![
        (0i32..5).prop_map(SeqOp::Push),
        Just(SeqOp::Pop),
        (0usize..8, 0i32..5).prop_map(|(i, v)| SeqOp::Set(i, v)),
        (0usize..8).prop_map(SeqOp::Delete),
        (0usize..8).prop_map(SeqOp::Truncate),
    ]
}

fn watched_keys(mask: [bool; KEYS]) -> BTreeSet<usize> {
    (0..KEYS).filter(|&k| mask[k]).collect()
}

fn as_values(model: &[i32]) -> Vec<Value> {
    model.iter().map(|&v| Value::from(v)).collect()
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Re-run iff a watched value changes
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn effect_reruns_iff_watched_value_changes(
        mask in proptest::array::uniform4(any::<bool>()),
        writes in proptest::collection::vec((0..KEYS, 0i32..3), 0..40),
    ) {
        let watched = watched_keys(mask);
        let state = record_with_zeroes();
        let runs = Rc::new(Cell::new(0usize));

        let s = state.clone();
        let r = runs.clone();
        let w = watched.clone();
        let _effect = effect(move || {
            r.set(r.get() + 1);
            for k in &w {
                s.get(key(*k));
            }
        });

        let mut model = [0i32; KEYS];
        let mut expected = 1;
        for (k, v) in writes {
            state.set(key(k), v);
            if model[k] != v {
                model[k] = v;
                if watched.contains(&k) {
                    expected += 1;
                }
            }
            prop_assert_eq!(runs.get(), expected);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Enumeration re-runs iff membership changes
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn enumeration_reruns_iff_membership_changes(
        ops in proptest::collection::vec((0..KEYS, proptest::option::of(0i32..3)), 0..40),
    ) {
        let state = reactive(json!({})).into_observed().unwrap();
        let runs = Rc::new(Cell::new(0usize));

        let s = state.clone();
        let r = runs.clone();
        let _effect = effect(move || {
            r.set(r.get() + 1);
            s.keys();
        });

        let mut present = BTreeSet::new();
        let mut expected = 1;
        for (k, op) in ops {
            match op {
                Some(v) => {
                    state.set(key(k), v);
                    if present.insert(k) {
                        expected += 1;
                    }
                }
                None => {
                    let removed = state.delete(key(k));
                    prop_assert_eq!(removed, present.remove(&k));
                    if removed {
                        expected += 1;
                    }
                }
            }
            prop_assert_eq!(runs.get(), expected);
            prop_assert_eq!(state.keys().len(), present.len());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Sequence mutations match a Vec model
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn sequence_matches_vec_model(ops in proptest::collection::vec(seq_op_strategy(), 0..40)) {
        let list = reactive(json!([])).into_observed().unwrap();
        let mut model: Vec<i32> = Vec::new();

        let seen_len = Rc::new(Cell::new(0usize));
        let l = list.clone();
        let seen = seen_len.clone();
        let _effect = effect(move || seen.set(l.len()));

        for op in ops {
            match op {
                SeqOp::Push(v) => {
                    model.push(v);
                    prop_assert_eq!(list.push(v), model.len());
                }
                SeqOp::Pop => {
                    let expected = model.pop().map(Value::from).unwrap_or_default();
                    prop_assert_eq!(list.pop(), expected);
                }
                SeqOp::Set(i, v) if i < model.len() => {
                    model[i] = v;
                    list.set(i, v);
                }
                SeqOp::Set(..) => {}
                SeqOp::Delete(i) => {
                    let expected = i < model.len();
                    if expected {
                        model.remove(i);
                    }
                    prop_assert_eq!(list.delete(i), expected);
                }
                SeqOp::Truncate(n) if n <= model.len() => {
                    model.truncate(n);
                    list.set("length", n);
                }
                SeqOp::Truncate(_) => {}
            }

            let raw = list.to_raw().snapshot();
            prop_assert_eq!(raw.as_sequence().cloned().unwrap_or_default(), as_values(&model));
            // The length-watching effect always saw the latest length.
            prop_assert_eq!(seen_len.get(), model.len());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Computed agrees with its getter
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn computed_agrees_with_getter(writes in proptest::collection::vec((0..KEYS, 0i32..10), 0..30)) {
        let state = record_with_zeroes();
        let s = state.clone();
        let total = computed(move || {
            (0..KEYS)
                .filter_map(|k| s.get(key(k)).as_f64())
                .sum::<f64>()
        });

        let mut model = [0i32; KEYS];
        for (k, v) in writes {
            state.set(key(k), v);
            model[k] = v;
            let expected: i32 = model.iter().sum();
            prop_assert_eq!(total.value(), Value::from(expected));
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Stop removes every subscription
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn stop_removes_every_subscription(mask in proptest::array::uniform4(any::<bool>())) {
        let watched = watched_keys(mask);
        let state = record_with_zeroes();
        let s = state.clone();
        let w = watched.clone();
        let handle = effect(move || {
            for k in &w {
                s.get(key(*k));
            }
        });
        prop_assert_eq!(handle.dependency_count(), watched.len());

        stop(&handle);
        prop_assert_eq!(handle.dependency_count(), 0);
        for k in 0..KEYS {
            prop_assert_eq!(
                Runtime::subscriber_count(state.target(), &Key::from(key(k))),
                0
            );
        }
    }
}
