//! Collection Instrumentation
//!
//! Sets and maps are driven through named operations (`get`, `has`, `add`,
//! `set`, `delete`, `clear`, iteration) rather than slot access, so their
//! accessors differ from the property handlers in a few ways:
//!
//! - Keys and members are unwrapped before lookup, so a wrapper and its raw
//!   address the same entry.
//! - Size and iteration depend on the collection's shape.
//! - Values handed out (by `get`, iteration, `for_each`) are wrapped in the
//!   flavor of the view they came through. Refs are not unwrapped.
//! - `clear` on a non-empty collection fires a single `clear` carrying a
//!   shallow copy of what was removed.

use super::handlers::{unsupported, Accessor};
use super::observed::{to_raw, Observed};
use super::raw::{Container, Raw};
use super::runtime::{track, trigger};
use super::subscriber::{TrackOp, TriggerInfo, TriggerOp};
use super::value::{Key, Value};
use crate::error::ReactiveError;

/// The raw member or map key addressed by `key`.
fn entry_key(key: Key) -> Value {
    to_raw(&key.into_entry())
}

fn clear_collection(observed: &Observed) -> Result<(), ReactiveError> {
    let raw = observed.raw();
    let old = raw.with_mut(|container| match container {
        Container::Set(members) if !members.is_empty() => {
            Some(Container::Set(std::mem::take(members)))
        }
        Container::Map(entries) if !entries.is_empty() => {
            Some(Container::Map(std::mem::take(entries)))
        }
        _ => None,
    });
    if let Some(old) = old {
        trigger(
            raw.target(),
            TriggerOp::Clear,
            None,
            Some(TriggerInfo::cleared(Raw::new(old))),
        );
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Sets
// ----------------------------------------------------------------------------

pub(crate) struct SetAccessor;

impl Accessor for SetAccessor {
    fn read(&self, observed: &Observed, _key: Key) -> Result<Value, ReactiveError> {
        Err(unsupported("get", observed))
    }

    fn write(&self, observed: &Observed, _key: Key, _value: Value) -> Result<(), ReactiveError> {
        Err(unsupported("set", observed))
    }

    fn delete(&self, observed: &Observed, key: Key) -> Result<bool, ReactiveError> {
        let member = entry_key(key);
        let raw = observed.raw();
        let removed = raw.with_mut(|container| {
            container
                .as_set_mut()
                .and_then(|members| members.shift_take(&member))
        });
        let Some(removed) = removed else {
            return Ok(false);
        };
        trigger(
            raw.target(),
            TriggerOp::Delete,
            Some(Key::Entry(member)),
            Some(TriggerInfo::removed(removed)),
        );
        Ok(true)
    }

    fn has(&self, observed: &Observed, key: Key) -> bool {
        let member = entry_key(key);
        track(observed.target(), TrackOp::Has, Key::Entry(member.clone()));
        observed.raw().with(|container| {
            container
                .as_set()
                .is_some_and(|members| members.contains(&member))
        })
    }

    fn own_keys(&self, observed: &Observed) -> Vec<Key> {
        self.begin_iteration(observed);
        let members: Vec<Value> = observed.raw().with(|container| {
            container
                .as_set()
                .map(|members| members.iter().cloned().collect())
                .unwrap_or_default()
        });
        members
            .into_iter()
            .map(|member| Key::Entry(observed.wrap_child(member)))
            .collect()
    }

    fn len(&self, observed: &Observed) -> usize {
        self.begin_iteration(observed);
        observed.raw().len()
    }

    fn begin_iteration(&self, observed: &Observed) {
        track(observed.target(), TrackOp::Iterate, Key::Iterate);
    }

    fn entry_at(&self, observed: &Observed, pos: usize) -> Option<(Value, Value)> {
        let member = observed.raw().with(|container| {
            container
                .as_set()
                .and_then(|members| members.get_index(pos).cloned())
        })?;
        let member = observed.wrap_child(member);
        Some((member.clone(), member))
    }

    fn add(&self, observed: &Observed, value: Value) -> Result<bool, ReactiveError> {
        let raw = observed.raw();
        let inserted = raw.with_mut(|container| {
            container
                .as_set_mut()
                .is_some_and(|members| members.insert(value.clone()))
        });
        if inserted {
            trigger(
                raw.target(),
                TriggerOp::Add,
                Some(Key::Entry(value.clone())),
                Some(TriggerInfo::added(value)),
            );
        }
        Ok(inserted)
    }

    fn clear(&self, observed: &Observed) -> Result<(), ReactiveError> {
        clear_collection(observed)
    }
}

// ----------------------------------------------------------------------------
// Maps
// ----------------------------------------------------------------------------

pub(crate) struct MapAccessor;

impl Accessor for MapAccessor {
    fn read(&self, observed: &Observed, key: Key) -> Result<Value, ReactiveError> {
        let key = entry_key(key);
        track(observed.target(), TrackOp::Get, Key::Entry(key.clone()));
        let value = observed.raw().with(|container| {
            container
                .as_map()
                .and_then(|entries| entries.get(&key).cloned())
                .unwrap_or_default()
        });
        Ok(observed.wrap_child(value))
    }

    fn write(&self, observed: &Observed, key: Key, value: Value) -> Result<(), ReactiveError> {
        let key = entry_key(key);
        let raw = observed.raw();
        let old = raw.with_mut(|container| {
            container
                .as_map_mut()
                .and_then(|entries| entries.insert(key.clone(), value.clone()))
        });
        match old {
            None => trigger(
                raw.target(),
                TriggerOp::Add,
                Some(Key::Entry(key)),
                Some(TriggerInfo::added(value)),
            ),
            Some(old) if old != value => trigger(
                raw.target(),
                TriggerOp::Set,
                Some(Key::Entry(key)),
                Some(TriggerInfo::write(old, value)),
            ),
            Some(_) => {}
        }
        Ok(())
    }

    fn delete(&self, observed: &Observed, key: Key) -> Result<bool, ReactiveError> {
        let key = entry_key(key);
        let raw = observed.raw();
        let old = raw.with_mut(|container| {
            container
                .as_map_mut()
                .and_then(|entries| entries.shift_remove(&key))
        });
        let Some(old) = old else {
            return Ok(false);
        };
        trigger(
            raw.target(),
            TriggerOp::Delete,
            Some(Key::Entry(key)),
            Some(TriggerInfo::removed(old)),
        );
        Ok(true)
    }

    fn has(&self, observed: &Observed, key: Key) -> bool {
        let key = entry_key(key);
        track(observed.target(), TrackOp::Has, Key::Entry(key.clone()));
        observed.raw().with(|container| {
            container
                .as_map()
                .is_some_and(|entries| entries.contains_key(&key))
        })
    }

    fn own_keys(&self, observed: &Observed) -> Vec<Key> {
        self.begin_iteration(observed);
        let keys: Vec<Value> = observed.raw().with(|container| {
            container
                .as_map()
                .map(|entries| entries.keys().cloned().collect())
                .unwrap_or_default()
        });
        keys.into_iter()
            .map(|key| Key::Entry(observed.wrap_child(key)))
            .collect()
    }

    fn len(&self, observed: &Observed) -> usize {
        self.begin_iteration(observed);
        observed.raw().len()
    }

    fn begin_iteration(&self, observed: &Observed) {
        track(observed.target(), TrackOp::Iterate, Key::Iterate);
    }

    fn entry_at(&self, observed: &Observed, pos: usize) -> Option<(Value, Value)> {
        let (key, value) = observed.raw().with(|container| {
            container.as_map().and_then(|entries| {
                entries
                    .get_index(pos)
                    .map(|(key, value)| (key.clone(), value.clone()))
            })
        })?;
        Some((observed.wrap_child(key), observed.wrap_child(value)))
    }

    fn clear(&self, observed: &Observed) -> Result<(), ReactiveError> {
        clear_collection(observed)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Operation::Trigger;
    use crate::reactive::{
        effect, effect_with, is_readonly, reactive, readonly, Effect, EffectOptions,
    };
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use tracing_test::traced_test;

    fn counted(f: impl Fn() + 'static) -> (Effect, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let c = runs.clone();
        let handle = effect(move || {
            c.set(c.get() + 1);
            f();
        });
        (handle, runs)
    }

    fn observe(raw: Raw) -> Observed {
        reactive(raw).into_observed().unwrap()
    }

    #[test]
    fn set_add_notifies_has_only_when_new() {
        let set = observe(Raw::set());
        let s = set.clone();
        let (_effect, runs) = counted(move || {
            s.has("x");
        });

        set.add("x");
        assert_eq!(runs.get(), 2);

        set.add("x");
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn set_size_and_iteration_track_shape() {
        let set = observe(Raw::set_of([1, 2]));
        let s = set.clone();
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let log = sizes.clone();
        let _e = effect(move || log.borrow_mut().push(s.len()));

        set.add(3);
        set.delete(1);
        set.delete(99);
        assert_eq!(*sizes.borrow(), vec![2, 3, 2]);
    }

    #[test]
    fn set_iteration_yields_wrapped_members() {
        let member = Raw::record();
        let set = observe(Raw::set_of([Value::Raw(member.clone())]));

        let yielded: Vec<Value> = set.values().collect();
        assert_eq!(yielded.len(), 1);
        assert_eq!(yielded[0], reactive(member.clone()));

        // A wrapped member addresses the same entry as its raw.
        assert!(set.has(yielded[0].clone()));
        assert!(set.delete(yielded[0].clone()));
        assert!(set.is_empty());
    }

    #[test]
    fn map_set_distinguishes_add_from_update() {
        let map = observe(Raw::map());
        let ops = Rc::new(RefCell::new(Vec::new()));
        let log = ops.clone();
        let m = map.clone();
        let _e = effect_with(
            move || {
                m.get("k");
                m.len();
            },
            EffectOptions::new().scheduler(|_| {}).on_trigger(move |event| {
                log.borrow_mut().push(event.operation);
            }),
        );

        map.set("k", 1);
        map.set("k", 2);
        map.set("k", 2);
        map.delete("k");

        assert_eq!(
            *ops.borrow(),
            vec![
                Trigger(TriggerOp::Add),
                Trigger(TriggerOp::Set),
                Trigger(TriggerOp::Delete),
            ]
        );
    }

    #[test]
    fn map_get_wraps_values_without_unwrapping_refs() {
        let map = observe(Raw::map_of([("nested", Value::from(json!({ "x": 1 })))]));
        assert!(map.get("nested").as_observed().is_some());

        let counter = crate::reactive::make_ref(1);
        map.set("counter", counter.clone());
        assert_eq!(map.get("counter"), Value::Ref(counter));
    }

    #[test]
    fn map_entries_and_for_each_yield_wrapped_values() {
        let map = observe(Raw::map_of([(1, Value::from(json!({ "n": 1 })))]));
        let view = readonly(map.clone()).into_observed().unwrap();

        let mut seen = Vec::new();
        view.for_each(|value, key| seen.push((key, value)));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Value::from(1));
        assert!(is_readonly(&seen[0].1));

        let (_, value) = map.entries().next().unwrap();
        assert!(!is_readonly(&value));
    }

    #[test]
    fn clear_fires_once_with_snapshot() {
        let map = observe(Raw::map_of([("a", 1), ("b", 2)]));
        let snapshots = Rc::new(RefCell::new(Vec::new()));
        let log = snapshots.clone();
        let m = map.clone();
        let _e = effect_with(
            move || {
                m.get("a");
                m.get("b");
            },
            EffectOptions::new().on_trigger(move |event| {
                let info = event.info.clone().unwrap_or_default();
                log.borrow_mut().push(info.old_target.map(|raw| raw.len()));
            }),
        );

        map.clear();
        assert_eq!(*snapshots.borrow(), vec![Some(2)]);
        assert!(map.is_empty());

        // Clearing an empty collection is silent.
        map.clear();
        assert_eq!(snapshots.borrow().len(), 1);
    }

    #[test]
    #[traced_test]
    fn readonly_collections_reject_mutation() {
        let view = readonly(Raw::set_of(["a"])).into_observed().unwrap();
        view.add("b");
        assert!(logs_contain("Add operation on key \"b\" failed: target is readonly."));
        view.clear();
        assert!(logs_contain("Clear operation failed: target is readonly."));
        assert_eq!(view.len(), 1);

        assert_eq!(view.get("a"), Value::Null);
        assert!(logs_contain("'get' is not supported on a Set"));
    }
}
