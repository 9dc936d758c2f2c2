//! Ref Implementation
//!
//! A [`Ref`] is a single-value observable box, for state that is not itself a
//! container. It plays the part of the raw value in the dependency store:
//! reading tracks `get` under the empty key on the ref's own identity, and
//! writing triggers `set` under the same key.
//!
//! # Sources
//!
//! A ref can be backed by:
//! - its own cell (from [`make_ref`]),
//! - a computed value (see [`computed`](super::computed)),
//! - a slot of an observed container (from [`to_refs`]).
//!
//! # Writes
//!
//! Unlike container slots, a cell ref notifies on every write, even when the
//! new value equals the old one.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::warn;

use super::computed::ComputedState;
use super::context;
use super::effect::Effect;
use super::observed::{reactive, Observed};
use super::raw::TargetId;
use super::runtime::{self, track, trigger};
use super::subscriber::{TrackOp, TriggerInfo, TriggerOp};
use super::value::{Key, Value};
use crate::error::ReactiveError;

pub(crate) enum RefSource {
    Cell {
        target: TargetId,
        slot: RefCell<Value>,
    },
    Computed(ComputedState),
    Property {
        object: Observed,
        key: Key,
    },
}

impl Drop for RefSource {
    fn drop(&mut self) {
        if let RefSource::Cell { target, .. } = self {
            runtime::forget_target(*target);
        }
    }
}

/// Handle to a single observable value.
///
/// Clones share the same box; equality is identity.
#[derive(Clone)]
pub struct Ref(Rc<RefSource>);

/// Box `value` in a ref.
///
/// A ref passed in is returned unchanged. A container is made reactive
/// before being stored.
pub fn make_ref(value: impl Into<Value>) -> Ref {
    match value.into() {
        Value::Ref(existing) => existing,
        value => Ref::from_source(RefSource::Cell {
            target: TargetId::next(false),
            slot: RefCell::new(convert(value)),
        }),
    }
}

pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// A ref per key of `object`, each reading and writing through `object`.
pub fn to_refs(object: &Observed) -> IndexMap<Key, Ref> {
    object
        .keys()
        .into_iter()
        .map(|key| {
            let r = Ref::from_source(RefSource::Property {
                object: object.clone(),
                key: key.clone(),
            });
            (key, r)
        })
        .collect()
}

fn convert(value: Value) -> Value {
    if value.is_container() {
        reactive(value)
    } else {
        value
    }
}

impl Ref {
    pub fn new(value: impl Into<Value>) -> Self {
        make_ref(value)
    }

    pub(crate) fn from_source(source: RefSource) -> Self {
        Self(Rc::new(source))
    }

    /// Read the value, tracking it.
    pub fn value(&self) -> Value {
        match &*self.0 {
            RefSource::Cell { target, slot } => {
                track(*target, TrackOp::Get, Key::empty());
                slot.borrow().clone()
            }
            RefSource::Computed(state) => state.read(),
            RefSource::Property { object, key } => object.get(key.clone()),
        }
    }

    /// Read the value without tracking it.
    pub fn peek(&self) -> Value {
        match &*self.0 {
            RefSource::Cell { slot, .. } => slot.borrow().clone(),
            RefSource::Computed(state) => state.evaluate(),
            RefSource::Property { object, key } => context::untracked(|| object.get(key.clone())),
        }
    }

    /// Write the value, logging if the write is rejected.
    pub fn set_value(&self, value: impl Into<Value>) {
        if let Err(err) = self.try_set(value) {
            warn!("{err}");
        }
    }

    pub fn try_set(&self, value: impl Into<Value>) -> Result<(), ReactiveError> {
        match &*self.0 {
            RefSource::Cell { target, slot } => {
                let value = convert(value.into());
                let old = slot.replace(value.clone());
                trigger(
                    *target,
                    TriggerOp::Set,
                    Some(Key::empty()),
                    Some(TriggerInfo::write(old, value)),
                );
                Ok(())
            }
            RefSource::Computed(state) => state.write(value.into()),
            RefSource::Property { object, key } => object.try_set(key.clone(), value),
        }
    }

    /// The backing effect of a computed ref.
    pub fn effect(&self) -> Option<&Effect> {
        match &*self.0 {
            RefSource::Computed(state) => Some(state.effect()),
            _ => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(&*self.0, RefSource::Computed(_))
    }

    /// The identity reads of a cell ref are tracked under.
    pub fn target(&self) -> Option<TargetId> {
        match &*self.0 {
            RefSource::Cell { target, .. } => Some(*target),
            RefSource::Property { object, .. } => Some(object.target()),
            RefSource::Computed(_) => None,
        }
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Ref {}

impl Hash for Ref {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            RefSource::Cell { target, slot } => f
                .debug_struct("Ref")
                .field("target", &target.raw())
                .field("value", &*slot.borrow())
                .finish(),
            RefSource::Computed(state) => f
                .debug_struct("Ref")
                .field("computed", state.effect())
                .finish(),
            RefSource::Property { object, key } => f
                .debug_struct("Ref")
                .field("object", object)
                .field("key", key)
                .finish(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, is_reactive, Runtime};
    use serde_json::json;
    use std::cell::Cell;

    fn counted(read: impl Fn() + 'static) -> (Effect, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let c = runs.clone();
        let handle = effect(move || {
            c.set(c.get() + 1);
            read();
        });
        (handle, runs)
    }

    #[test]
    fn ref_reads_track_and_writes_trigger() {
        let count = make_ref(0);
        let c = count.clone();
        let (_effect, runs) = counted(move || {
            c.value();
        });

        count.set_value(1);
        assert_eq!(runs.get(), 2);
        assert_eq!(count.value(), Value::from(1));
    }

    #[test]
    fn ref_writes_notify_even_when_unchanged() {
        let count = make_ref(1);
        let c = count.clone();
        let (_effect, runs) = counted(move || {
            c.value();
        });

        count.set_value(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn make_ref_is_idempotent() {
        let original = make_ref("x");
        let again = make_ref(original.clone());
        assert_eq!(original, again);
        assert!(is_ref(&Value::Ref(again)));
        assert!(!is_ref(&Value::from("x")));
    }

    #[test]
    fn container_values_become_reactive() {
        let holder = make_ref(json!({ "a": 1 }));
        assert!(is_reactive(&holder.value()));

        holder.set_value(json!([1, 2]));
        assert!(is_reactive(&holder.value()));
    }

    #[test]
    fn peek_does_not_subscribe() {
        let count = make_ref(0);
        let c = count.clone();
        let (_effect, runs) = counted(move || {
            c.peek();
        });

        count.set_value(1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn property_refs_read_and_write_through() {
        let state = reactive(json!({ "a": 1, "b": 2 })).into_observed().unwrap();
        let refs = to_refs(&state);
        assert_eq!(refs.len(), 2);

        let a = refs[&Key::from("a")].clone();
        let (_effect, runs) = counted(move || {
            a.value();
        });

        refs[&Key::from("a")].set_value(10);
        assert_eq!(state.get("a"), Value::from(10));
        assert_eq!(runs.get(), 2);

        state.set("a", 11);
        assert_eq!(refs[&Key::from("a")].value(), Value::from(11));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn dropped_ref_leaves_no_store_entry() {
        let count = make_ref(0);
        let target = count.target().unwrap();
        let c = count.clone();
        let e = effect(move || c.value());
        assert!(Runtime::has_target(target));

        e.stop();
        drop(e);
        drop(count);
        assert!(!Runtime::has_target(target));
    }
}
