//! Property Handlers
//!
//! Each container variant is driven through an [`Accessor`]: the capability
//! interface an [`Observed`] dispatches every read and mutation to. This
//! module defines the trait and the two property-style variants, records and
//! sequences. Sets and maps live in [`collections`](super::collections).
//!
//! # Protocol
//!
//! Reads report to [`track`] before returning:
//! - a slot read tracks `get` on its key,
//! - a membership test tracks `has`,
//! - enumeration and length track the container's shape.
//!
//! Writes unwrap the incoming value, mutate the raw container, release it,
//! and only then report to [`trigger`]. Writes that leave a slot's value
//! unchanged are not reported.
//!
//! A slot holding a ref is special: reading it yields the ref's value, and
//! writing a non-ref value to it assigns through the ref.

use std::cell::Cell;
use std::fmt;

use super::collections::{MapAccessor, SetAccessor};
use super::observed::Observed;
use super::raw::{Container, ContainerKind, Raw};
use super::runtime::{track, trigger};
use super::subscriber::{TrackOp, TriggerInfo, TriggerOp};
use super::value::{index_from_f64, Key, Value};
use crate::error::ReactiveError;

thread_local! {
    static LOCKED: Cell<bool> = const { Cell::new(true) };
}

/// Enforce readonly views (the default).
pub fn lock() {
    LOCKED.with(|locked| locked.set(true));
}

/// Let readonly views be mutated, e.g. while populating them in bulk.
pub fn unlock() {
    LOCKED.with(|locked| locked.set(false));
}

pub fn is_locked() -> bool {
    LOCKED.with(Cell::get)
}

/// Per-variant behaviour behind an [`Observed`].
///
/// Readonly enforcement happens before any of these are called; an accessor
/// only sees mutations that are allowed to go through.
pub(crate) trait Accessor {
    fn read(&self, observed: &Observed, key: Key) -> Result<Value, ReactiveError>;

    fn write(&self, observed: &Observed, key: Key, value: Value) -> Result<(), ReactiveError>;

    /// Returns whether anything was removed.
    fn delete(&self, observed: &Observed, key: Key) -> Result<bool, ReactiveError>;

    fn has(&self, observed: &Observed, key: Key) -> bool;

    fn own_keys(&self, observed: &Observed) -> Vec<Key>;

    fn len(&self, observed: &Observed) -> usize;

    /// Record the dependency of an iteration that is about to start.
    fn begin_iteration(&self, observed: &Observed);

    /// The entry at position `pos`, read through the tracked path.
    fn entry_at(&self, observed: &Observed, pos: usize) -> Option<(Value, Value)>;

    fn add(&self, observed: &Observed, _value: Value) -> Result<bool, ReactiveError> {
        Err(unsupported("add", observed))
    }

    fn clear(&self, observed: &Observed) -> Result<(), ReactiveError> {
        Err(unsupported("clear", observed))
    }

    fn push(&self, observed: &Observed, _value: Value) -> Result<usize, ReactiveError> {
        Err(unsupported("push", observed))
    }

    fn pop(&self, observed: &Observed) -> Result<Value, ReactiveError> {
        Err(unsupported("pop", observed))
    }
}

/// The accessor for a container kind.
pub(crate) fn accessor_for(kind: ContainerKind) -> &'static dyn Accessor {
    match kind {
        ContainerKind::Record => &RecordAccessor,
        ContainerKind::Sequence => &SequenceAccessor,
        ContainerKind::Set => &SetAccessor,
        ContainerKind::Map => &MapAccessor,
    }
}

pub(crate) fn unsupported(op: &'static str, observed: &Observed) -> ReactiveError {
    ReactiveError::Unsupported {
        op,
        kind: observed.kind(),
    }
}

/// Track a slot read and hand back what the caller should see.
fn finish_read(observed: &Observed, key: Key, value: Value) -> Value {
    track(observed.target(), TrackOp::Get, key);
    match value {
        Value::Ref(slot) => slot.value(),
        value => observed.wrap_child(value),
    }
}

/// Store `value` in a slot that previously held `old`, then notify.
///
/// `old` is `None` when the slot did not exist. The container borrow is
/// released before anything is triggered.
fn commit_write(
    raw: &Raw,
    key: Key,
    old: Option<Value>,
    value: Value,
    store: impl FnOnce(&mut Container, Value),
) {
    if let Some(Value::Ref(slot)) = &old {
        if !matches!(value, Value::Ref(_)) {
            slot.set_value(value);
            return;
        }
    }

    raw.with_mut(|container| store(container, value.clone()));

    match old {
        None => trigger(
            raw.target(),
            TriggerOp::Add,
            Some(key),
            Some(TriggerInfo::added(value)),
        ),
        Some(old) if old != value => trigger(
            raw.target(),
            TriggerOp::Set,
            Some(key),
            Some(TriggerInfo::write(old, value)),
        ),
        Some(_) => {}
    }
}

// ----------------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------------

pub(crate) struct RecordAccessor;

impl Accessor for RecordAccessor {
    fn read(&self, observed: &Observed, key: Key) -> Result<Value, ReactiveError> {
        let key = key.for_record();
        let value = match &key {
            Key::Field(name) => observed.raw().with(|container| {
                container
                    .as_record()
                    .and_then(|fields| fields.get(name).cloned())
                    .unwrap_or_default()
            }),
            _ => Value::Null,
        };
        Ok(finish_read(observed, key, value))
    }

    fn write(&self, observed: &Observed, key: Key, value: Value) -> Result<(), ReactiveError> {
        let Key::Field(name) = key.for_record() else {
            return Err(unsupported("set", observed));
        };
        let raw = observed.raw();
        let old = raw.with(|container| {
            container
                .as_record()
                .and_then(|fields| fields.get(&name).cloned())
        });
        commit_write(raw, Key::Field(name.clone()), old, value, |container, value| {
            if let Some(fields) = container.as_record_mut() {
                fields.insert(name, value);
            }
        });
        Ok(())
    }

    fn delete(&self, observed: &Observed, key: Key) -> Result<bool, ReactiveError> {
        let Key::Field(name) = key.for_record() else {
            return Ok(false);
        };
        let raw = observed.raw();
        let old = raw.with_mut(|container| {
            container
                .as_record_mut()
                .and_then(|fields| fields.shift_remove(&name))
        });
        let Some(old) = old else {
            return Ok(false);
        };
        trigger(
            raw.target(),
            TriggerOp::Delete,
            Some(Key::Field(name)),
            Some(TriggerInfo::removed(old)),
        );
        Ok(true)
    }

    fn has(&self, observed: &Observed, key: Key) -> bool {
        let key = key.for_record();
        track(observed.target(), TrackOp::Has, key.clone());
        let Key::Field(name) = key else {
            return false;
        };
        observed.raw().with(|container| {
            container
                .as_record()
                .is_some_and(|fields| fields.contains_key(&name))
        })
    }

    fn own_keys(&self, observed: &Observed) -> Vec<Key> {
        self.begin_iteration(observed);
        observed.raw().with(|container| {
            container
                .as_record()
                .map(|fields| fields.keys().cloned().map(Key::Field).collect())
                .unwrap_or_default()
        })
    }

    fn len(&self, observed: &Observed) -> usize {
        self.begin_iteration(observed);
        observed.raw().len()
    }

    fn begin_iteration(&self, observed: &Observed) {
        track(observed.target(), TrackOp::Iterate, Key::Iterate);
    }

    fn entry_at(&self, observed: &Observed, pos: usize) -> Option<(Value, Value)> {
        let name = observed.raw().with(|container| {
            container
                .as_record()
                .and_then(|fields| fields.get_index(pos).map(|(name, _)| name.clone()))
        })?;
        let value = self.read(observed, Key::Field(name.clone())).ok()?;
        Some((Value::Str(name), value))
    }
}

// ----------------------------------------------------------------------------
// Sequences
// ----------------------------------------------------------------------------

pub(crate) struct SequenceAccessor;

fn read_items<R: Default>(raw: &Raw, f: impl FnOnce(&Vec<Value>) -> R) -> R {
    raw.with(|container| container.as_sequence().map(f).unwrap_or_default())
}

fn write_items<R: Default>(raw: &Raw, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    raw.with_mut(|container| container.as_sequence_mut().map(f).unwrap_or_default())
}

/// Most slots a sequence may hold.
const MAX_LENGTH: usize = u32::MAX as usize;

/// Most slots a single write may add to a sequence.
const MAX_GROWTH: usize = 1 << 20;

fn invalid_length(len: impl fmt::Display) -> ReactiveError {
    ReactiveError::InvalidLength {
        value: len.to_string(),
    }
}

/// Make room for `new_len` slots before a sequence grows to that length.
fn reserve_slots(raw: &Raw, new_len: usize) -> Result<(), ReactiveError> {
    raw.with_mut(|container| {
        let Some(items) = container.as_sequence_mut() else {
            return Ok(());
        };
        let extra = new_len.saturating_sub(items.len());
        if extra == 0 {
            return Ok(());
        }
        if new_len > MAX_LENGTH || extra > MAX_GROWTH {
            return Err(invalid_length(new_len));
        }
        items.try_reserve(extra).map_err(|_| invalid_length(new_len))
    })
}

/// Resize a sequence, reporting every slot that fell off the end.
fn set_length(raw: &Raw, new_len: usize) -> Result<(), ReactiveError> {
    reserve_slots(raw, new_len)?;
    let (old_len, removed) = write_items(raw, |items| {
        let old_len = items.len();
        let removed = if new_len < old_len {
            items.split_off(new_len)
        } else {
            items.resize(new_len, Value::Null);
            Vec::new()
        };
        (old_len, removed)
    });
    if old_len == new_len {
        return Ok(());
    }

    for (offset, old) in removed.into_iter().enumerate() {
        trigger(
            raw.target(),
            TriggerOp::Delete,
            Some(Key::Index(new_len + offset)),
            Some(TriggerInfo::removed(old)),
        );
    }
    trigger(
        raw.target(),
        TriggerOp::Set,
        Some(Key::Length),
        Some(TriggerInfo::write(Value::from(old_len), Value::from(new_len))),
    );
    Ok(())
}

fn parse_length(value: &Value) -> Result<usize, ReactiveError> {
    match value {
        Value::Number(n) => index_from_f64(*n).ok_or_else(|| invalid_length(value)),
        other => Err(invalid_length(other)),
    }
}

impl Accessor for SequenceAccessor {
    fn read(&self, observed: &Observed, key: Key) -> Result<Value, ReactiveError> {
        let key = key.for_sequence();
        let value = match &key {
            Key::Index(index) => read_items(observed.raw(), |items| {
                items.get(*index).cloned().unwrap_or_default()
            }),
            Key::Length => {
                track(observed.target(), TrackOp::Get, Key::Length);
                return Ok(Value::from(observed.raw().len()));
            }
            _ => Value::Null,
        };
        Ok(finish_read(observed, key, value))
    }

    fn write(&self, observed: &Observed, key: Key, value: Value) -> Result<(), ReactiveError> {
        let raw = observed.raw();
        match key.for_sequence() {
            Key::Index(index) => {
                let new_len = index.checked_add(1).ok_or_else(|| invalid_length(index))?;
                reserve_slots(raw, new_len)?;
                let old = read_items(raw, |items| items.get(index).cloned());
                commit_write(raw, Key::Index(index), old, value, |container, value| {
                    if let Some(items) = container.as_sequence_mut() {
                        if index < items.len() {
                            items[index] = value;
                        } else {
                            items.resize(index, Value::Null);
                            items.push(value);
                        }
                    }
                });
                Ok(())
            }
            Key::Length => set_length(raw, parse_length(&value)?),
            _ => Err(unsupported("set", observed)),
        }
    }

    /// Removing a slot closes the gap: every later element moves down one.
    fn delete(&self, observed: &Observed, key: Key) -> Result<bool, ReactiveError> {
        let Key::Index(index) = key.for_sequence() else {
            return Ok(false);
        };
        let raw = observed.raw();
        let removed = write_items(raw, |items| {
            (index < items.len()).then(|| {
                let removed = items.remove(index);
                (removed, items[index..].to_vec())
            })
        });
        let Some((removed, shifted)) = removed else {
            return Ok(false);
        };

        let target = raw.target();
        let mut previous = removed;
        for (offset, current) in shifted.into_iter().enumerate() {
            if previous != current {
                trigger(
                    target,
                    TriggerOp::Set,
                    Some(Key::Index(index + offset)),
                    Some(TriggerInfo::write(previous, current.clone())),
                );
            }
            previous = current;
        }
        let vacated = raw.len();
        trigger(
            target,
            TriggerOp::Delete,
            Some(Key::Index(vacated)),
            Some(TriggerInfo::removed(previous)),
        );
        Ok(true)
    }

    fn has(&self, observed: &Observed, key: Key) -> bool {
        let key = key.for_sequence();
        track(observed.target(), TrackOp::Has, key.clone());
        match key {
            Key::Index(index) => index < observed.raw().len(),
            Key::Length => true,
            _ => false,
        }
    }

    fn own_keys(&self, observed: &Observed) -> Vec<Key> {
        self.begin_iteration(observed);
        (0..observed.raw().len()).map(Key::Index).collect()
    }

    fn len(&self, observed: &Observed) -> usize {
        track(observed.target(), TrackOp::Get, Key::Length);
        observed.raw().len()
    }

    fn begin_iteration(&self, observed: &Observed) {
        track(observed.target(), TrackOp::Iterate, Key::Length);
    }

    fn entry_at(&self, observed: &Observed, pos: usize) -> Option<(Value, Value)> {
        if pos >= observed.raw().len() {
            return None;
        }
        let value = self.read(observed, Key::Index(pos)).ok()?;
        Some((Value::from(pos), value))
    }

    fn push(&self, observed: &Observed, value: Value) -> Result<usize, ReactiveError> {
        let index = observed.raw().len();
        self.write(observed, Key::Index(index), value)?;
        Ok(observed.raw().len())
    }

    fn pop(&self, observed: &Observed) -> Result<Value, ReactiveError> {
        let raw = observed.raw();
        let popped = write_items(raw, |items| items.pop().map(|last| (items.len(), last)));
        let Some((index, last)) = popped else {
            return Ok(Value::Null);
        };
        trigger(
            raw.target(),
            TriggerOp::Delete,
            Some(Key::Index(index)),
            Some(TriggerInfo::removed(last.clone())),
        );
        Ok(observed.wrap_child(last))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
