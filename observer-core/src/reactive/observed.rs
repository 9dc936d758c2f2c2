//! Observable Wrappers
//!
//! An [`Observed`] fronts a [`Raw`] container. Every read made through it is
//! reported to the tracker and every mutation to the trigger. The container
//! itself knows nothing about being observed.
//!
//! # Flavors
//!
//! Wrappers come in two flavors, [`Flavor::Reactive`] and
//! [`Flavor::Readonly`]. For a given raw and flavor at most one wrapper is
//! alive at a time, so wrapping is idempotent: `reactive(x) == reactive(x)`.
//!
//! Readonly wrappers reject mutation while the process-wide lock is held (see
//! [`lock`](super::lock)). Nested containers are wrapped lazily, in the flavor
//! of the wrapper they were read through.
//!
//! # Dispatch
//!
//! The per-variant behaviour lives behind the [`Accessor`] trait. The wrapper
//! picks its accessor from the raw's kind once, when it is created.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use tracing::warn;

use super::handlers::{self, accessor_for, Accessor};
use super::raw::{ContainerKind, Raw, TargetId};
use super::subscriber::TriggerOp;
use super::value::{Key, Value};
use crate::error::ReactiveError;

/// The two wrapper flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    Reactive,
    Readonly,
}

impl Flavor {
    pub(crate) fn slot(self) -> usize {
        match self {
            Flavor::Reactive => 0,
            Flavor::Readonly => 1,
        }
    }
}

pub(crate) struct ObservedInner {
    raw: Raw,
    flavor: Flavor,
    accessor: &'static dyn Accessor,
}

/// An observable view of a raw container.
///
/// Clones are the same wrapper; equality is identity.
#[derive(Clone)]
pub struct Observed(Rc<ObservedInner>);

/// Make `value` observable.
///
/// Containers get their reactive wrapper (or their readonly wrapper if they
/// were marked readonly). Wrappers are returned unchanged, in either flavor.
/// Anything that is not a container is returned unchanged; primitives also
/// log a warning.
pub fn reactive(value: impl Into<Value>) -> Value {
    match value.into() {
        Value::Raw(raw) => wrap_reactive(raw),
        observed @ Value::Observed(_) => observed,
        value => reject(value),
    }
}

/// Make a readonly view of `value`.
///
/// A reactive wrapper is unwrapped first, so `readonly(reactive(x))` and
/// `readonly(x)` are the same view.
pub fn readonly(value: impl Into<Value>) -> Value {
    match value.into() {
        Value::Raw(raw) => create_observed(raw, Flavor::Readonly),
        Value::Observed(observed) if observed.is_readonly() => Value::Observed(observed),
        Value::Observed(observed) => create_observed(observed.to_raw(), Flavor::Readonly),
        value => reject(value),
    }
}

fn reject(value: Value) -> Value {
    if !value.is_object() {
        let err = ReactiveError::NotObservable {
            value: value.to_string(),
        };
        warn!("{err}");
    }
    value
}

fn wrap_reactive(raw: Raw) -> Value {
    if raw.is_marked_readonly() {
        create_observed(raw, Flavor::Readonly)
    } else {
        create_observed(raw, Flavor::Reactive)
    }
}

fn create_observed(raw: Raw, flavor: Flavor) -> Value {
    if let Some(existing) = raw.observer(flavor) {
        return Value::Observed(existing);
    }
    if !raw.can_observe() {
        return Value::Raw(raw);
    }
    let observed = Observed(Rc::new(ObservedInner {
        accessor: accessor_for(raw.kind()),
        raw: raw.clone(),
        flavor,
    }));
    raw.set_observer(flavor, &observed);
    Value::Observed(observed)
}

/// Whether `value` is a wrapper of either flavor.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Observed(_))
}

/// Whether `value` is a readonly wrapper.
pub fn is_readonly(value: &Value) -> bool {
    matches!(value, Value::Observed(observed) if observed.is_readonly())
}

/// The raw container behind a wrapper; anything else is returned as is.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Observed(observed) => Value::Raw(observed.to_raw()),
        other => other.clone(),
    }
}

/// Have later calls to [`reactive`] produce a readonly view of `value`.
pub fn mark_readonly(value: Value) -> Value {
    if let Some(raw) = raw_of(&value) {
        raw.mark_readonly();
    }
    value
}

/// Exclude `value` from ever being wrapped.
pub fn mark_non_reactive(value: Value) -> Value {
    if let Some(raw) = raw_of(&value) {
        raw.mark_non_reactive();
    }
    value
}

fn raw_of(value: &Value) -> Option<Raw> {
    match value {
        Value::Raw(raw) => Some(raw.clone()),
        Value::Observed(observed) => Some(observed.to_raw()),
        _ => None,
    }
}

impl Observed {
    pub(crate) fn from_inner(inner: Rc<ObservedInner>) -> Self {
        Self(inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<ObservedInner> {
        Rc::downgrade(&self.0)
    }

    /// The raw container this wrapper fronts.
    pub fn to_raw(&self) -> Raw {
        self.0.raw.clone()
    }

    pub(crate) fn raw(&self) -> &Raw {
        &self.0.raw
    }

    pub fn target(&self) -> TargetId {
        self.0.raw.target()
    }

    pub fn kind(&self) -> ContainerKind {
        self.0.raw.kind()
    }

    pub fn flavor(&self) -> Flavor {
        self.0.flavor
    }

    pub fn is_readonly(&self) -> bool {
        self.0.flavor == Flavor::Readonly
    }

    fn accessor(&self) -> &'static dyn Accessor {
        self.0.accessor
    }

    /// Wrap a value read out of this container in this wrapper's flavor.
    pub(crate) fn wrap_child(&self, value: Value) -> Value {
        match (self.0.flavor, value) {
            (Flavor::Reactive, Value::Raw(raw)) => wrap_reactive(raw),
            (Flavor::Readonly, Value::Raw(raw)) => create_observed(raw, Flavor::Readonly),
            (Flavor::Readonly, Value::Observed(observed)) if !observed.is_readonly() => {
                create_observed(observed.to_raw(), Flavor::Readonly)
            }
            (_, value) => value,
        }
    }

    /// Reject mutation of a locked readonly view.
    fn guard(&self, op: TriggerOp, key: Option<&Key>) -> Result<(), ReactiveError> {
        if self.is_readonly() && handlers::is_locked() {
            return Err(ReactiveError::readonly(op, key));
        }
        Ok(())
    }

    // ---- Reads ----

    /// Read the slot at `key`.
    ///
    /// A ref stored in the slot is unwrapped; a nested container comes back
    /// wrapped in this view's flavor. Missing keys read as `Null`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.accessor()
            .read(self, key.into())
            .unwrap_or_else(|err| {
                warn!("{err}");
                Value::Null
            })
    }

    pub fn has(&self, key: impl Into<Key>) -> bool {
        self.accessor().has(self, key.into())
    }

    /// The keys of this container, in order. Depends on its membership.
    pub fn keys(&self) -> Vec<Key> {
        self.accessor().own_keys(self)
    }

    /// Number of slots. Depends on the container's membership.
    pub fn len(&self) -> usize {
        self.accessor().len(self)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the values, wrapped in this view's flavor.
    pub fn values(&self) -> Values {
        Values(self.entries())
    }

    /// Iterate over `(key, value)` pairs.
    ///
    /// Sequences yield their indices as keys, sets yield each member as both
    /// key and value.
    pub fn entries(&self) -> Entries {
        Entries {
            observed: self.clone(),
            pos: 0,
            started: false,
        }
    }

    /// Call `f(value, key)` for every entry.
    pub fn for_each(&self, mut f: impl FnMut(Value, Value)) {
        for (key, value) in self.entries() {
            f(value, key);
        }
    }

    // ---- Writes ----

    /// Store `value` at `key`, logging if the write is rejected.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        if let Err(err) = self.try_set(key, value) {
            warn!("{err}");
        }
    }

    pub fn try_set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), ReactiveError> {
        let key = key.into();
        self.guard(TriggerOp::Set, Some(&key))?;
        self.accessor().write(self, key, to_raw(&value.into()))
    }

    /// Remove `key`. Returns whether anything was removed.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        self.try_delete(key).unwrap_or_else(|err| {
            warn!("{err}");
            false
        })
    }

    pub fn try_delete(&self, key: impl Into<Key>) -> Result<bool, ReactiveError> {
        let key = key.into();
        self.guard(TriggerOp::Delete, Some(&key))?;
        self.accessor().delete(self, key)
    }

    /// Add a member to a set.
    pub fn add(&self, value: impl Into<Value>) {
        if let Err(err) = self.try_add(value) {
            warn!("{err}");
        }
    }

    /// Add a member to a set. Returns whether it was newly inserted.
    pub fn try_add(&self, value: impl Into<Value>) -> Result<bool, ReactiveError> {
        let value = to_raw(&value.into());
        self.guard(TriggerOp::Add, Some(&Key::Entry(value.clone())))?;
        self.accessor().add(self, value)
    }

    /// Empty a set or map.
    pub fn clear(&self) {
        if let Err(err) = self.try_clear() {
            warn!("{err}");
        }
    }

    pub fn try_clear(&self) -> Result<(), ReactiveError> {
        self.guard(TriggerOp::Clear, None)?;
        self.accessor().clear(self)
    }

    /// Append to a sequence and return the new length.
    ///
    /// A rejected push leaves the sequence alone and returns its current
    /// length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        self.try_push(value).unwrap_or_else(|err| {
            warn!("{err}");
            self.0.raw.len()
        })
    }

    pub fn try_push(&self, value: impl Into<Value>) -> Result<usize, ReactiveError> {
        self.guard(TriggerOp::Add, Some(&Key::Index(self.0.raw.len())))?;
        self.accessor().push(self, to_raw(&value.into()))
    }

    /// Remove and return the last element of a sequence, or `Null`.
    pub fn pop(&self) -> Value {
        self.try_pop().unwrap_or_else(|err| {
            warn!("{err}");
            Value::Null
        })
    }

    pub fn try_pop(&self) -> Result<Value, ReactiveError> {
        let last = self.0.raw.len().checked_sub(1).map(Key::Index);
        self.guard(TriggerOp::Delete, last.as_ref())?;
        self.accessor().pop(self)
    }
}

impl TryFrom<Value> for Observed {
    type Error = ReactiveError;

    /// Accepts a wrapper, or wraps a container reactively.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Observed(observed) => Ok(observed),
            Value::Raw(raw) => match wrap_reactive(raw) {
                Value::Observed(observed) => Ok(observed),
                other => Err(ReactiveError::NotObservable {
                    value: other.to_string(),
                }),
            },
            other => Err(ReactiveError::NotObservable {
                value: other.to_string(),
            }),
        }
    }
}

impl PartialEq for Observed {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Observed {}

impl Hash for Observed {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("flavor", &self.0.flavor)
            .field("raw", &self.0.raw)
            .finish()
    }
}

/// Live iterator over the entries of an [`Observed`].
///
/// Membership is tracked when iteration starts; each element is read through
/// the tracked path as it is reached.
pub struct Entries {
    observed: Observed,
    pos: usize,
    started: bool,
}

impl Iterator for Entries {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<Self::Item> {
        let accessor = self.observed.accessor();
        if !self.started {
            accessor.begin_iteration(&self.observed);
            self.started = true;
        }
        let entry = accessor.entry_at(&self.observed, self.pos)?;
        self.pos += 1;
        Some(entry)
    }
}

/// Live iterator over the values of an [`Observed`].
pub struct Values(Entries);

impl Iterator for Values {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, value)| value)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
