//! Raw Containers
//!
//! A [`Raw`] is the plain data an observable wrapper fronts. It is a shared
//! handle: cloning it does not copy the container, and two handles are equal
//! only when they point at the same container.
//!
//! # Identity
//!
//! Each raw container gets a [`TargetId`] when created. The dependency store
//! is keyed by this id rather than by the container itself, so tracking never
//! extends the container's lifetime. When the last handle goes away the raw
//! removes its own entries from the store.
//!
//! # Wrapper memoization
//!
//! The raw keeps a weak slot per wrapper flavor. Wrappers hold their raw
//! strongly; the raw only points back weakly, so an unused wrapper is freed
//! and a later wrap creates a fresh one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::observed::{Flavor, Observed, ObservedInner};
use super::runtime;
use super::value::Value;

/// Counter for generating unique target IDs.
static TARGET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stable identity of anything that can be tracked: a raw container or a
/// value ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId {
    id: u64,
    /// Sequences use their length slot as the shape key.
    sequence: bool,
}

impl TargetId {
    pub(crate) fn next(sequence: bool) -> Self {
        Self {
            id: TARGET_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            sequence,
        }
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.id
    }

    pub fn is_sequence(&self) -> bool {
        self.sequence
    }
}

/// The variant of a container, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Record,
    Sequence,
    Set,
    Map,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContainerKind::Record => "Record",
            ContainerKind::Sequence => "Sequence",
            ContainerKind::Set => "Set",
            ContainerKind::Map => "Map",
        })
    }
}

/// The data held by a raw container.
#[derive(Debug, Clone)]
pub enum Container {
    /// Insertion-ordered named fields.
    Record(IndexMap<Rc<str>, Value>),
    /// Dense ordered list.
    Sequence(Vec<Value>),
    /// Insertion-ordered unique members.
    Set(IndexSet<Value>),
    /// Insertion-ordered key/value entries.
    Map(IndexMap<Value, Value>),
}

impl Container {
    pub fn kind(&self) -> ContainerKind {
        match self {
            Container::Record(_) => ContainerKind::Record,
            Container::Sequence(_) => ContainerKind::Sequence,
            Container::Set(_) => ContainerKind::Set,
            Container::Map(_) => ContainerKind::Map,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Container::Record(fields) => fields.len(),
            Container::Sequence(items) => items.len(),
            Container::Set(members) => members.len(),
            Container::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_record(&self) -> Option<&IndexMap<Rc<str>, Value>> {
        match self {
            Container::Record(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut IndexMap<Rc<str>, Value>> {
        match self {
            Container::Record(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Vec<Value>> {
        match self {
            Container::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Container::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&IndexSet<Value>> {
        match self {
            Container::Set(members) => Some(members),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut IndexSet<Value>> {
        match self {
            Container::Set(members) => Some(members),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<Value, Value>> {
        match self {
            Container::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<Value, Value>> {
        match self {
            Container::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Opt-in/opt-out flags consulted when wrapping.
#[derive(Debug, Clone, Copy, Default)]
struct Marks {
    readonly: bool,
    non_reactive: bool,
    internal: bool,
}

pub(crate) struct RawInner {
    target: TargetId,
    kind: ContainerKind,
    data: RefCell<Container>,
    marks: Cell<Marks>,
    /// Memoized wrappers, indexed by flavor.
    observers: [RefCell<Weak<ObservedInner>>; 2],
}

impl Drop for RawInner {
    fn drop(&mut self) {
        runtime::forget_target(self.target);
    }
}

/// Shared handle to a plain container.
#[derive(Clone)]
pub struct Raw(Rc<RawInner>);

impl Raw {
    pub fn new(container: Container) -> Self {
        let kind = container.kind();
        Self(Rc::new(RawInner {
            target: TargetId::next(kind == ContainerKind::Sequence),
            kind,
            data: RefCell::new(container),
            marks: Cell::new(Marks::default()),
            observers: [RefCell::new(Weak::new()), RefCell::new(Weak::new())],
        }))
    }

    pub fn record() -> Self {
        Self::new(Container::Record(IndexMap::new()))
    }

    pub fn sequence() -> Self {
        Self::new(Container::Sequence(Vec::new()))
    }

    pub fn set() -> Self {
        Self::new(Container::Set(IndexSet::new()))
    }

    pub fn map() -> Self {
        Self::new(Container::Map(IndexMap::new()))
    }

    /// A set holding `members` in order.
    pub fn set_of<I, V>(members: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(Container::Set(members.into_iter().map(Into::into).collect()))
    }

    /// A map holding `entries` in order.
    pub fn map_of<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::new(Container::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }

    pub fn target(&self) -> TargetId {
        self.0.target
    }

    pub fn kind(&self) -> ContainerKind {
        self.0.kind
    }

    /// Number of slots, read without tracking.
    pub fn len(&self) -> usize {
        self.0.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the container directly. Nothing is tracked.
    ///
    /// The container is borrowed for the duration of `f`; `f` must not
    /// mutate this raw through any path.
    pub fn with<R>(&self, f: impl FnOnce(&Container) -> R) -> R {
        f(&self.0.data.borrow())
    }

    /// Mutate the container directly. Nothing is triggered.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Container) -> R) -> R {
        f(&mut self.0.data.borrow_mut())
    }

    /// A shallow copy of the current contents.
    pub fn snapshot(&self) -> Container {
        self.0.data.borrow().clone()
    }

    /// Flag this container as framework-internal; it is never wrapped.
    pub fn mark_internal(&self) {
        self.update_marks(|marks| marks.internal = true);
    }

    pub(crate) fn mark_readonly(&self) {
        self.update_marks(|marks| marks.readonly = true);
    }

    pub(crate) fn mark_non_reactive(&self) {
        self.update_marks(|marks| marks.non_reactive = true);
    }

    pub(crate) fn is_marked_readonly(&self) -> bool {
        self.0.marks.get().readonly
    }

    /// Whether this container may be wrapped at all.
    pub(crate) fn can_observe(&self) -> bool {
        let marks = self.0.marks.get();
        !marks.non_reactive && !marks.internal
    }

    fn update_marks(&self, f: impl FnOnce(&mut Marks)) {
        let mut marks = self.0.marks.get();
        f(&mut marks);
        self.0.marks.set(marks);
    }

    pub(crate) fn observer(&self, flavor: Flavor) -> Option<Observed> {
        self.0.observers[flavor.slot()]
            .borrow()
            .upgrade()
            .map(Observed::from_inner)
    }

    pub(crate) fn set_observer(&self, flavor: Flavor, observed: &Observed) {
        *self.0.observers[flavor.slot()].borrow_mut() = observed.downgrade();
    }
}

impl PartialEq for Raw {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Raw {}

impl Hash for Raw {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raw")
            .field("id", &self.0.target.raw())
            .field("kind", &self.0.kind)
            .field("len", &self.len())
            .finish()
    }
}

impl Serialize for Raw {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = self.0.data.borrow();
        match &*data {
            Container::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(&**name, value)?;
                }
                map.end()
            }
            Container::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Container::Set(members) => {
                let mut seq = serializer.serialize_seq(Some(members.len()))?;
                for member in members {
                    seq.serialize_element(member)?;
                }
                seq.end()
            }
            // Map keys need not be strings, so entries go out as pairs.
            Container::Map(entries) => {
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for entry in entries {
                    seq.serialize_element(&entry)?;
                }
                seq.end()
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_ids_are_unique() {
        let a = Raw::record();
        let b = Raw::record();
        assert_ne!(a.target(), b.target());
        assert!(Raw::sequence().target().is_sequence());
        assert!(!Raw::map().target().is_sequence());
    }

    #[test]
    fn clone_shares_container() {
        let a = Raw::sequence();
        let b = a.clone();
        b.with_mut(|c| c.as_sequence_mut().unwrap().push(Value::from(1)));
        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
    }

    #[test]
    fn snapshot_is_shallow_copy() {
        let raw = Raw::set_of([1, 2, 3]);
        let copy = raw.snapshot();
        raw.with_mut(|c| c.as_set_mut().unwrap().clear());
        assert_eq!(copy.len(), 3);
        assert!(raw.is_empty());
    }

    #[test]
    fn map_serializes_as_pairs() {
        let raw = Raw::map_of([("a", 1), ("b", 2)]);
        assert_eq!(
            serde_json::to_value(&raw).unwrap(),
            json!([["a", 1], ["b", 2]])
        );
    }

    #[test]
    fn marks_control_observability() {
        let raw = Raw::record();
        assert!(raw.can_observe());
        raw.mark_internal();
        assert!(!raw.can_observe());

        let other = Raw::record();
        other.mark_non_reactive();
        assert!(!other.can_observe());
    }
}
