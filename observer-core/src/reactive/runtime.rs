//! Reactive Runtime
//!
//! The runtime is the central coordinator between observable state and the
//! effects that read it. It owns the dependency graph store and implements
//! the two halves of the protocol: [`track`] and [`trigger`].
//!
//! # How It Works
//!
//! 1. When an effect runs, it becomes the current context (see
//!    [`ReactiveContext`]).
//!
//! 2. Every tracked read calls [`track`], which adds the current effect to
//!    the dependency set for `(target, key)` and records that set on the
//!    effect, so the effect can remove itself before its next run.
//!
//! 3. Every mutation calls [`trigger`], which gathers the subscribers of the
//!    mutated key (plus the shape key for membership changes), and runs
//!    computed effects before ordinary ones.
//!
//! # Storage
//!
//! The store is a thread-local side table keyed by [`TargetId`]. It never
//! holds the targets themselves; a target drops its own entry when it is
//! freed. Dependency sets and effects point at each other weakly: an effect
//! is owned by its handles, a dependency set by the store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::context::{self, ReactiveContext};
use super::effect::{Effect, WeakEffect};
use super::raw::TargetId;
use super::subscriber::{DebuggerEvent, Operation, SubscriberId, TrackOp, TriggerInfo, TriggerOp};
use super::value::Key;

/// The set of effects subscribed to one `(target, key)` pair.
pub(crate) struct Dep {
    subscribers: RefCell<IndexMap<SubscriberId, WeakEffect>>,
}

impl Dep {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            subscribers: RefCell::new(IndexMap::new()),
        })
    }

    /// Add `effect`; returns false if it was already a member.
    pub(crate) fn insert(&self, effect: &Effect) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.contains_key(&effect.id()) {
            return false;
        }
        subscribers.insert(effect.id(), effect.downgrade());
        true
    }

    /// Tolerates being called from an effect's drop while the set is borrowed.
    pub(crate) fn remove(&self, id: SubscriberId) {
        if let Ok(mut subscribers) = self.subscribers.try_borrow_mut() {
            subscribers.shift_remove(&id);
        }
    }

    /// Number of live subscribers.
    pub(crate) fn len(&self) -> usize {
        self.subscribers
            .borrow()
            .values()
            .filter(|effect| effect.is_alive())
            .count()
    }

    fn snapshot(&self) -> Vec<Effect> {
        self.subscribers
            .borrow()
            .values()
            .filter_map(WeakEffect::upgrade)
            .collect()
    }
}

type KeyToDep = HashMap<Key, Rc<Dep>>;

thread_local! {
    static TARGET_MAP: RefCell<HashMap<TargetId, KeyToDep>> = RefCell::new(HashMap::new());
}

/// The key whose subscribers care about membership rather than any single
/// slot: the length slot for sequences, the iterate sentinel otherwise.
fn shape_key(target: TargetId) -> Key {
    if target.is_sequence() {
        Key::Length
    } else {
        Key::Iterate
    }
}

/// Record that the current effect read `key` of `target`.
///
/// No-op when tracking is paused or nothing is running. Iteration reads are
/// recorded under the target's shape key.
pub fn track(target: TargetId, op: TrackOp, key: Key) {
    if !context::should_track() {
        return;
    }
    let Some(effect) = ReactiveContext::current() else {
        return;
    };
    let key = if op == TrackOp::Iterate {
        shape_key(target)
    } else {
        key
    };

    let dep = TARGET_MAP.with(|map| {
        map.borrow_mut()
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_insert_with(Dep::new)
            .clone()
    });

    if dep.insert(&effect) {
        effect.push_dep(&dep);
        trace!(target_id = target.raw(), %key, %op, effect = effect.id().raw(), "track");
        if let Some(on_track) = effect.on_track() {
            on_track(&DebuggerEvent {
                effect: effect.clone(),
                target,
                operation: Operation::Track(op),
                key: Some(key),
                info: None,
            });
        }
    }
}

/// Notify every effect subscribed to a mutation of `target`.
///
/// `clear` reaches every key of the target. Otherwise the literal key is
/// notified, plus the shape key for `add` and `delete`. Computed effects run
/// first so derived values are invalidated before ordinary effects read them.
pub fn trigger(target: TargetId, op: TriggerOp, key: Option<Key>, info: Option<TriggerInfo>) {
    let deps: Vec<Rc<Dep>> = TARGET_MAP.with(|map| {
        let map = map.borrow();
        let Some(deps_map) = map.get(&target) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        if op == TriggerOp::Clear {
            found.extend(deps_map.values().cloned());
        } else {
            if let Some(key) = &key {
                found.extend(deps_map.get(key).cloned());
            }
            if matches!(op, TriggerOp::Add | TriggerOp::Delete) {
                found.extend(deps_map.get(&shape_key(target)).cloned());
            }
        }
        found
    });

    if deps.is_empty() {
        return;
    }

    let mut computed_runners: IndexMap<SubscriberId, Effect> = IndexMap::new();
    let mut effects: IndexMap<SubscriberId, Effect> = IndexMap::new();
    for dep in &deps {
        for effect in dep.snapshot() {
            let bucket = if effect.is_computed() {
                &mut computed_runners
            } else {
                &mut effects
            };
            bucket.entry(effect.id()).or_insert(effect);
        }
    }

    trace!(
        target_id = target.raw(),
        key = ?key,
        %op,
        computed = computed_runners.len(),
        effects = effects.len(),
        "trigger"
    );

    for effect in computed_runners.into_values().chain(effects.into_values()) {
        schedule_run(&effect, target, op, key.as_ref(), info.as_ref());
    }
}

fn schedule_run(
    effect: &Effect,
    target: TargetId,
    op: TriggerOp,
    key: Option<&Key>,
    info: Option<&TriggerInfo>,
) {
    // An earlier runner in this batch may have stopped it.
    if !effect.is_active() {
        return;
    }
    if let Some(on_trigger) = effect.on_trigger() {
        on_trigger(&DebuggerEvent {
            effect: effect.clone(),
            target,
            operation: Operation::Trigger(op),
            key: key.cloned(),
            info: info.cloned(),
        });
    }
    match effect.scheduler() {
        Some(scheduler) => scheduler(effect),
        None => {
            effect.run();
        }
    }
}

/// Subscribe the current effect to everything `child` depends on.
///
/// This is how reading a computed value makes the reader depend on the
/// computed value's own sources, through any depth of chained computeds.
pub(crate) fn track_child_run(child: &Effect) {
    if !context::should_track() {
        return;
    }
    let Some(parent) = ReactiveContext::current() else {
        return;
    };
    for dep in child.deps() {
        if dep.insert(&parent) {
            parent.push_dep(&dep);
        }
    }
}

/// Drop every dependency set belonging to `target`.
///
/// Called when the target itself is freed. Tolerates being called during
/// thread teardown or while the store is borrowed; the entry is then left
/// behind, which is harmless because ids are never reused.
pub(crate) fn forget_target(target: TargetId) {
    let removed = TARGET_MAP
        .try_with(|map| {
            map.try_borrow_mut()
                .ok()
                .and_then(|mut map| map.remove(&target))
        })
        .ok()
        .flatten();
    drop(removed);
}

/// Introspection over the dependency graph store.
pub struct Runtime;

impl Runtime {
    /// Number of effects subscribed to `(target, key)`.
    pub fn subscriber_count(target: TargetId, key: &Key) -> usize {
        TARGET_MAP.with(|map| {
            map.borrow()
                .get(&target)
                .and_then(|deps| deps.get(key))
                .map_or(0, |dep| dep.len())
        })
    }

    /// Whether anything was ever tracked on `target` (and it is still alive).
    pub fn has_target(target: TargetId) -> bool {
        TARGET_MAP.with(|map| map.borrow().contains_key(&target))
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if a read right now would be recorded.
    pub fn is_tracking() -> bool {
        context::is_tracking()
    }
}
