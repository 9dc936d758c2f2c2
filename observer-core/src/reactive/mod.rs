//! Reactive Primitives
//!
//! This module implements the dependency-tracking engine: observable
//! containers, refs, computed values, and the effects that react to them.
//!
//! # Concepts
//!
//! ## Observables
//!
//! [`reactive`] wraps a plain container ([`Raw`]) in an [`Observed`] view.
//! Reading through the view records a dependency of the running effect;
//! writing through it notifies every effect that depends on the written key.
//! [`readonly`] produces a view that rejects writes.
//!
//! ## Refs
//!
//! A [`Ref`] is an observable box around a single value, for state that is
//! not a container.
//!
//! ## Computed values
//!
//! [`computed`] derives a cached value from other observables. It is
//! exposed as a ref and recomputes only when read after one of its sources
//! changed.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that re-runs whenever something it read
//! changes. Effects are how observable state is synchronized with the
//! outside world.
//!
//! # Implementation Notes
//!
//! The engine is single-threaded. The stack of running effects, the
//! dependency store, and the readonly lock are thread-local, so each thread
//! has its own independent reactive world.
//!
//! The dependency store is keyed by [`TargetId`], never by the observed
//! objects themselves, and holds effects only weakly, so tracking does not
//! keep anything alive. An effect is owned by its [`Effect`] handles and
//! stops when the last one is dropped.

mod collections;
mod computed;
mod context;
mod effect;
mod handlers;
mod observed;
mod raw;
mod refs;
mod runtime;
mod subscriber;
mod value;

pub use computed::{computed, writable_computed};
pub use context::{is_tracking, pause_tracking, resume_tracking, untracked, ReactiveContext};
pub use effect::{
    effect, effect_with, stop, DebuggerHook, Effect, EffectFn, EffectOptions, IntoEffectFn,
    Scheduler,
};
pub use handlers::{is_locked, lock, unlock};
pub use observed::{
    is_reactive, is_readonly, mark_non_reactive, mark_readonly, reactive, readonly, to_raw,
    Entries, Flavor, Observed, Values,
};
pub use raw::{Container, ContainerKind, Raw, TargetId};
pub use refs::{is_ref, make_ref, to_refs, Ref};
pub use runtime::{track, trigger, Runtime};
pub use subscriber::{DebuggerEvent, Operation, SubscriberId, TrackOp, TriggerInfo, TriggerOp};
pub use value::{Key, Value};
