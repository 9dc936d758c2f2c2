//! Computed Values
//!
//! A computed value is a [`Ref`] backed by a lazy effect. It is cached and
//! pull-based: a change to one of its sources only marks it dirty, and the
//! getter runs again the next time someone reads it.
//!
//! # How It Works
//!
//! 1. The backing effect is created lazy and priority-marked. Its scheduler
//!    just sets the dirty flag, so triggers never run the getter directly.
//!
//! 2. Reading the value recomputes if dirty, then subscribes the reader to
//!    every dependency set the backing effect belongs to. A reader of a
//!    computed therefore depends on the computed's own sources, through any
//!    depth of chained computeds.
//!
//! 3. Because computed effects run ahead of ordinary ones on a trigger, the
//!    flag is already set by the time an ordinary effect reads the value.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::effect::{effect_with, Effect, EffectOptions};
use super::refs::{Ref, RefSource};
use super::runtime::track_child_run;
use super::value::Value;
use crate::error::ReactiveError;

pub(crate) struct ComputedState {
    effect: Effect,
    dirty: Rc<Cell<bool>>,
    value: RefCell<Value>,
    setter: Option<Rc<dyn Fn(Value)>>,
}

/// A read-only computed value. Writing to it logs a warning.
pub fn computed<F, R>(getter: F) -> Ref
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
{
    build(getter, None)
}

/// A computed value whose writes are handed to `setter`.
pub fn writable_computed<F, R, S>(getter: F, setter: S) -> Ref
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
    S: Fn(Value) + 'static,
{
    build(getter, Some(Rc::new(setter)))
}

fn build<F, R>(getter: F, setter: Option<Rc<dyn Fn(Value)>>) -> Ref
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
{
    let dirty = Rc::new(Cell::new(true));
    let flag = Rc::clone(&dirty);
    let effect = effect_with(
        getter,
        EffectOptions::new()
            .lazy(true)
            .computed(true)
            .scheduler(move |_| flag.set(true)),
    );
    Ref::from_source(RefSource::Computed(ComputedState {
        effect,
        dirty,
        value: RefCell::new(Value::Null),
        setter,
    }))
}

impl ComputedState {
    pub(crate) fn effect(&self) -> &Effect {
        &self.effect
    }

    /// The current value, recomputed first if dirty. Tracks nothing.
    pub(crate) fn evaluate(&self) -> Value {
        if self.dirty.get() {
            // `None` means this computed is already evaluating further up the
            // stack; the cached value stands.
            if let Some(fresh) = self.effect.run() {
                let stale = self.value.replace(fresh);
                drop(stale);
            }
            self.dirty.set(false);
        }
        self.value.borrow().clone()
    }

    /// The current value, subscribing the running effect to its sources.
    pub(crate) fn read(&self) -> Value {
        let value = self.evaluate();
        track_child_run(&self.effect);
        value
    }

    pub(crate) fn write(&self, value: Value) -> Result<(), ReactiveError> {
        match &self.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactiveError::ReadonlyComputed),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
