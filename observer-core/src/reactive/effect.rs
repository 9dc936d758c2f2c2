//! Effect Implementation
//!
//! An Effect is a computation whose executions are tracked and re-run when
//! the observable state they read changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazy).
//!
//! 2. When any dependency changes, the trigger runs the effect again, or
//!    hands it to the effect's scheduler if one was supplied.
//!
//! 3. Before every run, the effect removes itself from every dependency set
//!    it joined last time, then collects fresh ones during execution. This is
//!    how subscriptions from branches that are no longer taken disappear.
//!
//! # Re-entrancy
//!
//! An effect that is already on the execution stack is not run again; the
//! nested invocation is skipped and returns `None`. This keeps an effect that
//! writes to something it reads from looping forever.
//!
//! # Stopping
//!
//! [`stop`] tears down the effect's subscriptions and marks it inactive.
//! Invoking a stopped effect calls the function directly with no tracking.
//!
//! # Ownership
//!
//! Dependency sets only hold effects weakly. An effect lives as long as some
//! [`Effect`] handle to it does; dropping the last handle stops it. Keep the
//! handle for as long as the effect should keep reacting.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::Dep;
use super::subscriber::{DebuggerEvent, SubscriberId};
use super::value::Value;

/// The function an effect runs.
pub type EffectFn = Rc<dyn Fn() -> Value>;

/// Receives the effect instead of it being run synchronously.
pub type Scheduler = Rc<dyn Fn(&Effect)>;

/// Observes tracking or triggering of an effect.
pub type DebuggerHook = Rc<dyn Fn(&DebuggerEvent)>;

/// Options recognized by [`effect_with`].
///
/// The default is eager, synchronous and unprioritized.
#[derive(Clone, Default)]
pub struct EffectOptions {
    lazy: bool,
    computed: bool,
    scheduler: Option<Scheduler>,
    on_track: Option<DebuggerHook>,
    on_trigger: Option<DebuggerHook>,
    on_stop: Option<Rc<dyn Fn()>>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the immediate first run.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Run ahead of ordinary effects when triggered.
    pub fn computed(mut self, computed: bool) -> Self {
        self.computed = computed;
        self
    }

    pub fn scheduler(mut self, scheduler: impl Fn(&Effect) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    pub fn on_track(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_track = Some(Rc::new(hook));
        self
    }

    pub fn on_trigger(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_trigger = Some(Rc::new(hook));
        self
    }

    pub fn on_stop(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_stop = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("computed", &self.computed)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// Anything that can become the function of an effect.
///
/// Closures returning something convertible into [`Value`] qualify. So does
/// an existing [`Effect`]: its original function is reused, so wrapping an
/// effect never nests one effect inside another.
pub trait IntoEffectFn {
    fn into_effect_fn(self) -> EffectFn;
}

impl<F, R> IntoEffectFn for F
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
{
    fn into_effect_fn(self) -> EffectFn {
        Rc::new(move || self().into())
    }
}

impl IntoEffectFn for Effect {
    fn into_effect_fn(self) -> EffectFn {
        self.raw()
    }
}

struct EffectInner {
    id: SubscriberId,
    raw: EffectFn,
    active: Cell<bool>,
    computed: bool,
    scheduler: Option<Scheduler>,
    on_track: Option<DebuggerHook>,
    on_trigger: Option<DebuggerHook>,
    on_stop: Option<Rc<dyn Fn()>>,
    /// Dependency sets this effect is currently a member of.
    deps: RefCell<SmallVec<[Weak<Dep>; 4]>>,
    run_count: Cell<usize>,
}

impl EffectInner {
    /// Leave every dependency set joined during the previous run.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps {
            if let Some(dep) = dep.upgrade() {
                dep.remove(self.id);
            }
        }
    }

    /// Returns false if already stopped.
    fn stop(&self) -> bool {
        if !self.active.get() {
            return false;
        }
        self.cleanup();
        if let Some(on_stop) = &self.on_stop {
            on_stop();
        }
        self.active.set(false);
        true
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if self.stop() {
            trace!(effect = self.id.raw(), "dropped");
        }
    }
}

/// Handle to a reactive computation.
///
/// Clones share the same computation. Dropping the last clone stops it.
#[derive(Clone)]
pub struct Effect(Rc<EffectInner>);

/// Non-owning reference to an effect, as held by dependency sets.
#[derive(Clone)]
pub(crate) struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub(crate) fn upgrade(&self) -> Option<Effect> {
        self.0.upgrade().map(Effect)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Wrap `f` in an effect and run it once.
pub fn effect(f: impl IntoEffectFn) -> Effect {
    effect_with(f, EffectOptions::default())
}

/// Wrap `f` in an effect configured by `options`.
pub fn effect_with(f: impl IntoEffectFn, options: EffectOptions) -> Effect {
    let lazy = options.lazy;
    let effect = Effect::from_fn(f.into_effect_fn(), options);
    if !lazy {
        effect.run();
    }
    effect
}

/// Stop `effect`. Idempotent.
pub fn stop(effect: &Effect) {
    effect.stop();
}

impl Effect {
    pub(crate) fn from_fn(raw: EffectFn, options: EffectOptions) -> Self {
        Self(Rc::new(EffectInner {
            id: SubscriberId::new(),
            raw,
            active: Cell::new(true),
            computed: options.computed,
            scheduler: options.scheduler,
            on_track: options.on_track,
            on_trigger: options.on_trigger,
            on_stop: options.on_stop,
            deps: RefCell::new(SmallVec::new()),
            run_count: Cell::new(0),
        }))
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.0.id
    }

    /// The original, unwrapped function.
    pub fn raw(&self) -> EffectFn {
        Rc::clone(&self.0.raw)
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn is_computed(&self) -> bool {
        self.0.computed
    }

    /// Get the number of tracked runs.
    pub fn run_count(&self) -> usize {
        self.0.run_count.get()
    }

    /// Get the number of dependency sets this effect belongs to.
    pub fn dependency_count(&self) -> usize {
        self.0
            .deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    /// Invoke the effect.
    ///
    /// Returns `None` if the effect is already running further up the stack.
    pub fn run(&self) -> Option<Value> {
        if !self.is_active() {
            return Some((self.0.raw)());
        }
        if ReactiveContext::contains(self.id()) {
            trace!(effect = self.id().raw(), "skipping re-entrant run");
            return None;
        }

        self.cleanup();
        let _ctx = ReactiveContext::enter(self.clone());
        self.0.run_count.set(self.0.run_count.get() + 1);
        trace!(effect = self.id().raw(), "run");
        Some((self.0.raw)())
    }

    /// Tear down subscriptions and deactivate. Idempotent.
    pub fn stop(&self) {
        if self.0.stop() {
            trace!(effect = self.id().raw(), "stop");
        }
    }

    fn cleanup(&self) {
        self.0.cleanup();
    }

    pub(crate) fn downgrade(&self) -> WeakEffect {
        WeakEffect(Rc::downgrade(&self.0))
    }

    pub(crate) fn push_dep(&self, dep: &Rc<Dep>) {
        self.0.deps.borrow_mut().push(Rc::downgrade(dep));
    }

    /// The live dependency sets of this effect.
    pub(crate) fn deps(&self) -> Vec<Rc<Dep>> {
        self.0.deps.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn scheduler(&self) -> Option<Scheduler> {
        self.0.scheduler.clone()
    }

    pub(crate) fn on_track(&self) -> Option<DebuggerHook> {
        self.0.on_track.clone()
    }

    pub(crate) fn on_trigger(&self) -> Option<DebuggerHook> {
        self.0.on_trigger.clone()
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Effect {}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.0.id)
            .field("active", &self.is_active())
            .field("computed", &self.0.computed)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{reactive, ReactiveContext};
    use serde_json::json;
    use std::panic::{self, AssertUnwindSafe};

    fn counter() -> Rc<Cell<usize>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn effect_runs_on_creation() {
        let runs = counter();
        let c = runs.clone();

        let _effect = effect(move || c.set(c.get() + 1));

        // Effect should have run once on creation
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let runs = counter();
        let c = runs.clone();

        let effect = effect_with(move || c.set(c.get() + 1), EffectOptions::new().lazy(true));

        assert_eq!(runs.get(), 0);
        assert_eq!(effect.run_count(), 0);

        // Manually run
        effect.run();
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn run_returns_function_result() {
        let effect = effect_with(|| 21 * 2, EffectOptions::new().lazy(true));
        assert_eq!(effect.run(), Some(Value::from(42)));
    }

    #[test]
    fn reentrant_run_is_skipped() {
        let state = reactive(json!({ "n": 0 })).into_observed().unwrap();
        let runs = counter();

        let s = state.clone();
        let c = runs.clone();
        let _effect = effect(move || {
            c.set(c.get() + 1);
            let n = s.get("n").as_i64().unwrap();
            s.set("n", n + 1);
        });

        // The write inside the run does not re-enter it.
        assert_eq!(runs.get(), 1);
        assert_eq!(state.get("n"), Value::from(1));

        state.set("n", 10);
        assert_eq!(runs.get(), 2);
        assert_eq!(state.get("n"), Value::from(11));
    }

    #[test]
    fn stopped_effect_is_a_pass_through() {
        let state = reactive(json!({ "a": 1 })).into_observed().unwrap();
        let runs = counter();

        let s = state.clone();
        let c = runs.clone();
        let effect = effect(move || {
            c.set(c.get() + 1);
            s.get("a")
        });
        assert_eq!(effect.dependency_count(), 1);

        stop(&effect);
        assert!(!effect.is_active());
        assert_eq!(effect.dependency_count(), 0);

        state.set("a", 2);
        assert_eq!(runs.get(), 1);

        // Direct invocation still calls through, without subscribing.
        assert_eq!(effect.run(), Some(Value::from(2)));
        assert_eq!(runs.get(), 2);
        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn stop_is_idempotent_and_calls_hook_once() {
        let stops = counter();
        let c = stops.clone();
        let effect = effect_with(|| (), EffectOptions::new().on_stop(move || c.set(c.get() + 1)));

        effect.stop();
        effect.stop();
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn dropping_the_last_handle_stops_the_effect() {
        let state = reactive(json!({ "a": 1 })).into_observed().unwrap();
        let runs = counter();
        let stops = counter();

        let s = state.clone();
        let c = runs.clone();
        let st = stops.clone();
        let handle = effect_with(
            move || {
                c.set(c.get() + 1);
                s.get("a")
            },
            EffectOptions::new().on_stop(move || st.set(st.get() + 1)),
        );

        // A clone keeps it alive.
        let kept = handle.clone();
        drop(handle);
        state.set("a", 2);
        assert_eq!(runs.get(), 2);

        drop(kept);
        assert_eq!(stops.get(), 1);
        state.set("a", 3);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn wrapping_an_effect_reuses_its_function() {
        let runs = counter();
        let c = runs.clone();
        let first = effect(move || c.set(c.get() + 1));
        let second = effect(first.clone());

        assert_ne!(first, second);
        assert!(Rc::ptr_eq(&first.raw(), &second.raw()));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn panicking_run_unwinds_the_stack() {
        let effect = effect_with(
            || -> Value { panic!("boom") },
            EffectOptions::new().lazy(true),
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| effect.run()));
        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());

        // The effect is not stuck as "running".
        let ok = effect_with(|| 1, EffectOptions::new().lazy(true));
        assert_eq!(ok.run(), Some(Value::from(1)));
    }

    #[test]
    fn conditional_branches_drop_stale_subscriptions() {
        let state = reactive(json!({ "flag": true, "a": 1, "b": 2 }))
            .into_observed()
            .unwrap();
        let runs = counter();

        let s = state.clone();
        let c = runs.clone();
        let _effect = effect(move || {
            c.set(c.get() + 1);
            if s.get("flag") == Value::from(true) {
                s.get("a")
            } else {
                s.get("b")
            }
        });

        state.set("flag", false);
        assert_eq!(runs.get(), 2);

        // "a" is no longer read.
        state.set("a", 10);
        assert_eq!(runs.get(), 2);

        state.set("b", 20);
        assert_eq!(runs.get(), 3);
    }
}
