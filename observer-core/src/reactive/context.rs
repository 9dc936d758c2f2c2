//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when an observable is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing effects.
//! When an effect runs, it pushes itself onto the stack through a guard; the
//! guard pops it again when dropped. Because the pop lives in `Drop`, the
//! stack stays balanced even when the computation panics.
//!
//! This design supports nested contexts (e.g., a computed value that reads
//! from another computed value). Reads are attributed to the innermost one.
//!
//! A second thread-local flag suspends tracking altogether, for callers that
//! need to read observables without subscribing.

use std::cell::{Cell, RefCell};

use super::effect::Effect;
use super::SubscriberId;

thread_local! {
    static EFFECT_STACK: RefCell<Vec<Effect>> = const { RefCell::new(Vec::new()) };
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given effect.
    ///
    /// While this context is active, any observable that is read will
    /// register the effect as a dependent.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub fn enter(effect: Effect) -> Self {
        let subscriber_id = effect.id();
        EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect));
        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        EFFECT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The innermost running effect, if any.
    pub fn current() -> Option<Effect> {
        EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        EFFECT_STACK.with(|stack| stack.borrow().last().map(Effect::id))
    }

    /// Whether the given effect is anywhere on the stack.
    pub fn contains(subscriber_id: SubscriberId) -> bool {
        EFFECT_STACK.with(|stack| stack.borrow().iter().any(|e| e.id() == subscriber_id))
    }

    pub fn depth() -> usize {
        EFFECT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = EFFECT_STACK
            .try_with(|stack| stack.borrow_mut().pop())
            .ok()
            .flatten();

        // Verify we're popping the right context.
        // This helps catch bugs where contexts are mismatched.
        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.id(),
                self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id,
                effect.id()
            );
        }
    }
}

/// Stop recording dependencies until [`resume_tracking`] is called.
pub fn pause_tracking() {
    SHOULD_TRACK.with(|flag| flag.set(false));
}

/// Resume recording dependencies.
pub fn resume_tracking() {
    SHOULD_TRACK.with(|flag| flag.set(true));
}

pub(crate) fn should_track() -> bool {
    SHOULD_TRACK.with(Cell::get)
}

/// Whether a read right now would be recorded.
pub fn is_tracking() -> bool {
    should_track() && ReactiveContext::is_active()
}

/// Restores the previous tracking flag on drop.
struct TrackingGuard {
    previous: bool,
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        let _ = SHOULD_TRACK.try_with(|flag| flag.set(self.previous));
    }
}

/// Run `f` without recording any dependencies.
///
/// Unlike a bare pause/resume pair this restores whatever state was in effect
/// before, so it nests, and it restores it even if `f` panics.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TrackingGuard {
        previous: SHOULD_TRACK.with(|flag| flag.replace(false)),
    };
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect_with, EffectOptions};

    fn lazy_effect() -> Effect {
        effect_with(|| (), EffectOptions::new().lazy(true))
    }

    #[test]
    fn context_tracks_subscriber() {
        let effect = lazy_effect();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(effect.clone());

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(effect.id()));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn nested_contexts() {
        let outer = lazy_effect();
        let inner = lazy_effect();

        {
            let _ctx1 = ReactiveContext::enter(outer.clone());
            assert_eq!(ReactiveContext::current_subscriber(), Some(outer.id()));

            {
                let _ctx2 = ReactiveContext::enter(inner.clone());
                assert_eq!(ReactiveContext::current_subscriber(), Some(inner.id()));
                assert!(ReactiveContext::contains(outer.id()));
                assert_eq!(ReactiveContext::depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(outer.id()));
            assert!(!ReactiveContext::contains(inner.id()));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untracked_restores_previous_state() {
        let effect = lazy_effect();
        let _ctx = ReactiveContext::enter(effect);
        assert!(is_tracking());

        untracked(|| {
            assert!(!is_tracking());
            untracked(|| assert!(!is_tracking()));
            assert!(!is_tracking());
        });
        assert!(is_tracking());

        pause_tracking();
        assert!(!is_tracking());
        resume_tracking();
        assert!(is_tracking());
    }
}
