//! Observer Core
//!
//! This crate provides a fine-grained reactive dependency-tracking engine.
//! It implements:
//!
//! - Observable wrappers over records, sequences, sets and maps
//! - Single-value refs and cached computed values
//! - Effects that re-run exactly when what they read changes
//!
//! Rendering layers consume it through two narrow interfaces: "make this
//! value observable" and "run this computation again when its inputs change".
//!
//! # Architecture
//!
//! - `reactive`: the engine (value model, dependency store, effects,
//!   observable wrappers, refs, computed values)
//! - `error`: the error type returned by fallible operations
//!
//! Non-fatal problems (wrapping a primitive, writing to a readonly view) are
//! reported through `tracing` at `warn` level. Track and trigger activity is
//! emitted at `trace` level.
//!
//! # Example
//!
//! ```rust,ignore
//! use observer_core::{computed, effect, reactive};
//! use serde_json::json;
//!
//! // Wrap some state
//! let state = reactive(json!({ "count": 1 })).into_observed().unwrap();
//!
//! // Derive a value from it
//! let s = state.clone();
//! let doubled = computed(move || s.get("count").as_f64().unwrap_or(0.0) * 2.0);
//!
//! // React to changes; the effect lives as long as its handle
//! let s = state.clone();
//! let _watcher = effect(move || {
//!     println!("count: {}, doubled: {}", s.get("count"), doubled.value());
//! });
//!
//! // Update the state
//! state.set("count", 5);
//! // Effect automatically runs, prints: "count: 5, doubled: 10"
//! ```

pub mod error;
pub mod reactive;

pub use error::ReactiveError;
pub use reactive::{
    computed, effect, effect_with, is_reactive, is_readonly, is_ref, lock, make_ref,
    mark_non_reactive, mark_readonly, pause_tracking, reactive, readonly, resume_tracking, stop,
    to_raw, to_refs, unlock, untracked, writable_computed, Effect, EffectOptions, Key, Observed,
    Raw, Ref, Value,
};
