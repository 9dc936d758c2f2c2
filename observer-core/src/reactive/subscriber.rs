//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on observable state. Each one
//! gets a [`SubscriberId`]; dependency sets are keyed by it so a computation
//! appears at most once per set.
//!
//! This module also defines the operation vocabulary shared by the tracker
//! and the trigger, and the [`DebuggerEvent`] handed to `on_track` and
//! `on_trigger` hooks.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::effect::Effect;
use super::raw::{Raw, TargetId};
use super::value::{Key, Value};

/// Unique identifier for a subscriber.
///
/// Each subscriber (effect, computed, or other reactive computation) gets a
/// unique ID when created. This ID is used to track dependencies and avoid
/// duplicate subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A read that establishes a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// A mutation that notifies dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

impl TriggerOp {
    /// Capitalized name, as used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            TriggerOp::Set => "Set",
            TriggerOp::Add => "Add",
            TriggerOp::Delete => "Delete",
            TriggerOp::Clear => "Clear",
        }
    }
}

impl fmt::Display for TrackOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrackOp::Get => "get",
            TrackOp::Has => "has",
            TrackOp::Iterate => "iterate",
        })
    }
}

impl fmt::Display for TriggerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerOp::Set => "set",
            TriggerOp::Add => "add",
            TriggerOp::Delete => "delete",
            TriggerOp::Clear => "clear",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Operation {
    Track(TrackOp),
    Trigger(TriggerOp),
}

/// Extra detail carried by a trigger.
#[derive(Debug, Clone, Default)]
pub struct TriggerInfo {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    /// Shallow copy of a collection taken before it was cleared.
    pub old_target: Option<Raw>,
}

impl TriggerInfo {
    pub(crate) fn write(old_value: Value, new_value: Value) -> Self {
        Self {
            old_value: Some(old_value),
            new_value: Some(new_value),
            old_target: None,
        }
    }

    pub(crate) fn removed(old_value: Value) -> Self {
        Self {
            old_value: Some(old_value),
            ..Self::default()
        }
    }

    pub(crate) fn added(new_value: Value) -> Self {
        Self {
            new_value: Some(new_value),
            ..Self::default()
        }
    }

    pub(crate) fn cleared(old_target: Raw) -> Self {
        Self {
            old_target: Some(old_target),
            ..Self::default()
        }
    }
}

/// What an `on_track` or `on_trigger` hook sees.
#[derive(Debug, Clone)]
pub struct DebuggerEvent {
    pub effect: Effect,
    pub target: TargetId,
    pub operation: Operation,
    pub key: Option<Key>,
    pub info: Option<TriggerInfo>,
}
