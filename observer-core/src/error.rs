//! Errors raised by the observable layer.
//!
//! Most mutating operations have two forms. The plain form logs the error at
//! `warn` level and returns a neutral result; the `try_` form hands the error
//! back to the caller.

use thiserror::Error;

use crate::reactive::{ContainerKind, TriggerOp};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error("value cannot be made reactive: {value}")]
    NotObservable { value: String },

    #[error("{} operation {}failed: target is readonly.", .op.label(), key_clause(.key))]
    Readonly { op: TriggerOp, key: Option<String> },

    #[error("Write operation failed: computed value is readonly")]
    ReadonlyComputed,

    #[error("'{op}' is not supported on a {kind}")]
    Unsupported { op: &'static str, kind: ContainerKind },

    #[error("Invalid sequence length: {value}")]
    InvalidLength { value: String },
}

fn key_clause(key: &Option<String>) -> String {
    match key {
        Some(key) => format!("on key \"{key}\" "),
        None => String::new(),
    }
}

impl ReactiveError {
    pub(crate) fn readonly(op: TriggerOp, key: Option<&crate::reactive::Key>) -> Self {
        ReactiveError::Readonly {
            op,
            key: key.map(ToString::to_string),
        }
    }
}
