#![forbid(unsafe_code)]

//! Error taxonomy shared by every Weft crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeftError>;

#[derive(Debug, Error)]
pub enum WeftError {
    #[error("component #{component}: cannot {operation} while {state}")]
    InvalidLifecycleState {
        component: u64,
        state: &'static str,
        operation: &'static str,
    },

    #[error("computed dependency cycle: {}", .cycle.join(" -> "))]
    CyclicComputed { cycle: Vec<String> },

    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("renderer error: {0}")]
    Render(#[from] RenderError),

    #[error("unknown component `{name}`")]
    UnknownComponent { name: String },

    #[error("unknown method `{name}`")]
    UnknownMethod { name: String },

    #[error("invalid template: {reason}")]
    InvalidTemplate { reason: String },

    #[error("updates did not settle after {rounds} flush rounds")]
    SettleLimitExceeded { rounds: usize },

    #[error("handler `{name}` failed: {message}")]
    Handler { name: String, message: String },
}

impl WeftError {
    #[must_use]
    pub fn lifecycle(component: u64, state: &'static str, operation: &'static str) -> Self {
        Self::InvalidLifecycleState {
            component,
            state,
            operation,
        }
    }

    #[must_use]
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    #[must_use]
    pub fn template(reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn handler(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error reports a misuse of a disposed or wrongly-staged node.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::InvalidLifecycleState { .. })
    }
}

/// Failure reported by a renderer primitive. Propagated unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation}: {message}")]
pub struct RenderError {
    pub operation: &'static str,
    pub message: String,
}

impl RenderError {
    #[must_use]
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_names_every_member() {
        let err = WeftError::CyclicComputed {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "computed dependency cycle: a -> b -> a");
    }

    #[test]
    fn render_error_converts() {
        let err: WeftError = RenderError::new("insert", "no such node").into();
        assert!(matches!(err, WeftError::Render(_)));
        assert_eq!(err.to_string(), "renderer error: insert: no such node");
    }

    #[test]
    fn lifecycle_helper() {
        let err = WeftError::lifecycle(7, "disposed", "set data");
        assert!(err.is_lifecycle());
        assert_eq!(err.to_string(), "component #7: cannot set data while disposed");
    }
}
