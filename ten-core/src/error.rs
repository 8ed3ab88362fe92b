//! Error taxonomy shared by every layer of the runtime.

use crate::lifecycle::ExtensionState;
use crate::msg::MsgKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable, copyable classification of a [`TenError`].
///
/// Handlers that only need to branch on the kind of failure (and tests
/// that record failures across threads) use this instead of the error
/// value itself, which is not `Clone`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No reachable destination for an envelope.
    NoDestination,
    /// A lifecycle signal or delivery arrived in the wrong state.
    InvalidStateTransition,
    /// A property path that holds no value.
    UnresolvedProperty,
    /// A property holds a value of another type.
    TypeMismatch,
    /// A result broke the single/multi result contract.
    CorrelationProtocolViolation,
    /// The owning slot was torn down.
    ContextDestroyed,
    /// User code panicked.
    ExtensionFault,
    /// The target slot is not accepting messages.
    TargetNotReady,
    /// A malformed argument or graph.
    InvalidArgument,
    /// Malformed JSON.
    InvalidJson,
    /// Anything else.
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::NoDestination => "no_destination",
            ErrorCode::InvalidStateTransition => "invalid_state_transition",
            ErrorCode::UnresolvedProperty => "unresolved_property",
            ErrorCode::TypeMismatch => "type_mismatch",
            ErrorCode::CorrelationProtocolViolation => "correlation_protocol_violation",
            ErrorCode::ContextDestroyed => "context_destroyed",
            ErrorCode::ExtensionFault => "extension_fault",
            ErrorCode::TargetNotReady => "target_not_ready",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::InvalidJson => "invalid_json",
            ErrorCode::Generic => "generic",
        };
        f.write_str(s)
    }
}

/// Errors produced by the runtime.
///
/// Some of these are recoverable and travel back to the caller through
/// the same channel a success would have used (result handler, error
/// handler, `Result` of a property getter). The rest mean an invariant
/// is broken for the extension concerned and are escalated to the fault
/// policy. See [`TenError::is_recoverable`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TenError {
    /// Routing found no destination for the envelope.
    #[error("failed to find destination of a '{kind}' message '{name}'")]
    NoDestination {
        /// Kind of the envelope.
        kind: MsgKind,
        /// Name of the envelope.
        name: String,
    },

    /// A message was delivered outside `Started`, or a `*_done` signal
    /// arrived while the slot was not waiting for it.
    #[error("invalid state transition in '{extension}': {detail}")]
    InvalidStateTransition {
        /// Extension whose state machine was violated.
        extension: String,
        /// What happened.
        detail: String,
    },

    /// Get on a property path with no value and no declared default.
    #[error("property not found: {0}")]
    UnresolvedProperty(String),

    /// The property exists but holds a value of another type.
    #[error("property '{path}' is not of type {expected}")]
    TypeMismatch {
        /// The property path.
        path: String,
        /// The type the caller asked for.
        expected: &'static str,
    },

    /// A result broke the correlation contract: a non-final result for
    /// a single-result command, or any result after the final one.
    #[error("correlation protocol violation for cmd {cmd_id}: {detail}")]
    CorrelationProtocolViolation {
        /// Correlation id of the command.
        cmd_id: String,
        /// What happened.
        detail: String,
    },

    /// The slot owning a pending correlation was torn down.
    #[error("context of extension '{extension}' was destroyed")]
    ContextDestroyed {
        /// Extension that was torn down.
        extension: String,
    },

    /// User code panicked inside a callback.
    #[error("extension '{extension}' faulted: {detail}")]
    ExtensionFault {
        /// Extension that faulted.
        extension: String,
        /// Panic payload or other diagnostic.
        detail: String,
    },

    /// The target slot exists but is not in `Started`.
    #[error("extension '{extension}' is not accepting messages in state {state}")]
    TargetNotReady {
        /// Target extension.
        extension: String,
        /// Its state at routing time.
        state: ExtensionState,
    },

    /// Malformed argument, path, graph or buffer usage.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON that failed to parse or did not fit the expected shape.
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TenError {
    /// The classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            TenError::NoDestination { .. } => ErrorCode::NoDestination,
            TenError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            TenError::UnresolvedProperty(_) => ErrorCode::UnresolvedProperty,
            TenError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            TenError::CorrelationProtocolViolation { .. } => {
                ErrorCode::CorrelationProtocolViolation
            }
            TenError::ContextDestroyed { .. } => ErrorCode::ContextDestroyed,
            TenError::ExtensionFault { .. } => ErrorCode::ExtensionFault,
            TenError::TargetNotReady { .. } => ErrorCode::TargetNotReady,
            TenError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            TenError::InvalidJson(_) => ErrorCode::InvalidJson,
            TenError::Other(_) => ErrorCode::Generic,
        }
    }

    /// Whether the caller may handle this error locally.
    ///
    /// `InvalidStateTransition`, `CorrelationProtocolViolation` and
    /// `ExtensionFault` are not: they are escalated to the fault policy.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            TenError::InvalidStateTransition { .. }
                | TenError::CorrelationProtocolViolation { .. }
                | TenError::ExtensionFault { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability_follows_taxonomy() {
        let recoverable = [
            TenError::NoDestination {
                kind: MsgKind::Cmd,
                name: "x".into(),
            },
            TenError::UnresolvedProperty("a.b".into()),
            TenError::ContextDestroyed {
                extension: "e".into(),
            },
            TenError::TargetNotReady {
                extension: "e".into(),
                state: ExtensionState::Starting,
            },
        ];
        for err in &recoverable {
            assert!(err.is_recoverable(), "{err} should be recoverable");
        }

        let fatal = [
            TenError::InvalidStateTransition {
                extension: "e".into(),
                detail: "twice".into(),
            },
            TenError::CorrelationProtocolViolation {
                cmd_id: "1".into(),
                detail: "after final".into(),
            },
            TenError::ExtensionFault {
                extension: "e".into(),
                detail: "boom".into(),
            },
        ];
        for err in &fatal {
            assert!(!err.is_recoverable(), "{err} should be fatal");
        }
    }

    #[test]
    fn no_destination_message_names_kind_and_name() {
        let err = TenError::NoDestination {
            kind: MsgKind::Cmd,
            name: "unconnected_cmd".into(),
        };
        assert_eq!(err.code(), ErrorCode::NoDestination);
        assert_eq!(
            err.to_string(),
            "failed to find destination of a 'cmd' message 'unconnected_cmd'"
        );
    }
}
