//! Control-flow signals threaded through argument casting and running.
//!
//! A [`Signal`] is an ordinary return value, never a panic or an error.
//! Every consumer matches on it exhaustively; the argument runner
//! short-circuits the whole run on the first signal it sees.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A control-flow outcome produced while processing arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// Abort the current command execution. No further arguments are
    /// processed and no side effects should follow.
    Cancel,
    /// Restart dispatch with different raw input. Produced by prompt
    /// breakout when a reply looks like another command invocation.
    Retry {
        /// The replacement raw input to dispatch.
        input: String,
    },
    /// Casting failed. Carries an optional diagnostic payload for the
    /// caller (never shown to the user directly).
    Fail {
        /// Diagnostic payload attached by the failing caster.
        reason: Option<Value>,
    },
    /// Hand off execution to a different command.
    Continue {
        /// Identifier of the command to run instead.
        command: String,
    },
}

impl Signal {
    /// Create a failure signal without a payload.
    pub fn fail() -> Self {
        Signal::Fail { reason: None }
    }

    /// Create a failure signal carrying a diagnostic payload.
    pub fn fail_with(reason: impl Into<Value>) -> Self {
        Signal::Fail {
            reason: Some(reason.into()),
        }
    }

    /// Create a retry signal carrying the replacement input.
    pub fn retry(input: impl Into<String>) -> Self {
        Signal::Retry {
            input: input.into(),
        }
    }

    /// Create a continue signal naming the command to hand off to.
    pub fn continue_with(command: impl Into<String>) -> Self {
        Signal::Continue {
            command: command.into(),
        }
    }

    /// Whether this signal aborts command execution.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Signal::Cancel)
    }

    /// Whether this signal is a casting failure.
    pub fn is_fail(&self) -> bool {
        matches!(self, Signal::Fail { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_with_carries_payload() {
        let sig = Signal::fail_with("not a number");
        match sig {
            Signal::Fail { reason: Some(v) } => assert_eq!(v, "not a number"),
            other => panic!("expected Fail with payload, got {other:?}"),
        }
    }

    #[test]
    fn predicates_match_variants() {
        assert!(Signal::Cancel.is_cancel());
        assert!(!Signal::Cancel.is_fail());
        assert!(Signal::fail().is_fail());
        assert!(!Signal::retry("!help").is_cancel());
    }

    #[test]
    fn wire_form_is_snake_case_tagged() {
        let json = serde_json::to_value(Signal::retry("!roll 2d6")).unwrap();
        assert_eq!(json["type"], "retry");
        assert_eq!(json["input"], "!roll 2d6");
    }
}
