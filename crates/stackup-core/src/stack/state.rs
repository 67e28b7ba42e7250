//! Remote stack state as reported by the gateway
//!
//! Raw statuses follow the CloudFormation vocabulary
//! (`CREATE_COMPLETE`, `UPDATE_ROLLBACK_IN_PROGRESS`, ...). They are
//! classified twice: into `RemoteStackState` for the lifecycle decision,
//! and into a `StatusPhase` while polling an issued operation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the controller needs to know about a stack before acting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStackState {
    Absent,
    Exists,
    InProgress,
    /// Stack exists but is unusable; `reason` is the remote text verbatim
    Failed { reason: String },
}

impl fmt::Display for RemoteStackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStackState::Absent => write!(f, "ABSENT"),
            RemoteStackState::Exists => write!(f, "EXISTS"),
            RemoteStackState::InProgress => write!(f, "IN_PROGRESS"),
            RemoteStackState::Failed { .. } => write!(f, "FAILED"),
        }
    }
}

/// Progress of an issued create/update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPhase {
    InProgress,
    Succeeded,
    Failed,
}

/// A raw remote status with its optional reason text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StackStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            reason: None,
        }
    }

    pub fn with_reason(status: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            reason: Some(reason.into()),
        }
    }

    fn reason_or_status(&self) -> String {
        self.reason.clone().unwrap_or_else(|| self.status.clone())
    }

    /// Lifecycle classification of a described stack
    pub fn classify(&self) -> RemoteStackState {
        let s = self.status.as_str();
        if s == "DELETE_COMPLETE" {
            RemoteStackState::Absent
        } else if s.ends_with("_IN_PROGRESS") {
            RemoteStackState::InProgress
        } else if s.ends_with("_FAILED") || s == "ROLLBACK_COMPLETE" {
            RemoteStackState::Failed {
                reason: self.reason_or_status(),
            }
        } else if s.ends_with("_COMPLETE") {
            // includes UPDATE_ROLLBACK_COMPLETE: the stack is usable again
            RemoteStackState::Exists
        } else {
            tracing::warn!(status = s, "Unrecognized stack status, treating as in progress");
            RemoteStackState::InProgress
        }
    }

    /// Phase of an issued create/update
    pub fn phase(&self) -> StatusPhase {
        let s = self.status.as_str();
        if s.ends_with("_IN_PROGRESS") {
            StatusPhase::InProgress
        } else if matches!(s, "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE") {
            StatusPhase::Succeeded
        } else if s.ends_with("_FAILED") || s.ends_with("ROLLBACK_COMPLETE") || s == "DELETE_COMPLETE" {
            StatusPhase::Failed
        } else {
            StatusPhase::InProgress
        }
    }

    /// Failure text for a terminal failure
    pub fn failure_reason(&self) -> String {
        self.reason_or_status()
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({})", self.status, reason),
            None => write!(f, "{}", self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(StackStatus::new("CREATE_COMPLETE").classify(), RemoteStackState::Exists);
        assert_eq!(StackStatus::new("UPDATE_COMPLETE").classify(), RemoteStackState::Exists);
        assert_eq!(
            StackStatus::new("UPDATE_ROLLBACK_COMPLETE").classify(),
            RemoteStackState::Exists
        );
        assert_eq!(
            StackStatus::new("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS").classify(),
            RemoteStackState::InProgress
        );
        assert_eq!(StackStatus::new("DELETE_COMPLETE").classify(), RemoteStackState::Absent);
        assert_eq!(
            StackStatus::with_reason("ROLLBACK_COMPLETE", "Bucket already exists").classify(),
            RemoteStackState::Failed {
                reason: "Bucket already exists".into()
            }
        );
        assert!(matches!(
            StackStatus::new("CREATE_FAILED").classify(),
            RemoteStackState::Failed { .. }
        ));
    }

    #[test]
    fn test_phase() {
        assert_eq!(StackStatus::new("CREATE_IN_PROGRESS").phase(), StatusPhase::InProgress);
        assert_eq!(StackStatus::new("UPDATE_COMPLETE").phase(), StatusPhase::Succeeded);
        assert_eq!(StackStatus::new("ROLLBACK_COMPLETE").phase(), StatusPhase::Failed);
        assert_eq!(StackStatus::new("UPDATE_ROLLBACK_COMPLETE").phase(), StatusPhase::Failed);
        assert_eq!(StackStatus::new("CREATE_FAILED").phase(), StatusPhase::Failed);
    }

    #[test]
    fn test_display() {
        assert_eq!(RemoteStackState::InProgress.to_string(), "IN_PROGRESS");
        assert_eq!(
            StackStatus::with_reason("CREATE_FAILED", "quota").to_string(),
            "CREATE_FAILED (quota)"
        );
    }
}
