use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of an asynchronous task.
///
/// Transitions are monotonic except for the retry loop:
/// `Pending → Started → {Success, Failure}` with `Retry → Started` cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Success,
    Failure,
    Retry,
}

impl TaskStatus {
    /// A task in a terminal status has a result or error attached and will
    /// never transition again.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Retry => "RETRY",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_only_in_terminal_states() {
        assert!(!TaskStatus::Pending.is_ready());
        assert!(!TaskStatus::Started.is_ready());
        assert!(!TaskStatus::Retry.is_ready());
        assert!(TaskStatus::Success.is_ready());
        assert!(TaskStatus::Failure.is_ready());
    }

    #[test]
    fn serializes_uppercase() {
        assert_eq!(serde_json::to_string(&TaskStatus::Pending).unwrap(), "\"PENDING\"");
    }
}
