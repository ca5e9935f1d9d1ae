//! Automation status — the claim lifecycle of a scheduled task.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where an automation sits in the claim → dispatch → commit cycle.
///
/// ```text
/// PENDING ──claim──▶ LOCKED ──publish ok + commit──▶ PENDING (next run)
///                       │                          └▶ COMPLETE (once)
///                       └─publish failed: stays LOCKED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutomationStatus {
    #[default]
    Pending,
    Locked,
    Processing,
    Complete,
}

impl AutomationStatus {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Locked => "LOCKED",
            Self::Processing => "PROCESSING",
            Self::Complete => "COMPLETE",
        }
    }
}

impl std::fmt::Display for AutomationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown automation status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AutomationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "LOCKED" => Ok(Self::Locked),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETE" => Ok(Self::Complete),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
