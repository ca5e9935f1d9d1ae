//! Automation snapshot — the point-in-time aggregate posted to action endpoints.

use serde::{Deserialize, Serialize};

use crate::automation::Automation;
use crate::definition::{AutomationAction, Condition, ConditionGroup, Target};

/// An [`AutomationAction`] link resolved against its action definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAction {
    #[serde(flatten)]
    pub link: AutomationAction,
    pub name: String,
    pub invoke_url: String,
}

/// Automation plus every child record needed to execute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationSnapshot {
    pub automation: Automation,
    pub condition_groups: Vec<ConditionGroup>,
    pub conditions: Vec<Condition>,
    /// Sorted by `sort_order`.
    pub actions: Vec<SnapshotAction>,
    pub targets: Vec<Target>,
}

impl AutomationSnapshot {
    /// Serialize to the JSON body sent to endpoints and stored on the log.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; this only happens if a condition
    /// payload holds a non-string map key.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
