//! Definitions — read-only child records of an automation.
//!
//! These rows are owned by the administrative surface. The execution path
//! only reads them to assemble an [`AutomationSnapshot`](crate::snapshot::AutomationSnapshot);
//! conditions are forwarded as opaque data and never evaluated here.

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, ValidationError};
use crate::id::{ActionId, AutomationActionId, AutomationId, ConditionGroupId, ConditionId, TargetId};

/// A named group of conditions combined with a logical operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub id: ConditionGroupId,
    pub automation_id: AutomationId,
    /// How the group's conditions combine, e.g. `"AND"` or `"OR"`.
    pub logic: String,
    pub sort_order: i32,
}

/// One condition inside a [`ConditionGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    pub group_id: ConditionGroupId,
    pub data: serde_json::Value,
}

/// Link between an automation and an [`ActionDefinition`], with per-link parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationAction {
    pub id: AutomationActionId,
    pub automation_id: AutomationId,
    pub action_id: ActionId,
    /// Actions run in ascending order.
    pub sort_order: i32,
    pub params: serde_json::Value,
}

/// An external endpoint that performs an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: ActionId,
    pub name: String,
    pub invoke_url: String,
}

impl ActionDefinition {
    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] when the name or URL is empty.
    pub fn validate(&self) -> Result<(), CadenceError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.invoke_url.trim().is_empty() {
            return Err(ValidationError::EmptyInvokeUrl.into());
        }
        Ok(())
    }
}

/// Something an automation acts upon (a device, a user group, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub automation_id: AutomationId,
    pub target_type: String,
    pub target_ref: String,
}
