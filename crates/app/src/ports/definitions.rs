//! Definition reader port — read-only access to an automation's child records.

use std::future::Future;

use cadence_domain::definition::{ActionDefinition, AutomationAction, Condition, ConditionGroup, Target};
use cadence_domain::error::CadenceError;
use cadence_domain::id::{ActionId, AutomationId, ConditionGroupId};

/// Reads the records that make up an automation snapshot.
pub trait DefinitionReader {
    fn condition_groups(
        &self,
        automation_id: AutomationId,
    ) -> impl Future<Output = Result<Vec<ConditionGroup>, CadenceError>> + Send;

    /// Conditions belonging to any of `group_ids`.
    fn conditions(
        &self,
        group_ids: &[ConditionGroupId],
    ) -> impl Future<Output = Result<Vec<Condition>, CadenceError>> + Send;

    /// Action links ordered by `sort_order`.
    fn automation_actions(
        &self,
        automation_id: AutomationId,
    ) -> impl Future<Output = Result<Vec<AutomationAction>, CadenceError>> + Send;

    fn action_definitions(
        &self,
        ids: &[ActionId],
    ) -> impl Future<Output = Result<Vec<ActionDefinition>, CadenceError>> + Send;

    fn targets(
        &self,
        automation_id: AutomationId,
    ) -> impl Future<Output = Result<Vec<Target>, CadenceError>> + Send;
}
