//! Snapshot loader — assembles an [`AutomationSnapshot`] from the stores.

use std::collections::HashMap;

use cadence_domain::automation::Automation;
use cadence_domain::definition::ActionDefinition;
use cadence_domain::error::{CadenceError, NotFoundError};
use cadence_domain::id::{ActionId, AutomationId, ConditionGroupId};
use cadence_domain::snapshot::{AutomationSnapshot, SnapshotAction};

use crate::ports::{ClaimStore, DefinitionReader};

/// Reads an automation and everything attached to it.
pub struct SnapshotLoader<S, D> {
    store: S,
    definitions: D,
}

impl<S, D> SnapshotLoader<S, D>
where
    S: ClaimStore,
    D: DefinitionReader,
{
    pub fn new(store: S, definitions: D) -> Self {
        Self { store, definitions }
    }

    /// Current state of an automation.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    pub async fn automation(&self, id: AutomationId) -> Result<Option<Automation>, CadenceError> {
        self.store.get_by_id(id).await
    }

    /// Load the child records of `automation` into a snapshot.
    ///
    /// Actions keep the order of their links (`sort_order`).
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::NotFound`] when a link points at an action
    /// definition that does not exist, or a storage error from the readers.
    #[tracing::instrument(skip(self, automation), fields(automation_id = %automation.id))]
    pub async fn snapshot(&self, automation: Automation) -> Result<AutomationSnapshot, CadenceError> {
        let condition_groups = self.definitions.condition_groups(automation.id).await?;
        let group_ids: Vec<ConditionGroupId> = condition_groups.iter().map(|g| g.id).collect();
        let conditions = if group_ids.is_empty() {
            Vec::new()
        } else {
            self.definitions.conditions(&group_ids).await?
        };

        let mut links = self.definitions.automation_actions(automation.id).await?;
        links.sort_by_key(|link| link.sort_order);
        let action_ids: Vec<ActionId> = links.iter().map(|link| link.action_id).collect();
        let definitions: HashMap<ActionId, ActionDefinition> = if action_ids.is_empty() {
            HashMap::new()
        } else {
            self.definitions
                .action_definitions(&action_ids)
                .await?
                .into_iter()
                .map(|definition| (definition.id, definition))
                .collect()
        };

        let mut actions = Vec::with_capacity(links.len());
        for link in links {
            let definition = definitions
                .get(&link.action_id)
                .ok_or_else(|| NotFoundError {
                    entity: "ActionDefinition",
                    id: link.action_id.to_string(),
                })?;
            actions.push(SnapshotAction {
                name: definition.name.clone(),
                invoke_url: definition.invoke_url.clone(),
                link,
            });
        }

        let targets = self.definitions.targets(automation.id).await?;

        Ok(AutomationSnapshot {
            automation,
            condition_groups,
            conditions,
            actions,
            targets,
        })
    }
}
