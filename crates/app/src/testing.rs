//! In-memory fakes of the ports, shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use cadence_domain::automation::{Automation, AutomationStatus};
use cadence_domain::definition::{
    ActionDefinition, AutomationAction, Condition, ConditionGroup, Target,
};
use cadence_domain::error::{
    ActionInvocationError, BoxError, CadenceError, ConflictError,
};
use cadence_domain::execution::{ExecutionLog, LogId};
use cadence_domain::id::{ActionId, AutomationId, ConditionGroupId};
use cadence_domain::message::TriggerMessage;
use cadence_domain::time::Timestamp;

use crate::ports::{ActionInvoker, ClaimStore, ClaimWindow, DefinitionReader, LogStore, MessageSender};

fn injected(what: &str) -> BoxError {
    format!("injected {what} failure").into()
}

#[derive(Clone, Default)]
pub struct InMemoryClaimStore {
    rows: Arc<Mutex<HashMap<AutomationId, Automation>>>,
    pub fail_claims: Arc<AtomicBool>,
    pub fail_commits: Arc<AtomicBool>,
    pub commits: Arc<Mutex<Vec<Vec<AutomationId>>>>,
}

impl InMemoryClaimStore {
    pub fn insert(&self, automation: Automation) {
        self.rows.lock().unwrap().insert(automation.id, automation);
    }

    pub fn get(&self, id: AutomationId) -> Automation {
        self.rows.lock().unwrap().get(&id).cloned().unwrap()
    }
}

impl ClaimStore for InMemoryClaimStore {
    fn claim_due(
        &self,
        window: ClaimWindow,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Automation>, CadenceError>> + Send {
        let result = if self.fail_claims.load(Ordering::SeqCst) {
            Err(CadenceError::Storage(injected("claim")))
        } else {
            let mut rows = self.rows.lock().unwrap();
            let mut due: Vec<&mut Automation> = rows
                .values_mut()
                .filter(|a| {
                    a.is_active
                        && a.status == AutomationStatus::Pending
                        && a.next_run_time.is_some_and(|t| window.contains(t))
                })
                .collect();
            due.sort_by_key(|a| a.next_run_time);
            Ok(due
                .into_iter()
                .take(limit)
                .map(|a| {
                    a.status = AutomationStatus::Locked;
                    a.last_upd = window.claimed_at;
                    a.clone()
                })
                .collect())
        };
        async { result }
    }

    fn commit_next_run(
        &self,
        tasks: &[Automation],
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        let result = if self.fail_commits.load(Ordering::SeqCst) {
            Err(CadenceError::Storage(injected("commit")))
        } else {
            let mut rows = self.rows.lock().unwrap();
            for task in tasks {
                if let Some(row) = rows.get_mut(&task.id) {
                    row.status = task.status;
                    row.next_run_time = task.next_run_time;
                    row.last_upd = task.last_upd;
                }
            }
            self.commits
                .lock()
                .unwrap()
                .push(tasks.iter().map(|t| t.id).collect());
            Ok(())
        };
        async { result }
    }

    fn update_status_batch(
        &self,
        ids: &[AutomationId],
        status: AutomationStatus,
        at: Timestamp,
    ) -> impl Future<Output = Result<u64, CadenceError>> + Send {
        let mut rows = self.rows.lock().unwrap();
        let mut changed = 0;
        for id in ids {
            if let Some(row) = rows.get_mut(id) {
                row.status = status;
                row.last_upd = at;
                changed += 1;
            }
        }
        async move { Ok(changed) }
    }

    fn get_by_id(
        &self,
        id: AutomationId,
    ) -> impl Future<Output = Result<Option<Automation>, CadenceError>> + Send {
        let result = self.rows.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }

    fn update(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, CadenceError>> + Send {
        let mut rows = self.rows.lock().unwrap();
        let result = match rows.get(&automation.id) {
            Some(stored) if stored.version == automation.version => {
                let mut next = automation;
                next.version += 1;
                rows.insert(next.id, next.clone());
                Ok(next)
            }
            _ => Err(ConflictError {
                entity: "Automation",
                id: automation.id.to_string(),
                expected: automation.version,
            }
            .into()),
        };
        async { result }
    }

    fn list_stale_locked(
        &self,
        older_than: Timestamp,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Automation>, CadenceError>> + Send {
        let rows = self.rows.lock().unwrap();
        let result: Vec<Automation> = rows
            .values()
            .filter(|a| a.status == AutomationStatus::Locked && a.last_upd < older_than)
            .take(limit)
            .cloned()
            .collect();
        async { Ok(result) }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDefinitions {
    pub groups: Arc<Mutex<Vec<ConditionGroup>>>,
    pub conditions: Arc<Mutex<Vec<Condition>>>,
    pub links: Arc<Mutex<Vec<AutomationAction>>>,
    pub actions: Arc<Mutex<Vec<ActionDefinition>>>,
    pub targets: Arc<Mutex<Vec<Target>>>,
    pub fail_reads: Arc<AtomicBool>,
}

impl InMemoryDefinitions {
    /// Register an action endpoint and link it to `automation_id`.
    pub fn link_action(&self, automation_id: AutomationId, url: &str, sort_order: i32) -> ActionId {
        let action = ActionDefinition {
            id: ActionId::new(),
            name: format!("action-{sort_order}"),
            invoke_url: url.to_string(),
        };
        let id = action.id;
        self.actions.lock().unwrap().push(action);
        self.links.lock().unwrap().push(AutomationAction {
            id: cadence_domain::id::AutomationActionId::new(),
            automation_id,
            action_id: id,
            sort_order,
            params: serde_json::json!({}),
        });
        id
    }

    fn check(&self) -> Result<(), CadenceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CadenceError::Storage(injected("definition read")));
        }
        Ok(())
    }
}

impl DefinitionReader for InMemoryDefinitions {
    fn condition_groups(
        &self,
        automation_id: AutomationId,
    ) -> impl Future<Output = Result<Vec<ConditionGroup>, CadenceError>> + Send {
        let result = self.check().map(|()| {
            self.groups
                .lock()
                .unwrap()
                .iter()
                .filter(|g| g.automation_id == automation_id)
                .cloned()
                .collect()
        });
        async { result }
    }

    fn conditions(
        &self,
        group_ids: &[ConditionGroupId],
    ) -> impl Future<Output = Result<Vec<Condition>, CadenceError>> + Send {
        let wanted: HashSet<ConditionGroupId> = group_ids.iter().copied().collect();
        let result = self.check().map(|()| {
            self.conditions
                .lock()
                .unwrap()
                .iter()
                .filter(|c| wanted.contains(&c.group_id))
                .cloned()
                .collect()
        });
        async { result }
    }

    fn automation_actions(
        &self,
        automation_id: AutomationId,
    ) -> impl Future<Output = Result<Vec<AutomationAction>, CadenceError>> + Send {
        let result = self.check().map(|()| {
            let mut links: Vec<AutomationAction> = self
                .links
                .lock()
                .unwrap()
                .iter()
                .filter(|l| l.automation_id == automation_id)
                .cloned()
                .collect();
            links.sort_by_key(|l| l.sort_order);
            links
        });
        async { result }
    }

    fn action_definitions(
        &self,
        ids: &[ActionId],
    ) -> impl Future<Output = Result<Vec<ActionDefinition>, CadenceError>> + Send {
        let wanted: HashSet<ActionId> = ids.iter().copied().collect();
        let result = self.check().map(|()| {
            self.actions
                .lock()
                .unwrap()
                .iter()
                .filter(|a| wanted.contains(&a.id))
                .cloned()
                .collect()
        });
        async { result }
    }

    fn targets(
        &self,
        automation_id: AutomationId,
    ) -> impl Future<Output = Result<Vec<Target>, CadenceError>> + Send {
        let result = self.check().map(|()| {
            self.targets
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.automation_id == automation_id)
                .cloned()
                .collect()
        });
        async { result }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLogStore {
    pub rows: Arc<Mutex<HashMap<LogId, ExecutionLog>>>,
    pub upserts: Arc<Mutex<Vec<ExecutionLog>>>,
    /// How many upcoming upserts fail before they start succeeding.
    pub failures_left: Arc<AtomicUsize>,
}

impl InMemoryLogStore {
    pub fn get(&self, log_id: &LogId) -> Option<ExecutionLog> {
        self.rows.lock().unwrap().get(log_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl LogStore for InMemoryLogStore {
    fn upsert(&self, log: &ExecutionLog) -> impl Future<Output = Result<(), CadenceError>> + Send {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let result = if failing {
            Err(CadenceError::Storage(injected("log upsert")))
        } else {
            self.rows
                .lock()
                .unwrap()
                .insert(log.log_id.clone(), log.clone());
            self.upserts.lock().unwrap().push(log.clone());
            Ok(())
        };
        async { result }
    }

    fn get_by_id(
        &self,
        log_id: &LogId,
    ) -> impl Future<Output = Result<Option<ExecutionLog>, CadenceError>> + Send {
        let result = self.get(log_id);
        async { Ok(result) }
    }

    fn delete_before(
        &self,
        before: Timestamp,
    ) -> impl Future<Output = Result<u64, CadenceError>> + Send {
        let mut rows = self.rows.lock().unwrap();
        let count = rows.len();
        rows.retain(|_, log| log.triggered_at >= before);
        let removed = (count - rows.len()) as u64;
        async move { Ok(removed) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub session_id: String,
    pub message: TriggerMessage,
    pub deliver_at: Option<Timestamp>,
}

/// Records published triggers; publishes for `failing` automations error out.
///
/// Publishes for `held` automations wait for `release` before recording.
#[derive(Clone, Default)]
pub struct RecordingSender {
    pub published: Arc<Mutex<Vec<Published>>>,
    pub failing: Arc<Mutex<HashSet<AutomationId>>>,
    pub held: Arc<Mutex<HashSet<AutomationId>>>,
    pub holding: Arc<AtomicUsize>,
    pub release: Arc<Notify>,
}

impl RecordingSender {
    async fn hold(&self, body: &[u8]) {
        let Ok(message) = TriggerMessage::decode(body) else {
            return;
        };
        let held = self.held.lock().unwrap().contains(&message.automation_id);
        if held {
            self.holding.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.holding.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn record(
        &self,
        session_id: &str,
        body: &[u8],
        deliver_at: Option<Timestamp>,
    ) -> Result<(), CadenceError> {
        let message = TriggerMessage::decode(body)?;
        if self.failing.lock().unwrap().contains(&message.automation_id) {
            return Err(CadenceError::Dispatch(injected("publish")));
        }
        self.published.lock().unwrap().push(Published {
            session_id: session_id.to_string(),
            message,
            deliver_at,
        });
        Ok(())
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

impl MessageSender for RecordingSender {
    fn send(
        &self,
        session_id: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        let sender = self.clone();
        let session_id = session_id.to_string();
        async move {
            sender.hold(&body).await;
            sender.record(&session_id, &body, None)
        }
    }

    fn schedule_at(
        &self,
        session_id: &str,
        body: Vec<u8>,
        deliver_at: Timestamp,
    ) -> impl Future<Output = Result<(), CadenceError>> + Send {
        let sender = self.clone();
        let session_id = session_id.to_string();
        async move {
            sender.hold(&body).await;
            sender.record(&session_id, &body, Some(deliver_at))
        }
    }
}

/// Records invoked URLs; URLs in `failing` answer 500.
#[derive(Clone, Default)]
pub struct RecordingInvoker {
    pub calls: Arc<Mutex<Vec<(String, String)>>>,
    pub failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingInvoker {
    pub fn urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }
}

impl ActionInvoker for RecordingInvoker {
    fn invoke(&self, url: &str, body: &str) -> impl Future<Output = Result<(), CadenceError>> + Send {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), body.to_string()));
        let result = if self.failing.lock().unwrap().contains(url) {
            Err(ActionInvocationError::Status {
                url: url.to_string(),
                status: 500,
                body: "{\"error\":\"boom\"}".to_string(),
            }
            .into())
        } else {
            Ok(())
        };
        async { result }
    }
}
