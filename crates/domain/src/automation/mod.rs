//! Automation — a recurring schedule definition and its claim state.
//!
//! Automations are created by an administrative surface outside this
//! workspace. The scheduler only ever moves them through
//! [`AutomationStatus`] and advances `next_run_time`; it never deletes them.

mod schedule;
mod status;

pub use schedule::{Frequency, Schedule};
pub use status::AutomationStatus;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, ScheduleError, ValidationError};
use crate::id::AutomationId;
use crate::time::{self, Timestamp};

/// A recurring task that fires on its [`Schedule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automation {
    pub id: AutomationId,
    pub name: String,
    pub schedule: Schedule,
    pub status: AutomationStatus,
    pub next_run_time: Option<Timestamp>,
    pub is_active: bool,
    /// Bumped on every optimistic update.
    pub version: i64,
    pub last_upd: Timestamp,
    /// Broker session key the trigger messages are published under.
    pub channel_id: String,
}

impl Automation {
    /// Create a builder for constructing an [`Automation`].
    #[must_use]
    pub fn builder() -> AutomationBuilder {
        AutomationBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `channel_id` is empty ([`ValidationError::EmptyChannel`])
    pub fn validate(&self) -> Result<(), CadenceError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.channel_id.trim().is_empty() {
            return Err(ValidationError::EmptyChannel.into());
        }
        Ok(())
    }

    /// Compute the instant this automation should fire after `now`.
    ///
    /// # Errors
    ///
    /// Propagates [`ScheduleError`] from the recurrence rules.
    pub fn next_run(&self, now: Timestamp, tz: Tz) -> Result<Option<Timestamp>, ScheduleError> {
        self.schedule.next_run(now, tz)
    }

    /// Whether the automation is active and its next run is not after `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.is_active && self.next_run_time.is_some_and(|next| next <= now)
    }
}

/// Step-by-step builder for [`Automation`].
#[derive(Debug, Default)]
pub struct AutomationBuilder {
    id: Option<AutomationId>,
    name: Option<String>,
    schedule: Option<Schedule>,
    status: Option<AutomationStatus>,
    next_run_time: Option<Timestamp>,
    is_active: Option<bool>,
    version: Option<i64>,
    last_upd: Option<Timestamp>,
    channel_id: Option<String>,
}

impl AutomationBuilder {
    #[must_use]
    pub fn id(mut self, id: AutomationId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    #[must_use]
    pub fn status(mut self, status: AutomationStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn next_run_time(mut self, ts: Timestamp) -> Self {
        self.next_run_time = Some(ts);
        self
    }

    #[must_use]
    pub fn is_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    #[must_use]
    pub fn version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn last_upd(mut self, ts: Timestamp) -> Self {
        self.last_upd = Some(ts);
        self
    }

    #[must_use]
    pub fn channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Consume the builder, validate, and return an [`Automation`].
    ///
    /// The delivery channel defaults to the automation id, so each
    /// automation gets its own ordered broker session.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] if required fields are missing or empty.
    pub fn build(self) -> Result<Automation, CadenceError> {
        let id = self.id.unwrap_or_default();
        let automation = Automation {
            id,
            name: self.name.unwrap_or_default(),
            schedule: self.schedule.unwrap_or_default(),
            status: self.status.unwrap_or(AutomationStatus::Pending),
            next_run_time: self.next_run_time,
            is_active: self.is_active.unwrap_or(true),
            version: self.version.unwrap_or(1),
            last_upd: self.last_upd.unwrap_or_else(time::now),
            channel_id: self.channel_id.unwrap_or_else(|| id.to_string()),
        };
        automation.validate()?;
        Ok(automation)
    }
}
