//! Checklist instances, responses, and the instance status state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::checklist::cds::TriggeredAlert;
use crate::checklist::condition::AnswerMap;
use crate::checklist::value::ResponseValue;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp, UnknownVariant};

/* --------------------------------------------------------------------------
Status
-------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    NotStarted,
    InProgress,
    Completed,
    Reviewed,
    Locked,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::NotStarted => "not_started",
            InstanceStatus::InProgress => "in_progress",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Reviewed => "reviewed",
            InstanceStatus::Locked => "locked",
        }
    }

    /// Whether the state machine allows moving from `self` to `target`.
    ///
    /// Forward moves only, plus reopening a completed checklist. Anything
    /// that is not yet locked may be locked.
    pub fn can_transition_to(&self, target: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (*self, target),
            (NotStarted, InProgress)
                | (InProgress, Completed)
                | (Completed, InProgress)
                | (Completed, Reviewed)
                | (NotStarted | InProgress | Completed | Reviewed, Locked)
        )
    }

    /// Validate a transition, returning the matching error when refused.
    pub fn check_transition(&self, target: InstanceStatus, instance_id: DbId) -> Result<(), CoreError> {
        if *self == InstanceStatus::Locked {
            return Err(CoreError::InstanceLocked { instance_id });
        }
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "not_started" => Ok(InstanceStatus::NotStarted),
            "in_progress" => Ok(InstanceStatus::InProgress),
            "completed" => Ok(InstanceStatus::Completed),
            "reviewed" => Ok(InstanceStatus::Reviewed),
            "locked" => Ok(InstanceStatus::Locked),
            other => Err(UnknownVariant::new("checklist status", other)),
        }
    }
}

/// Progress of the external note generation for an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    #[default]
    NotRequested,
    Pending,
    Completed,
    Failed,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::NotRequested => "not_requested",
            NoteStatus::Pending => "pending",
            NoteStatus::Completed => "completed",
            NoteStatus::Failed => "failed",
        }
    }
}

impl FromStr for NoteStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "not_requested" => Ok(NoteStatus::NotRequested),
            "pending" => Ok(NoteStatus::Pending),
            "completed" => Ok(NoteStatus::Completed),
            "failed" => Ok(NoteStatus::Failed),
            other => Err(UnknownVariant::new("note status", other)),
        }
    }
}

/* --------------------------------------------------------------------------
Responses
-------------------------------------------------------------------------- */

/// One entry of a response's audit trail. The last entry is always the
/// current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHistoryEntry {
    pub value: Option<ResponseValue>,
    pub is_skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub changed_by: DbId,
    pub changed_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub item_id: DbId,
    pub value: Option<ResponseValue>,
    pub is_skipped: bool,
    pub skip_reason: Option<String>,
    pub triggered_alerts: Vec<TriggeredAlert>,
    pub response_history: Vec<ResponseHistoryEntry>,
    pub answered_by: DbId,
    pub answered_at: Timestamp,
}

impl Response {
    /// The value a condition may look at: skipped responses count as
    /// unanswered.
    pub fn effective_value(&self) -> Option<&ResponseValue> {
        if self.is_skipped {
            None
        } else {
            self.value.as_ref()
        }
    }

    pub fn has_skip_reason(&self) -> bool {
        self.skip_reason
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}

/// The current state of one response, as handed to the store.
///
/// The store upserts the current fields on `(instance_id, item_id)`, appends
/// `history_entry` to the existing history, recomputes progress over the
/// merged responses and (when `started_at` is set) moves a not-started
/// instance into progress, all in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseWrite {
    pub item_id: DbId,
    pub value: Option<ResponseValue>,
    pub is_skipped: bool,
    pub skip_reason: Option<String>,
    pub triggered_alerts: Vec<TriggeredAlert>,
    pub history_entry: ResponseHistoryEntry,
    pub started_at: Option<Timestamp>,
}

impl ResponseWrite {
    /// Apply this write to an existing response (or create one).
    pub fn apply_to(&self, existing: Option<Response>) -> Response {
        let mut history = existing.map(|r| r.response_history).unwrap_or_default();
        history.push(self.history_entry.clone());
        Response {
            item_id: self.item_id,
            value: self.value.clone(),
            is_skipped: self.is_skipped,
            skip_reason: self.skip_reason.clone(),
            triggered_alerts: self.triggered_alerts.clone(),
            response_history: history,
            answered_by: self.history_entry.changed_by,
            answered_at: self.history_entry.changed_at,
        }
    }
}

/* --------------------------------------------------------------------------
Instances
-------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistInstance {
    pub id: DbId,
    pub clinic_id: DbId,
    pub template_id: DbId,
    pub template_version: i32,
    pub patient_id: DbId,
    pub session_id: Option<DbId>,
    pub created_by: DbId,
    pub status: InstanceStatus,
    pub progress_percentage: f64,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub reviewed_by: Option<DbId>,
    pub reviewed_at: Option<Timestamp>,
    pub locked_at: Option<Timestamp>,
    pub locked_by: Option<DbId>,
    pub last_auto_saved_at: Option<Timestamp>,
    pub note_status: NoteStatus,
    pub generated_note: Option<String>,
    pub generated_note_secondary: Option<String>,
    pub responses: Vec<Response>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ChecklistInstance {
    pub fn is_locked(&self) -> bool {
        self.status == InstanceStatus::Locked || self.locked_at.is_some()
    }

    /// Fail fast when the instance no longer accepts response mutations.
    pub fn ensure_unlocked(&self) -> Result<(), CoreError> {
        if self.is_locked() {
            Err(CoreError::InstanceLocked {
                instance_id: self.id,
            })
        } else {
            Ok(())
        }
    }

    pub fn response(&self, item_id: DbId) -> Option<&Response> {
        self.responses.iter().find(|r| r.item_id == item_id)
    }

    /// Current answers for condition evaluation.
    pub fn answer_map(&self) -> AnswerMap<'_> {
        answers_of(&self.responses)
    }
}

/// Answers keyed by item, leaving out skipped responses.
pub fn answers_of(responses: &[Response]) -> AnswerMap<'_> {
    responses
        .iter()
        .filter_map(|r| r.effective_value().map(|v| (r.item_id, v)))
        .collect()
}

/// Input for creating an instance. The template pin is resolved by the
/// controller before this reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChecklistInstance {
    pub clinic_id: DbId,
    pub template_id: DbId,
    pub template_version: i32,
    pub patient_id: DbId,
    pub session_id: Option<DbId>,
    pub created_by: DbId,
    pub progress_percentage: f64,
}

/// A status change handed to the store together with its audit fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: InstanceStatus,
    pub actor: DbId,
    pub at: Timestamp,
    /// Set when the transition requests a generated note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_status: Option<NoteStatus>,
}

impl StatusChange {
    /// Apply the change and its audit fields to an in-memory instance.
    pub fn apply_to(&self, instance: &mut ChecklistInstance) {
        match self.status {
            InstanceStatus::InProgress => {
                if instance.started_at.is_none() {
                    instance.started_at = Some(self.at);
                }
            }
            InstanceStatus::Completed => instance.completed_at = Some(self.at),
            InstanceStatus::Reviewed => {
                instance.reviewed_by = Some(self.actor);
                instance.reviewed_at = Some(self.at);
            }
            InstanceStatus::Locked => {
                instance.locked_by = Some(self.actor);
                instance.locked_at = Some(self.at);
            }
            InstanceStatus::NotStarted => {}
        }
        if let Some(note_status) = self.note_status {
            instance.note_status = note_status;
        }
        instance.status = self.status;
        instance.updated_at = self.at;
    }
}
