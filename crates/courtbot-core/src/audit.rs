//! Run audit — a durable record of every job pass and of each request it
//! touched.
//!
//! The audit is append-only. It is written after a pass settles and is never
//! read by the matcher, so losing an audit write never changes what gets sent.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::EncryptedPhone;

// ─── Job ─────────────────────────────────────────────────────────────────────

/// One of the schedulable passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Job {
  Load,
  SendReminders,
  SendUnmatched,
}

impl Job {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Load => "load",
      Self::SendReminders => "send-reminders",
      Self::SendUnmatched => "send-unmatched",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "load" => Some(Self::Load),
      "send-reminders" => Some(Self::SendReminders),
      "send-unmatched" => Some(Self::SendUnmatched),
      _ => None,
    }
  }
}

impl fmt::Display for Job {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Action ──────────────────────────────────────────────────────────────────

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
  SendReminder,
  SendMatched,
  SendExpired,
  ScheduleReminder,
  ScheduleUnmatched,
  DeleteRequest,
}

impl Action {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::SendReminder => "send_reminder",
      Self::SendMatched => "send_matched",
      Self::SendExpired => "send_expired",
      Self::ScheduleReminder => "schedule_reminder",
      Self::ScheduleUnmatched => "schedule_unmatched",
      Self::DeleteRequest => "delete_request",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "send_reminder" => Some(Self::SendReminder),
      "send_matched" => Some(Self::SendMatched),
      "send_expired" => Some(Self::SendExpired),
      "schedule_reminder" => Some(Self::ScheduleReminder),
      "schedule_unmatched" => Some(Self::ScheduleUnmatched),
      "delete_request" => Some(Self::DeleteRequest),
      _ => None,
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Totals for one pass.
///
/// For `load`, `succeeded` is the number of hearings written and `skipped`
/// the number of feed rows dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
  pub run_id:      Uuid,
  pub job:         Job,
  pub processed:   usize,
  pub succeeded:   usize,
  pub skipped:     usize,
  pub errors:      usize,
  pub recorded_at: DateTime<Utc>,
}

/// One request touched by a pass or by an operator command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
  /// The pass that produced the event; `None` for operator commands.
  pub run_id:           Option<Uuid>,
  pub case_id:          String,
  pub phone:            EncryptedPhone,
  pub hearing_date:     Option<DateTime<Utc>>,
  pub hearing_location: Option<String>,
  pub action:           Action,
  /// Failure text when the item did not go through.
  pub error:            Option<String>,
  pub created_at:       DateTime<Utc>,
}

impl RequestEvent {
  /// An event with no hearing attached.
  pub fn new(action: Action, case_id: impl Into<String>, phone: EncryptedPhone, at: DateTime<Utc>) -> Self {
    Self {
      run_id: None,
      case_id: case_id.into(),
      phone,
      hearing_date: None,
      hearing_location: None,
      action,
      error: None,
      created_at: at,
    }
  }
}
