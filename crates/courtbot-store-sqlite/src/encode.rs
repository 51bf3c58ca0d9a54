//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision, so string comparison in SQL is chronological comparison.
//! Encrypted phones are stored as lowercase hex.

use chrono::{DateTime, SecondsFormat, Utc};
use courtbot_core::{
  audit::{Action, Job, RequestEvent, RunRecord},
  codec::EncryptedPhone,
  hearing::Hearing,
  matching::Match,
  request::Request,
  store::Notification,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── EncryptedPhone ──────────────────────────────────────────────────────────

pub fn encode_phone(phone: &EncryptedPhone) -> String { hex::encode(phone.as_bytes()) }

pub fn decode_phone(s: &str) -> Result<EncryptedPhone> {
  Ok(EncryptedPhone::from_bytes(hex::decode(s)?))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw column values of a `hearings` row.
pub struct RawHearing {
  pub case_id:      String,
  pub date:         String,
  pub defendant:    String,
  pub room:         String,
  pub hearing_type: Option<String>,
}

impl RawHearing {
  pub fn from_hearing(h: Hearing) -> Self {
    Self {
      case_id:      h.case_id,
      date:         encode_dt(h.date),
      defendant:    h.defendant,
      room:         h.room,
      hearing_type: h.hearing_type,
    }
  }

  pub fn into_hearing(self) -> Result<Hearing> {
    Ok(Hearing {
      date:         decode_dt(&self.date)?,
      case_id:      self.case_id,
      defendant:    self.defendant,
      room:         self.room,
      hearing_type: self.hearing_type,
    })
  }
}

/// Raw column values of a `requests` row.
pub struct RawRequest {
  pub case_id:    String,
  pub phone:      String,
  pub known_case: bool,
  pub created_at: String,
  pub updated_at: String,
}

impl RawRequest {
  pub fn into_request(self) -> Result<Request> {
    Ok(Request {
      phone:      decode_phone(&self.phone)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      case_id:    self.case_id,
      known_case: self.known_case,
    })
  }
}

/// A `requests ⨝ hearings` row. The join key is shared, so the hearing's
/// `case_id` comes from the request.
pub struct RawMatch {
  pub request:      RawRequest,
  pub date:         String,
  pub defendant:    String,
  pub room:         String,
  pub hearing_type: Option<String>,
}

impl RawMatch {
  pub fn into_match(self) -> Result<Match> {
    let hearing = RawHearing {
      case_id:      self.request.case_id.clone(),
      date:         self.date,
      defendant:    self.defendant,
      room:         self.room,
      hearing_type: self.hearing_type,
    }
    .into_hearing()?;
    Ok(Match { request: self.request.into_request()?, hearing })
  }
}

/// Raw column values of a `notifications` row.
pub struct RawNotification {
  pub case_id:    String,
  pub phone:      String,
  pub event_date: String,
  pub created_at: String,
}

impl RawNotification {
  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      phone:      decode_phone(&self.phone)?,
      event_date: decode_dt(&self.event_date)?,
      created_at: decode_dt(&self.created_at)?,
      case_id:    self.case_id,
    })
  }
}

/// Raw column values of a `run_log` row.
pub struct RawRun {
  pub run_id:      String,
  pub job:         String,
  pub processed:   i64,
  pub succeeded:   i64,
  pub skipped:     i64,
  pub errors:      i64,
  pub recorded_at: String,
}

impl RawRun {
  pub fn from_record(run: &RunRecord) -> Self {
    Self {
      run_id:      run.run_id.to_string(),
      job:         run.job.as_str().to_owned(),
      processed:   count_to_sql(run.processed),
      succeeded:   count_to_sql(run.succeeded),
      skipped:     count_to_sql(run.skipped),
      errors:      count_to_sql(run.errors),
      recorded_at: encode_dt(run.recorded_at),
    }
  }

  pub fn into_record(self) -> Result<RunRecord> {
    let job = Job::from_name(&self.job)
      .ok_or(Error::UnknownName { kind: "job", name: self.job })?;
    Ok(RunRecord {
      run_id: Uuid::parse_str(&self.run_id)?,
      job,
      processed: count_from_sql(self.processed),
      succeeded: count_from_sql(self.succeeded),
      skipped: count_from_sql(self.skipped),
      errors: count_from_sql(self.errors),
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw column values of a `request_events` row.
pub struct RawEvent {
  pub run_id:           Option<String>,
  pub case_id:          String,
  pub phone:            String,
  pub hearing_date:     Option<String>,
  pub hearing_location: Option<String>,
  pub action:           String,
  pub error:            Option<String>,
  pub created_at:       String,
}

impl RawEvent {
  pub fn from_event(e: RequestEvent) -> Self {
    Self {
      run_id:           e.run_id.map(|id| id.to_string()),
      case_id:          e.case_id,
      phone:            encode_phone(&e.phone),
      hearing_date:     e.hearing_date.map(encode_dt),
      hearing_location: e.hearing_location,
      action:           e.action.as_str().to_owned(),
      error:            e.error,
      created_at:       encode_dt(e.created_at),
    }
  }

  pub fn into_event(self) -> Result<RequestEvent> {
    let action = Action::from_name(&self.action)
      .ok_or(Error::UnknownName { kind: "action", name: self.action })?;
    Ok(RequestEvent {
      run_id: self.run_id.as_deref().map(Uuid::parse_str).transpose()?,
      phone: decode_phone(&self.phone)?,
      hearing_date: self.hearing_date.as_deref().map(decode_dt).transpose()?,
      created_at: decode_dt(&self.created_at)?,
      case_id: self.case_id,
      hearing_location: self.hearing_location,
      action,
      error: self.error,
    })
  }
}

fn count_to_sql(n: usize) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

fn count_from_sql(n: i64) -> usize { usize::try_from(n).unwrap_or(0) }
