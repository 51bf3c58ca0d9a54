//! The `CourtStore` repository trait.
//!
//! The trait is implemented by storage backends (e.g. `courtbot-store-sqlite`).
//! The ingestion pipeline, matcher and dispatcher depend on this abstraction,
//! never on a concrete backend or on SQL text.

use std::future::Future;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::{
  audit::{RequestEvent, RunRecord},
  codec::EncryptedPhone,
  hearing::Hearing,
  matching::{ExpiredGroup, Match},
  request::{NewRequest, Request},
};

/// A ledger row proving a reminder went out for one hearing occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub case_id:    String,
  pub phone:      EncryptedPhone,
  pub event_date: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
}

/// Result of [`CourtStore::apply_match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchUpdate {
  /// The flag went from unmatched to matched in this call.
  Applied,
  /// Another pass matched the request first.
  AlreadyMatched,
  /// No such request any more.
  Missing,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the canonical store (`hearings`, `requests`,
/// `notifications`).
///
/// All methods return `Send` futures so the trait can be used from tasks
/// spawned on a multi-threaded tokio runtime.
pub trait CourtStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Hearings ──────────────────────────────────────────────────────────

  /// Replace the entire `hearings` table with `hearings`, atomically.
  ///
  /// Rows sharing a natural key `(case_id, date)` collapse to one; the row
  /// appearing last in `hearings` wins. Readers observe either the previous
  /// table or the new one, never a mix. Returns the number of rows written.
  fn replace_hearings(
    &self,
    hearings: Vec<Hearing>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// All hearings for `case_id`, ordered by date.
  fn hearings_for_case(
    &self,
    case_id: String,
  ) -> impl Future<Output = Result<Vec<Hearing>, Self::Error>> + Send + '_;

  /// Every hearing, ordered by `(case_id, date)`.
  fn list_hearings(&self) -> impl Future<Output = Result<Vec<Hearing>, Self::Error>> + Send + '_;

  // ── Requests ──────────────────────────────────────────────────────────

  /// Insert a request, or renew `updated_at` if `(case_id, phone)` exists.
  ///
  /// Renewal never clears `known_case`.
  fn add_request(
    &self,
    input: NewRequest,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Request, Self::Error>> + Send + '_;

  fn get_request(
    &self,
    case_id: String,
    phone: EncryptedPhone,
  ) -> impl Future<Output = Result<Option<Request>, Self::Error>> + Send + '_;

  /// Opt-out: delete every request for `phone` (ledger rows cascade).
  /// Returns the deleted case ids.
  fn delete_requests_for_phone(
    &self,
    phone: EncryptedPhone,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  // ── Matcher ───────────────────────────────────────────────────────────

  /// Unmatched requests whose case now has a hearing, one pair per request.
  fn find_newly_matched(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Match>, Self::Error>> + Send + '_;

  /// Unmatched requests not renewed within `ttl` whose case still has no
  /// hearing, one group per phone.
  fn find_expired(
    &self,
    ttl: TimeDelta,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<ExpiredGroup>, Self::Error>> + Send + '_;

  /// Matched requests with a hearing in `[start, end)` that have no ledger
  /// row for that hearing's date.
  fn find_due_reminders(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Match>, Self::Error>> + Send + '_;

  // ── Dispatcher writes ─────────────────────────────────────────────────

  /// Mark a still-unmatched request as matched.
  ///
  /// Only the call that flips the flag gets [`MatchUpdate::Applied`], so
  /// overlapping passes announce a match once.
  fn apply_match(
    &self,
    case_id: String,
    phone: EncryptedPhone,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<MatchUpdate, Self::Error>> + Send + '_;

  /// Delete the still-unmatched requests for `phone` among `case_ids`.
  /// Returns the case ids actually deleted, in
  /// [`order_case_ids`](crate::matching::order_case_ids) order.
  fn apply_expiry(
    &self,
    phone: EncryptedPhone,
    case_ids: Vec<String>,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Insert a ledger row. Returns `false` if one already existed.
  fn record_reminder(
    &self,
    case_id: String,
    phone: EncryptedPhone,
    event_date: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Remove a ledger row written by [`CourtStore::record_reminder`] whose
  /// send was rejected. Returns `false` if no such row existed.
  fn release_reminder(
    &self,
    case_id: String,
    phone: EncryptedPhone,
    event_date: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Ledger rows for one subscription, ordered by event date.
  fn notifications_for(
    &self,
    case_id: String,
    phone: EncryptedPhone,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Append a run and the per-request events it produced, atomically.
  fn record_run(
    &self,
    run: RunRecord,
    events: Vec<RequestEvent>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Append a single event that belongs to no run.
  fn record_event(&self, event: RequestEvent) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The latest `limit` runs, newest first.
  fn recent_runs(&self, limit: usize) -> impl Future<Output = Result<Vec<RunRecord>, Self::Error>> + Send + '_;

  /// Events for one run, in the order they were recorded.
  fn run_events(&self, run_id: Uuid) -> impl Future<Output = Result<Vec<RequestEvent>, Self::Error>> + Send + '_;

  /// Every event for `case_id`, in the order they were recorded.
  fn case_events(
    &self,
    case_id: String,
  ) -> impl Future<Output = Result<Vec<RequestEvent>, Self::Error>> + Send + '_;
}
