//! The three schedulable jobs.
//!
//! Every job is a single stateless pass. Dispatch jobs fan their candidates
//! out through [`settle_all`] and fold the manifest into a [`JobSummary`];
//! only a failing matcher query fails the run. Each finished pass is written
//! to the run audit together with one event per delivered or failed item.

use chrono::{DateTime, TimeDelta, Utc};
pub use courtbot_core::audit::Job;
use courtbot_core::{
  audit::{Action, RequestEvent, RunRecord},
  clock::{Clock, reminder_window},
  gateway::Gateway,
  matching::{ExpiredGroup, Match},
  store::CourtStore,
};
use courtbot_feed::{Source, fetch::Fetch};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Result,
  dispatch::{Delivery, Dispatcher},
  error::{DispatchError, Error},
  settle::{Manifest, settle_all},
};

// ─── Summaries ───────────────────────────────────────────────────────────────

/// A dispatch candidate as it appears in the audit.
trait Audited {
  fn case_ids(&self) -> String;

  /// One event per request the item covers.
  fn events(&self, action: Action, at: DateTime<Utc>) -> Vec<RequestEvent>;
}

impl Audited for Match {
  fn case_ids(&self) -> String { self.request.case_id.clone() }

  fn events(&self, action: Action, at: DateTime<Utc>) -> Vec<RequestEvent> {
    let mut event = RequestEvent::new(action, &self.request.case_id, self.request.phone.clone(), at);
    event.hearing_date = Some(self.hearing.date);
    event.hearing_location = Some(self.hearing.room.clone());
    vec![event]
  }
}

impl Audited for ExpiredGroup {
  fn case_ids(&self) -> String { self.case_ids.join(",") }

  fn events(&self, action: Action, at: DateTime<Utc>) -> Vec<RequestEvent> {
    self
      .case_ids
      .iter()
      .map(|id| RequestEvent::new(action, id, self.phone.clone(), at))
      .collect()
  }
}

/// Tally of one dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
  pub job:       Job,
  pub run_id:    Uuid,
  pub processed: usize,
  pub sent:      usize,
  pub skipped:   usize,
  pub errors:    usize,
}

impl JobSummary {
  fn new(job: Job) -> Self {
    Self { job, run_id: Uuid::new_v4(), processed: 0, sent: 0, skipped: 0, errors: 0 }
  }

  /// Count a manifest, logging each failure with the item's case ids.
  ///
  /// Returns audit events for every sent or failed item; skipped items
  /// changed nothing and leave no event.
  fn absorb<T: Audited>(
    &mut self,
    manifest: &Manifest<T, Delivery, DispatchError>,
    action: Action,
    at: DateTime<Utc>,
  ) -> Vec<RequestEvent> {
    let mut events = Vec::new();
    self.processed += manifest.len();
    for (item, delivery) in manifest.successes() {
      match delivery {
        Delivery::Sent(_) => {
          self.sent += 1;
          events.extend(self.stamp(item.events(action, at), None));
        }
        Delivery::Skipped(_) => self.skipped += 1,
      }
    }
    for (item, failure) in manifest.failures() {
      self.errors += 1;
      warn!(
        job = %self.job,
        run_id = %self.run_id,
        case_id = %item.case_ids(),
        error = %failure,
        "item not delivered"
      );
      events.extend(self.stamp(item.events(action, at), Some(failure.to_string())));
    }
    events
  }

  fn stamp(&self, mut events: Vec<RequestEvent>, error: Option<String>) -> Vec<RequestEvent> {
    for event in &mut events {
      event.run_id = Some(self.run_id);
      event.error.clone_from(&error);
    }
    events
  }

  pub fn to_record(&self, at: DateTime<Utc>) -> RunRecord {
    RunRecord {
      run_id:      self.run_id,
      job:         self.job,
      processed:   self.processed,
      succeeded:   self.sent,
      skipped:     self.skipped,
      errors:      self.errors,
      recorded_at: at,
    }
  }

  fn log(&self) {
    info!(
      job = %self.job,
      run_id = %self.run_id,
      processed = self.processed,
      sent = self.sent,
      skipped = self.skipped,
      errors = self.errors,
      "pass complete"
    );
  }
}

/// Counts from one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResult {
  pub sources_processed: usize,
  pub records_parsed:    usize,
  pub records_skipped:   usize,
  pub records_written:   usize,
}

// ─── load ────────────────────────────────────────────────────────────────────

/// Fetch and parse every source, then swap the result into the store.
///
/// Nothing is written unless every source downloads and parses; a failure
/// anywhere leaves the current hearings untouched.
pub async fn load<S, F, C>(store: &S, fetcher: &F, clock: &C, sources: &[Source]) -> Result<IngestResult>
where
  S: CourtStore,
  F: Fetch,
  C: Clock + ?Sized,
{
  let run_id = Uuid::new_v4();

  let mut payloads = Vec::with_capacity(sources.len());
  for source in sources {
    let body = fetcher.fetch(&source.url).await?;
    payloads.push((source.kind, body));
  }

  let mut hearings = Vec::new();
  let mut skipped = 0;
  for (kind, body) in &payloads {
    let feed = courtbot_feed::parse(*kind, body, clock)?;
    skipped += feed.skipped;
    hearings.extend(feed.hearings);
  }

  let result = IngestResult {
    sources_processed: sources.len(),
    records_parsed:    hearings.len(),
    records_skipped:   skipped,
    records_written:   0,
  };
  let written = store.replace_hearings(hearings).await.map_err(Error::store)?;
  let result = IngestResult { records_written: written, ..result };

  let run = RunRecord {
    run_id,
    job: Job::Load,
    processed: result.records_parsed,
    succeeded: result.records_written,
    skipped: result.records_skipped,
    errors: 0,
    recorded_at: clock.now(),
  };
  record_audit(store, run, Vec::new()).await;

  info!(
    job = %Job::Load,
    %run_id,
    sources = result.sources_processed,
    parsed = result.records_parsed,
    skipped = result.records_skipped,
    written = result.records_written,
    "hearings replaced"
  );
  Ok(result)
}

// ─── Dispatch jobs ───────────────────────────────────────────────────────────

/// Runs the dispatch jobs over one store and gateway.
pub struct Runner<S, G> {
  pub dispatcher:      Dispatcher<S, G>,
  pub max_concurrency: usize,
  pub queue_ttl:       TimeDelta,
}

impl<S, G> Runner<S, G>
where
  S: CourtStore + 'static,
  G: Gateway + 'static,
{
  /// Remind every known request whose hearing falls tomorrow.
  pub async fn send_reminders(&self) -> Result<JobSummary> {
    let mut summary = JobSummary::new(Job::SendReminders);

    let (start, end) = reminder_window(self.dispatcher.clock());
    let due = self
      .dispatcher
      .store()
      .find_due_reminders(start, end)
      .await
      .map_err(Error::store)?;

    let d = self.dispatcher.clone();
    let manifest = settle_all(due, self.max_concurrency, move |m| {
      let d = d.clone();
      async move { d.dispatch_reminder(m).await }
    })
    .await;
    let events = summary.absorb(&manifest, Action::SendReminder, self.dispatcher.clock().now());

    summary.log();
    self.audit(&summary, events).await;
    Ok(summary)
  }

  /// Announce newly matched requests, then expire stale unmatched ones.
  pub async fn send_unmatched(&self) -> Result<JobSummary> {
    let mut summary = JobSummary::new(Job::SendUnmatched);
    let store = self.dispatcher.store();

    let matched = store
      .find_newly_matched(self.dispatcher.clock().now())
      .await
      .map_err(Error::store)?;
    let d = self.dispatcher.clone();
    let manifest = settle_all(matched, self.max_concurrency, move |m| {
      let d = d.clone();
      async move { d.dispatch_match(m).await }
    })
    .await;
    let mut events =
      summary.absorb(&manifest, Action::SendMatched, self.dispatcher.clock().now());

    let expired = store
      .find_expired(self.queue_ttl, self.dispatcher.clock().now())
      .await
      .map_err(Error::store)?;
    let d = self.dispatcher.clone();
    let manifest = settle_all(expired, self.max_concurrency, move |g| {
      let d = d.clone();
      async move { d.dispatch_expiry(g).await }
    })
    .await;
    events.extend(summary.absorb(&manifest, Action::SendExpired, self.dispatcher.clock().now()));

    summary.log();
    self.audit(&summary, events).await;
    Ok(summary)
  }

  async fn audit(&self, summary: &JobSummary, events: Vec<RequestEvent>) {
    let run = summary.to_record(self.dispatcher.clock().now());
    record_audit(self.dispatcher.store(), run, events).await;
  }
}

/// Write a run to the audit. Messages already went out, so a failed write
/// is logged and the pass still succeeds.
async fn record_audit<S: CourtStore>(store: &S, run: RunRecord, events: Vec<RequestEvent>) {
  let run_id = run.run_id;
  if let Err(e) = store.record_run(run, events).await {
    warn!(%run_id, error = %e, "run audit not recorded");
  }
}
