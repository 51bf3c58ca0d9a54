//! End-to-end pass tests: in-memory store, fixed clock, fake gateway and feed.

use std::{
  collections::{HashMap, HashSet},
  sync::{Arc, Mutex},
};

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use courtbot_core::{
  audit::{Action, Job},
  clock::FixedClock,
  codec::{EncryptedPhone, PhoneCodec},
  gateway::{Gateway, GatewayError, Receipt},
  hearing::Hearing,
  messages::MessageContext,
  request::NewRequest,
  store::CourtStore,
};
use courtbot_feed::{FetchError, Source, SourceKind, fetch::Fetch};
use courtbot_store_sqlite::SqliteStore;

use crate::{
  Error, Runner,
  codec::AesPhoneCodec,
  dispatch::{Delivery, Dispatcher, Skip},
  load,
};

// ─── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Sent {
  to:   String,
  body: String,
}

/// Records every message; refuses numbers listed in `refuse`.
#[derive(Default)]
struct RecordingGateway {
  sent:   Mutex<Vec<Sent>>,
  refuse: Mutex<HashSet<String>>,
}

impl Gateway for RecordingGateway {
  async fn send<'a>(
    &'a self,
    to: &'a str,
    _from: &'a str,
    body: &'a str,
  ) -> Result<Receipt, GatewayError> {
    if self.refuse.lock().unwrap().contains(to) {
      return Err(GatewayError::Permanent(format!("{to} refused")));
    }
    let mut sent = self.sent.lock().unwrap();
    sent.push(Sent { to: to.to_owned(), body: body.to_owned() });
    Ok(Receipt { id: format!("SM{}", sent.len()) })
  }
}

/// Serves canned payloads; unknown URLs answer 404.
#[derive(Default)]
struct ScriptedFetcher {
  pages: HashMap<String, Result<String, u16>>,
}

impl ScriptedFetcher {
  fn page(mut self, url: &str, body: &str) -> Self {
    self.pages.insert(url.into(), Ok(body.into()));
    self
  }

  fn status(mut self, url: &str, status: u16) -> Self {
    self.pages.insert(url.into(), Err(status));
    self
  }
}

impl Fetch for ScriptedFetcher {
  async fn fetch<'a>(&'a self, url: &'a str) -> Result<String, FetchError> {
    match self.pages.get(url) {
      Some(Ok(body)) => Ok(body.clone()),
      Some(Err(status)) => Err(FetchError::Status { url: url.into(), status: *status }),
      None => Err(FetchError::Status { url: url.into(), status: 404 }),
    }
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

const ALICE: &str = "+19075550001";
const BOB: &str = "+19075550002";
const CAROL: &str = "+19075550003";

fn utc(s: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// Noon on Thursday 2015-03-26 in Anchorage (UTC-8).
fn now() -> DateTime<Utc> { utc("2015-03-26T20:00:00Z") }

/// 2:00 PM local on Friday 2015-03-27.
fn tomorrow_2pm() -> DateTime<Utc> { utc("2015-03-27T22:00:00Z") }

fn alaska(at: DateTime<Utc>) -> FixedClock {
  FixedClock::new(at, FixedOffset::west_opt(8 * 3600).unwrap())
}

fn hearing(case_id: &str, date: DateTime<Utc>, room: &str) -> Hearing {
  Hearing {
    case_id: case_id.into(),
    date,
    defendant: "FREDERICK TURNER".into(),
    room: room.into(),
    hearing_type: None,
  }
}

struct Harness {
  store:   Arc<SqliteStore>,
  gateway: Arc<RecordingGateway>,
  codec:   Arc<AesPhoneCodec>,
}

impl Harness {
  async fn new() -> Self {
    Self {
      store:   Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store")),
      gateway: Arc::new(RecordingGateway::default()),
      codec:   Arc::new(AesPhoneCodec::new([42u8; 32])),
    }
  }

  fn dispatcher_at(&self, at: DateTime<Utc>) -> Dispatcher<SqliteStore, RecordingGateway> {
    Dispatcher::new(
      Arc::clone(&self.store),
      Arc::clone(&self.gateway),
      self.codec.clone(),
      Arc::new(alaska(at)),
      MessageContext {
        court_name: "Anchorage Municipal Court".into(),
        public_url: "https://courts.example.gov".into(),
      },
      "+19075550000",
    )
  }

  fn runner_at(&self, at: DateTime<Utc>) -> Runner<SqliteStore, RecordingGateway> {
    Runner {
      dispatcher:      self.dispatcher_at(at),
      max_concurrency: 4,
      queue_ttl:       TimeDelta::days(10),
    }
  }

  fn runner(&self) -> Runner<SqliteStore, RecordingGateway> { self.runner_at(now()) }

  fn phone(&self, plain: &str) -> EncryptedPhone { self.codec.encrypt(plain).unwrap() }

  async fn subscribe(&self, case_id: &str, plain: &str, known: bool, at: DateTime<Utc>) {
    let input = NewRequest::new(case_id, self.phone(plain), known).unwrap();
    self.store.add_request(input, at).await.unwrap();
  }

  async fn known_case(&self, case_id: &str, plain: &str) -> Option<bool> {
    self
      .store
      .get_request(case_id.into(), self.phone(plain))
      .await
      .unwrap()
      .map(|r| r.known_case)
  }

  fn sent(&self) -> Vec<Sent> { self.gateway.sent.lock().unwrap().clone() }

  fn refuse(&self, plain: &str) { self.gateway.refuse.lock().unwrap().insert(plain.into()); }

  fn accept_all(&self) { self.gateway.refuse.lock().unwrap().clear(); }
}

// ─── send-unmatched ──────────────────────────────────────────────────────────

#[tokio::test]
async fn new_match_flags_request_and_sends_once() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();
  h.subscribe("4928456", ALICE, false, now() - TimeDelta::hours(1)).await;

  let summary = h.runner().send_unmatched().await.unwrap();
  assert_eq!((summary.processed, summary.sent, summary.errors), (1, 1, 0));
  assert_eq!(h.known_case("4928456", ALICE).await, Some(true));

  let sent = h.sent();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].to, ALICE);
  assert!(sent[0].body.contains("scheduled on Fri, Mar 27th at 2:00 PM, at A."), "{}", sent[0].body);

  // Already known: a second pass has nothing to do.
  let again = h.runner().send_unmatched().await.unwrap();
  assert_eq!(again.processed, 0);
  assert_eq!(h.sent().len(), 1);
}

#[tokio::test]
async fn expired_requests_for_one_phone_share_one_message() {
  let h = Harness::new().await;
  let stale = now() - TimeDelta::days(11);
  h.subscribe("BBB222", ALICE, false, stale).await;
  h.subscribe("AAA111", ALICE, false, stale).await;
  h.subscribe("CCC333", BOB, false, now() - TimeDelta::days(2)).await;

  let summary = h.runner().send_unmatched().await.unwrap();
  assert_eq!((summary.processed, summary.sent), (1, 1));

  let sent = h.sent();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].to, ALICE);
  assert!(
    sent[0].body.starts_with("We haven't been able to find your court cases: BBB222, AAA111."),
    "{}",
    sent[0].body
  );
  assert_eq!(h.known_case("AAA111", ALICE).await, None);
  assert_eq!(h.known_case("BBB222", ALICE).await, None);
  assert_eq!(h.known_case("CCC333", BOB).await, Some(false));
}

#[tokio::test]
async fn expired_case_ids_are_listed_descending() {
  let h = Harness::new().await;
  let stale = now() - TimeDelta::days(11);
  h.subscribe("123456", ALICE, false, stale).await;
  h.subscribe("ABC123", ALICE, false, stale).await;

  h.runner().send_unmatched().await.unwrap();
  let sent = h.sent();
  assert!(
    sent[0].body.starts_with("We haven't been able to find your court cases: ABC123, 123456."),
    "{}",
    sent[0].body
  );
}

#[tokio::test]
async fn overlapping_passes_announce_a_match_once() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();
  h.subscribe("4928456", ALICE, false, now()).await;

  // Both passes read their candidates before either dispatches.
  let first_pass = h.store.find_newly_matched(now()).await.unwrap();
  let second_pass = h.store.find_newly_matched(now()).await.unwrap();
  assert_eq!(first_pass.len(), 1);
  assert_eq!(second_pass.len(), 1);

  let d = h.dispatcher_at(now());
  let a = d.dispatch_match(first_pass[0].clone()).await.unwrap();
  let b = d.dispatch_match(second_pass[0].clone()).await.unwrap();
  assert!(matches!(a, Delivery::Sent(_)), "{a:?}");
  assert_eq!(b, Delivery::Skipped(Skip::AlreadyMatched));
  assert_eq!(h.sent().len(), 1);
}

#[tokio::test]
async fn expiry_send_failure_keeps_rows_deleted() {
  let h = Harness::new().await;
  h.subscribe("AAA111", ALICE, false, now() - TimeDelta::days(11)).await;
  h.refuse(ALICE);

  let summary = h.runner().send_unmatched().await.unwrap();
  assert_eq!((summary.processed, summary.sent, summary.errors), (1, 0, 1));
  assert_eq!(h.known_case("AAA111", ALICE).await, None);

  // Nothing left to expire, so nothing is retried.
  h.accept_all();
  let again = h.runner().send_unmatched().await.unwrap();
  assert_eq!(again.processed, 0);
  assert!(h.sent().is_empty());

  let events = h.store.run_events(summary.run_id).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].action, Action::SendExpired);
  assert!(events[0].error.as_deref().is_some_and(|e| e.contains("refused")), "{events:?}");
}

#[tokio::test]
async fn match_survives_gateway_failure() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();
  h.subscribe("4928456", ALICE, false, now()).await;
  h.refuse(ALICE);

  let summary = h.runner().send_unmatched().await.unwrap();
  assert_eq!((summary.sent, summary.errors), (0, 1));
  assert_eq!(h.known_case("4928456", ALICE).await, Some(true));
}

#[tokio::test]
async fn undecryptable_phone_changes_nothing() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();
  let garbage = EncryptedPhone::from_bytes(vec![0u8; 40]);
  let input = NewRequest::new("4928456", garbage.clone(), false).unwrap();
  h.store.add_request(input, now()).await.unwrap();

  let summary = h.runner().send_unmatched().await.unwrap();
  assert_eq!(summary.errors, 1);
  assert!(h.sent().is_empty());
  let req = h.store.get_request("4928456".into(), garbage).await.unwrap().unwrap();
  assert!(!req.known_case);
}

#[tokio::test]
async fn expiry_already_applied_is_skipped() {
  let h = Harness::new().await;
  h.subscribe("AAA111", ALICE, false, now() - TimeDelta::days(11)).await;
  let groups = h.store.find_expired(TimeDelta::days(10), now()).await.unwrap();
  assert_eq!(groups.len(), 1);

  let d = h.dispatcher_at(now());
  let first = d.dispatch_expiry(groups[0].clone()).await.unwrap();
  let second = d.dispatch_expiry(groups[0].clone()).await.unwrap();
  assert!(matches!(first, Delivery::Sent(_)));
  assert_eq!(second, Delivery::Skipped(Skip::AlreadyExpired));
  assert_eq!(h.sent().len(), 1);
}

#[tokio::test]
async fn withdrawn_request_is_not_announced() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();
  h.subscribe("4928456", ALICE, false, now()).await;
  let matched = h.store.find_newly_matched(now()).await.unwrap();

  h.store.delete_requests_for_phone(h.phone(ALICE)).await.unwrap();
  let outcome = h.dispatcher_at(now()).dispatch_match(matched[0].clone()).await.unwrap();
  assert_eq!(outcome, Delivery::Skipped(Skip::Withdrawn));
  assert!(h.sent().is_empty());
}

// ─── send-reminders ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reminders_are_sent_once_per_occurrence() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();
  h.subscribe("4928456", ALICE, true, now()).await;

  let first = h.runner().send_reminders().await.unwrap();
  let second = h.runner_at(now() + TimeDelta::hours(2)).send_reminders().await.unwrap();
  assert_eq!(first.sent, 1);
  assert_eq!(second.sent, 0);

  let sent = h.sent();
  assert_eq!(sent.len(), 1);
  assert!(sent[0].body.starts_with("Reminder: It appears you have a court hearing tomorrow at 2:00 PM at A."));
}

#[tokio::test]
async fn rescheduled_hearing_is_reminded_again() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();
  h.subscribe("4928456", ALICE, true, now()).await;
  h.runner().send_reminders().await.unwrap();

  let rescheduled = utc("2015-03-27T23:00:00Z");
  h.store.replace_hearings(vec![hearing("4928456", rescheduled, "A")]).await.unwrap();
  let summary = h.runner().send_reminders().await.unwrap();
  assert_eq!(summary.sent, 1);

  let sent = h.sent();
  assert_eq!(sent.len(), 2);
  assert!(sent[1].body.contains("tomorrow at 3:00 PM"), "{}", sent[1].body);

  let ledger = h.store.notifications_for("4928456".into(), h.phone(ALICE)).await.unwrap();
  let dates: Vec<_> = ledger.iter().map(|n| n.event_date).collect();
  assert_eq!(dates, vec![tomorrow_2pm(), rescheduled]);
}

#[tokio::test]
async fn one_gateway_failure_does_not_affect_the_rest() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();
  for phone in [ALICE, BOB, CAROL] {
    h.subscribe("4928456", phone, true, now()).await;
  }
  h.refuse(BOB);

  let summary = h.runner().send_reminders().await.unwrap();
  assert_eq!((summary.processed, summary.sent, summary.errors), (3, 2, 1));

  for (phone, expected) in [(ALICE, 1), (BOB, 0), (CAROL, 1)] {
    let ledger = h.store.notifications_for("4928456".into(), h.phone(phone)).await.unwrap();
    assert_eq!(ledger.len(), expected, "{phone}");
  }

  // The failed item is a candidate again and goes out once accepted.
  h.accept_all();
  let retry = h.runner().send_reminders().await.unwrap();
  assert_eq!((retry.processed, retry.sent), (1, 1));
  assert_eq!(h.sent().last().unwrap().to, BOB);
}

#[tokio::test]
async fn hearings_outside_tomorrow_are_not_reminded() {
  let h = Harness::new().await;
  h.store
    .replace_hearings(vec![
      hearing("TODAY01", utc("2015-03-26T23:00:00Z"), "A"),
      hearing("LATER01", utc("2015-03-28T18:00:00Z"), "A"),
    ])
    .await
    .unwrap();
  h.subscribe("TODAY01", ALICE, true, now()).await;
  h.subscribe("LATER01", ALICE, true, now()).await;

  let summary = h.runner().send_reminders().await.unwrap();
  assert_eq!(summary.processed, 0);
}

// ─── load ────────────────────────────────────────────────────────────────────

const CRIMINAL_URL: &str = "http://courts.test/acs_cr_event.csv";
const CIVIL_URL: &str = "http://courts.test/acs_mo_event.csv";

fn sources() -> Vec<Source> {
  vec![
    Source { url: CRIMINAL_URL.into(), kind: SourceKind::CriminalCases },
    Source { url: CIVIL_URL.into(), kind: SourceKind::CivilCases },
  ]
}

const CRIMINAL_CSV: &str = "\
03/27/2015,TURNER,FREDERICK,CNVCRT,2:00PM,4928456,Arraignment
03/27/2015,TURNER,FREDERICK,ROOM 9,2:00PM,4928456,Arraignment
03/30/2015,DOE,JANE,CNVCRT,9:00AM,4928457,Trial
";

const CIVIL_CSV: &str = "\
03/27/2015,SMITH,JOHN,x,ROOM 4,10:00 AM,3AN-15-0001CI,y,Parking,z
bad row
";

#[tokio::test]
async fn load_merges_sources_and_collapses_duplicates() {
  let h = Harness::new().await;
  let fetcher = ScriptedFetcher::default()
    .page(CRIMINAL_URL, CRIMINAL_CSV)
    .page(CIVIL_URL, CIVIL_CSV);

  let result = load(h.store.as_ref(), &fetcher, &alaska(now()), &sources()).await.unwrap();
  assert_eq!(result.sources_processed, 2);
  assert_eq!(result.records_parsed, 4);
  assert_eq!(result.records_skipped, 1);
  assert_eq!(result.records_written, 3);

  let rows = h.store.hearings_for_case("4928456".into()).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].room, "ROOM 9");
  assert_eq!(rows[0].date, tomorrow_2pm());
}

#[tokio::test]
async fn failed_parse_leaves_hearings_untouched() {
  let h = Harness::new().await;
  let good = ScriptedFetcher::default()
    .page(CRIMINAL_URL, CRIMINAL_CSV)
    .page(CIVIL_URL, CIVIL_CSV);
  load(h.store.as_ref(), &good, &alaska(now()), &sources()).await.unwrap();
  let before = h.store.list_hearings().await.unwrap();

  let broken = ScriptedFetcher::default()
    .page(CRIMINAL_URL, "03/28/2015,NEW,ROW,A,1:00PM,7777777,X\n")
    .page(CIVIL_URL, "<html>maintenance</html>");
  let err = load(h.store.as_ref(), &broken, &alaska(now()), &sources()).await.unwrap_err();
  assert!(matches!(err, Error::Parse(_)), "{err}");
  assert_eq!(h.store.list_hearings().await.unwrap(), before);
}

#[tokio::test]
async fn failed_fetch_leaves_hearings_untouched() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();

  let fetcher = ScriptedFetcher::default()
    .page(CRIMINAL_URL, CRIMINAL_CSV)
    .status(CIVIL_URL, 500);
  let err = load(h.store.as_ref(), &fetcher, &alaska(now()), &sources()).await.unwrap_err();
  assert!(matches!(err, Error::Fetch(FetchError::Status { status: 500, .. })), "{err}");
  assert_eq!(h.store.list_hearings().await.unwrap(), vec![hearing("4928456", tomorrow_2pm(), "A")]);
}

#[tokio::test]
async fn loaded_hearing_is_matched_on_next_pass() {
  let h = Harness::new().await;
  h.subscribe("3an-15-0001ci", BOB, false, now()).await;
  let fetcher = ScriptedFetcher::default()
    .page(CRIMINAL_URL, CRIMINAL_CSV)
    .page(CIVIL_URL, CIVIL_CSV);
  load(h.store.as_ref(), &fetcher, &alaska(now()), &sources()).await.unwrap();

  let summary = h.runner().send_unmatched().await.unwrap();
  assert_eq!(summary.sent, 1);
  assert_eq!(h.known_case("3AN-15-0001CI", BOB).await, Some(true));
  assert!(h.sent()[0].body.contains("for John Smith"), "{}", h.sent()[0].body);
}

// ─── audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn each_pass_is_recorded_with_its_items() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "CNVCRT")]).await.unwrap();
  h.subscribe("4928456", ALICE, false, now()).await;
  h.subscribe("ZZZ999", BOB, false, now() - TimeDelta::days(11)).await;
  h.subscribe("YYY888", BOB, false, now() - TimeDelta::days(11)).await;

  let summary = h.runner().send_unmatched().await.unwrap();

  let runs = h.store.recent_runs(5).await.unwrap();
  assert_eq!(runs.len(), 1);
  assert_eq!(runs[0].run_id, summary.run_id);
  assert_eq!(runs[0].job, Job::SendUnmatched);
  assert_eq!((runs[0].processed, runs[0].succeeded, runs[0].errors), (2, 2, 0));

  let events = h.store.run_events(summary.run_id).await.unwrap();
  let seen: Vec<_> = events.iter().map(|e| (e.action, e.case_id.as_str())).collect();
  assert_eq!(
    seen,
    vec![
      (Action::SendMatched, "4928456"),
      (Action::SendExpired, "ZZZ999"),
      (Action::SendExpired, "YYY888"),
    ]
  );
  assert_eq!(events[0].hearing_date, Some(tomorrow_2pm()));
  assert_eq!(events[0].hearing_location.as_deref(), Some("CNVCRT"));
  assert!(events.iter().all(|e| e.error.is_none()));
}

#[tokio::test]
async fn pass_with_nothing_due_is_still_recorded() {
  let h = Harness::new().await;
  h.store.replace_hearings(vec![hearing("4928456", tomorrow_2pm(), "A")]).await.unwrap();
  h.subscribe("4928456", ALICE, true, now()).await;
  h.store
    .record_reminder("4928456".into(), h.phone(ALICE), tomorrow_2pm(), now())
    .await
    .unwrap();

  let summary = h.runner().send_reminders().await.unwrap();
  assert_eq!(summary.processed, 0);
  assert!(h.store.run_events(summary.run_id).await.unwrap().is_empty());
  assert_eq!(h.store.recent_runs(1).await.unwrap()[0].job, Job::SendReminders);
}

#[tokio::test]
async fn load_is_recorded() {
  let h = Harness::new().await;
  let fetcher = ScriptedFetcher::default()
    .page(CRIMINAL_URL, CRIMINAL_CSV)
    .page(CIVIL_URL, CIVIL_CSV);
  load(h.store.as_ref(), &fetcher, &alaska(now()), &sources()).await.unwrap();

  let runs = h.store.recent_runs(1).await.unwrap();
  assert_eq!(runs[0].job, Job::Load);
  assert_eq!((runs[0].processed, runs[0].succeeded, runs[0].skipped), (4, 3, 1));
  assert_eq!(runs[0].recorded_at, now());
}
