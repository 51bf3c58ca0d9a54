//! [`SqliteStore`] — the SQLite implementation of [`CourtStore`].

use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use courtbot_core::{
  audit::{RequestEvent, RunRecord},
  codec::EncryptedPhone,
  hearing::Hearing,
  matching::{ExpiredGroup, Match, group_expired, order_case_ids, pick_hearing_per_request},
  request::{NewRequest, Request},
  store::{CourtStore, MatchUpdate, Notification},
};

use crate::{
  Result,
  encode::{
    RawEvent, RawHearing, RawMatch, RawNotification, RawRequest, RawRun, decode_phone,
    encode_dt, encode_phone,
  },
  schema::{HEARINGS_DDL, SCHEMA, STAGING_DDL, SWAP_COPY},
};

// ─── Row mappers ─────────────────────────────────────────────────────────────

const MATCH_SELECT: &str = "
SELECT r.case_id, r.phone, r.known_case, r.created_at, r.updated_at,
       h.date, h.defendant, h.room, h.type
FROM requests r
JOIN hearings h ON h.case_id = r.case_id";

fn request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRequest> {
  Ok(RawRequest {
    case_id:    row.get(0)?,
    phone:      row.get(1)?,
    known_case: row.get(2)?,
    created_at: row.get(3)?,
    updated_at: row.get(4)?,
  })
}

fn match_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMatch> {
  Ok(RawMatch {
    request:      request_from_row(row)?,
    date:         row.get(5)?,
    defendant:    row.get(6)?,
    room:         row.get(7)?,
    hearing_type: row.get(8)?,
  })
}

const EVENT_SELECT: &str = "
SELECT run_id, case_id, phone, hearing_date, hearing_location, action, error, created_at
FROM request_events";

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
  Ok(RawEvent {
    run_id:           row.get(0)?,
    case_id:          row.get(1)?,
    phone:            row.get(2)?,
    hearing_date:     row.get(3)?,
    hearing_location: row.get(4)?,
    action:           row.get(5)?,
    error:            row.get(6)?,
    created_at:       row.get(7)?,
  })
}

fn insert_event(conn: &rusqlite::Connection, e: &RawEvent) -> rusqlite::Result<usize> {
  conn.execute(
    "INSERT INTO request_events
       (run_id, case_id, phone, hearing_date, hearing_location, action, error, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    rusqlite::params![
      e.run_id,
      e.case_id,
      e.phone,
      e.hearing_date,
      e.hearing_location,
      e.action,
      e.error,
      e.created_at,
    ],
  )
}

fn hearing_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawHearing> {
  Ok(RawHearing {
    case_id:      row.get(0)?,
    date:         row.get(1)?,
    defendant:    row.get(2)?,
    room:         row.get(3)?,
    hearing_type: row.get(4)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// The Courtbot canonical store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(HEARINGS_DDL)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Load every hearing into the connection-scoped staging table, in order.
  pub(crate) async fn stage_hearings(&self, rows: Vec<RawHearing>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(STAGING_DDL)?;
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO temp.hearings_staging (case_id, date, defendant, room, type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for row in &rows {
            stmt.execute(rusqlite::params![
              row.case_id,
              row.date,
              row.defendant,
              row.room,
              row.hearing_type,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Drop and repopulate `hearings` from staging in one transaction.
  pub(crate) async fn swap_hearings(&self) -> Result<usize> {
    let written = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        tx.execute_batch("DROP TABLE IF EXISTS hearings;")?;
        tx.execute_batch(HEARINGS_DDL)?;
        let written = tx.execute(SWAP_COPY, [])?;
        tx.execute_batch("DROP TABLE temp.hearings_staging;")?;
        tx.commit()?;
        Ok(written)
      })
      .await?;
    Ok(written)
  }

  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<usize> {
    Ok(self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await?)
  }

  async fn query_events(&self, sql: String, param: String) -> Result<Vec<RequestEvent>> {
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![param], event_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn query_matches(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Vec<Match>> {
    let raws: Vec<RawMatch> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), match_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMatch::into_match).collect()
  }
}

// ─── CourtStore impl ─────────────────────────────────────────────────────────

impl CourtStore for SqliteStore {
  type Error = crate::Error;

  // ── Hearings ──────────────────────────────────────────────────────────────

  async fn replace_hearings(&self, hearings: Vec<Hearing>) -> Result<usize> {
    let rows = hearings.into_iter().map(RawHearing::from_hearing).collect();
    self.stage_hearings(rows).await?;
    self.swap_hearings().await
  }

  async fn hearings_for_case(&self, case_id: String) -> Result<Vec<Hearing>> {
    let raws: Vec<RawHearing> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT case_id, date, defendant, room, type FROM hearings
           WHERE case_id = ?1 ORDER BY date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![case_id], hearing_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHearing::into_hearing).collect()
  }

  async fn list_hearings(&self) -> Result<Vec<Hearing>> {
    let raws: Vec<RawHearing> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT case_id, date, defendant, room, type FROM hearings
           ORDER BY case_id, date",
        )?;
        let rows = stmt
          .query_map([], hearing_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHearing::into_hearing).collect()
  }

  // ── Requests ──────────────────────────────────────────────────────────────

  async fn add_request(&self, input: NewRequest, now: DateTime<Utc>) -> Result<Request> {
    let phone_str = encode_phone(&input.phone);
    let now_str   = encode_dt(now);

    let raw: RawRequest = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "INSERT INTO requests (case_id, phone, known_case, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)
           ON CONFLICT (case_id, phone) DO UPDATE SET
             updated_at = excluded.updated_at,
             known_case = MAX(requests.known_case, excluded.known_case)
           RETURNING case_id, phone, known_case, created_at, updated_at",
          rusqlite::params![input.case_id, phone_str, input.known_case, now_str],
          request_from_row,
        )?)
      })
      .await?;

    raw.into_request()
  }

  async fn get_request(
    &self,
    case_id: String,
    phone:   EncryptedPhone,
  ) -> Result<Option<Request>> {
    let phone_str = encode_phone(&phone);

    let raw: Option<RawRequest> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT case_id, phone, known_case, created_at, updated_at
               FROM requests WHERE case_id = ?1 AND phone = ?2",
              rusqlite::params![case_id, phone_str],
              request_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRequest::into_request).transpose()
  }

  async fn delete_requests_for_phone(&self, phone: EncryptedPhone) -> Result<Vec<String>> {
    let phone_str = encode_phone(&phone);

    let mut deleted: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("DELETE FROM requests WHERE phone = ?1 RETURNING case_id")?;
        let rows = stmt
          .query_map(rusqlite::params![phone_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    deleted.sort();
    Ok(deleted)
  }

  // ── Matcher ───────────────────────────────────────────────────────────────

  async fn find_newly_matched(&self, now: DateTime<Utc>) -> Result<Vec<Match>> {
    let sql = format!(
      "{MATCH_SELECT}
       WHERE r.known_case = 0
       ORDER BY r.case_id, r.phone, h.date"
    );
    let rows = self.query_matches(sql, Vec::new()).await?;
    Ok(pick_hearing_per_request(rows, now))
  }

  async fn find_expired(&self, ttl: TimeDelta, now: DateTime<Utc>) -> Result<Vec<ExpiredGroup>> {
    let cutoff_str = encode_dt(now - ttl);

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT r.phone, r.case_id
           FROM requests r
           WHERE r.known_case = 0
             AND r.updated_at < ?1
             AND NOT EXISTS (SELECT 1 FROM hearings h WHERE h.case_id = r.case_id)",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![cutoff_str], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let entries = rows
      .into_iter()
      .map(|(phone, case_id)| {
        Ok(ExpiredGroup { phone: decode_phone(&phone)?, case_ids: vec![case_id] })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(group_expired(entries))
  }

  async fn find_due_reminders(
    &self,
    start: DateTime<Utc>,
    end:   DateTime<Utc>,
  ) -> Result<Vec<Match>> {
    let sql = format!(
      "{MATCH_SELECT}
       WHERE r.known_case = 1
         AND h.date >= ?1
         AND h.date < ?2
         AND NOT EXISTS (
           SELECT 1 FROM notifications n
           WHERE n.case_id = r.case_id
             AND n.phone = r.phone
             AND n.event_date = h.date
         )
       ORDER BY h.date, r.case_id, r.phone"
    );
    self.query_matches(sql, vec![encode_dt(start), encode_dt(end)]).await
  }

  // ── Dispatcher writes ─────────────────────────────────────────────────────

  async fn apply_match(
    &self,
    case_id: String,
    phone:   EncryptedPhone,
    now:     DateTime<Utc>,
  ) -> Result<MatchUpdate> {
    let phone_str = encode_phone(&phone);
    let now_str   = encode_dt(now);

    let update = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE requests SET known_case = 1, updated_at = ?3
           WHERE case_id = ?1 AND phone = ?2 AND known_case = 0",
          rusqlite::params![case_id, phone_str, now_str],
        )?;
        let update = if changed > 0 {
          MatchUpdate::Applied
        } else {
          let exists = tx
            .query_row(
              "SELECT 1 FROM requests WHERE case_id = ?1 AND phone = ?2",
              rusqlite::params![case_id, phone_str],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if exists { MatchUpdate::AlreadyMatched } else { MatchUpdate::Missing }
        };
        tx.commit()?;
        Ok(update)
      })
      .await?;

    Ok(update)
  }

  async fn apply_expiry(
    &self,
    phone:    EncryptedPhone,
    case_ids: Vec<String>,
  ) -> Result<Vec<String>> {
    let phone_str = encode_phone(&phone);

    let mut deleted: Vec<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut deleted = Vec::new();
        {
          // Re-check both guards: a concurrent pass may have matched the
          // request, or a load may have brought its hearing in.
          let mut stmt = tx.prepare(
            "DELETE FROM requests
             WHERE phone = ?1 AND case_id = ?2 AND known_case = 0
               AND NOT EXISTS (
                 SELECT 1 FROM hearings h WHERE h.case_id = requests.case_id
               )",
          )?;
          for case_id in case_ids {
            if stmt.execute(rusqlite::params![phone_str, case_id])? > 0 {
              deleted.push(case_id);
            }
          }
        }
        tx.commit()?;
        Ok(deleted)
      })
      .await?;

    order_case_ids(&mut deleted);
    Ok(deleted)
  }

  async fn record_reminder(
    &self,
    case_id:    String,
    phone:      EncryptedPhone,
    event_date: DateTime<Utc>,
    now:        DateTime<Utc>,
  ) -> Result<bool> {
    let phone_str = encode_phone(&phone);
    let event_str = encode_dt(event_date);
    let now_str   = encode_dt(now);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO notifications (case_id, phone, event_date, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![case_id, phone_str, event_str, now_str],
        )?)
      })
      .await?;

    Ok(inserted == 1)
  }

  async fn release_reminder(
    &self,
    case_id:    String,
    phone:      EncryptedPhone,
    event_date: DateTime<Utc>,
  ) -> Result<bool> {
    let phone_str = encode_phone(&phone);
    let event_str = encode_dt(event_date);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM notifications
           WHERE case_id = ?1 AND phone = ?2 AND event_date = ?3",
          rusqlite::params![case_id, phone_str, event_str],
        )?)
      })
      .await?;

    Ok(removed > 0)
  }

  async fn notifications_for(
    &self,
    case_id: String,
    phone:   EncryptedPhone,
  ) -> Result<Vec<Notification>> {
    let phone_str = encode_phone(&phone);

    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT case_id, phone, event_date, created_at FROM notifications
           WHERE case_id = ?1 AND phone = ?2 ORDER BY event_date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![case_id, phone_str], |row| {
            Ok(RawNotification {
              case_id:    row.get(0)?,
              phone:      row.get(1)?,
              event_date: row.get(2)?,
              created_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNotification::into_notification).collect()
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn record_run(&self, run: RunRecord, events: Vec<RequestEvent>) -> Result<()> {
    let raw_run = RawRun::from_record(&run);
    let raw_events: Vec<RawEvent> = events.into_iter().map(RawEvent::from_event).collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO run_log
             (run_id, job, processed, succeeded, skipped, errors, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            raw_run.run_id,
            raw_run.job,
            raw_run.processed,
            raw_run.succeeded,
            raw_run.skipped,
            raw_run.errors,
            raw_run.recorded_at,
          ],
        )?;
        for event in &raw_events {
          insert_event(&tx, event)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn record_event(&self, event: RequestEvent) -> Result<()> {
    let raw = RawEvent::from_event(event);
    self.conn.call(move |conn| Ok(insert_event(conn, &raw)?)).await?;
    Ok(())
  }

  async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT run_id, job, processed, succeeded, skipped, errors, recorded_at
           FROM run_log ORDER BY recorded_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], |row| {
            Ok(RawRun {
              run_id:      row.get(0)?,
              job:         row.get(1)?,
              processed:   row.get(2)?,
              succeeded:   row.get(3)?,
              skipped:     row.get(4)?,
              errors:      row.get(5)?,
              recorded_at: row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRun::into_record).collect()
  }

  async fn run_events(&self, run_id: Uuid) -> Result<Vec<RequestEvent>> {
    let sql = format!("{EVENT_SELECT} WHERE run_id = ?1 ORDER BY id");
    self.query_events(sql, run_id.to_string()).await
  }

  async fn case_events(&self, case_id: String) -> Result<Vec<RequestEvent>> {
    let sql = format!("{EVENT_SELECT} WHERE case_id = ?1 ORDER BY id");
    self.query_events(sql, case_id).await
  }
}
