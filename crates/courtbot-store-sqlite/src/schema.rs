//! SQL schema for the Courtbot SQLite store.
//!
//! Executed once at connection startup. `hearings` is kept in its own DDL
//! constant because the ingestion swap drops and recreates it.

/// Requests, the notification ledger and their guards; idempotent thanks to
/// `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS requests (
    case_id     TEXT NOT NULL,
    phone       TEXT NOT NULL,     -- hex of the deterministic ciphertext
    known_case  INTEGER NOT NULL DEFAULT 0 CHECK (known_case IN (0, 1)),
    created_at  TEXT NOT NULL,     -- fixed-width RFC 3339 UTC
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (case_id, phone)
);

CREATE INDEX IF NOT EXISTS requests_phone_idx ON requests(phone);

-- A matched request never goes back to unmatched.
CREATE TRIGGER IF NOT EXISTS requests_known_case_monotonic
BEFORE UPDATE OF known_case ON requests
WHEN OLD.known_case = 1 AND NEW.known_case = 0
BEGIN
    SELECT RAISE(ABORT, 'known_case cannot revert to false');
END;

-- One row per reminder sent for a hearing occurrence.
-- Only ever inserted by the dispatcher; never updated.
CREATE TABLE IF NOT EXISTS notifications (
    case_id     TEXT NOT NULL,
    phone       TEXT NOT NULL,
    event_date  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (case_id, phone, event_date),
    FOREIGN KEY (case_id, phone)
        REFERENCES requests(case_id, phone) ON DELETE CASCADE
);

-- Append-only audit of job passes and the requests they touched. Events
-- outlive the requests they describe, so there is no FK to requests.
CREATE TABLE IF NOT EXISTS run_log (
    run_id      TEXT PRIMARY KEY,  -- UUID v4
    job         TEXT NOT NULL,
    processed   INTEGER NOT NULL,
    succeeded   INTEGER NOT NULL,
    skipped     INTEGER NOT NULL,
    errors      INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS request_events (
    id               INTEGER PRIMARY KEY,
    run_id           TEXT REFERENCES run_log(run_id) ON DELETE CASCADE,
    case_id          TEXT NOT NULL,
    phone            TEXT NOT NULL,
    hearing_date     TEXT,
    hearing_location TEXT,
    action           TEXT NOT NULL,
    error            TEXT,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS request_events_run_idx ON request_events(run_id);
CREATE INDEX IF NOT EXISTS request_events_case_idx ON request_events(case_id);

PRAGMA user_version = 2;
";

/// The canonical hearings table. Replaced wholesale by each ingestion run.
pub const HEARINGS_DDL: &str = "
CREATE TABLE IF NOT EXISTS hearings (
    case_id    TEXT NOT NULL,
    date       TEXT NOT NULL,
    defendant  TEXT NOT NULL DEFAULT '',
    room       TEXT NOT NULL,
    type       TEXT,
    PRIMARY KEY (case_id, date)
);

CREATE INDEX IF NOT EXISTS hearings_date_idx ON hearings(date);
";

/// Connection-scoped staging table; `seq` preserves feed order.
pub const STAGING_DDL: &str = "
DROP TABLE IF EXISTS temp.hearings_staging;
CREATE TEMP TABLE hearings_staging (
    seq        INTEGER PRIMARY KEY,
    case_id    TEXT NOT NULL,
    date       TEXT NOT NULL,
    defendant  TEXT NOT NULL,
    room       TEXT NOT NULL,
    type       TEXT
);
";

/// Copy staged rows newest-first so that, with duplicates ignored, the last
/// feed row for a natural key is the one kept.
pub const SWAP_COPY: &str = "
INSERT OR IGNORE INTO hearings (case_id, date, defendant, room, type)
SELECT case_id, date, defendant, room, type
FROM temp.hearings_staging
ORDER BY seq DESC
";
