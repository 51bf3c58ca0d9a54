//! Hearing — one scheduled court event as published by the court feed.
//!
//! Hearings are owned by the ingestion pipeline. The whole table is replaced
//! on every successful load; nothing else ever writes to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A canonical hearing row.
///
/// The natural key is `(case_id, date)`: a case may have several hearings, but
/// two feed rows for the same case at the same instant describe one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hearing {
  pub case_id:      String,
  /// Absolute instant of the hearing, normalised to UTC.
  pub date:         DateTime<Utc>,
  /// Defendant name as printed in the feed. Empty when the feed has none.
  pub defendant:    String,
  pub room:         String,
  /// Hearing category or violation text, when the feed supplies one.
  pub hearing_type: Option<String>,
}
