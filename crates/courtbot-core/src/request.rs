//! Request — a citizen's subscription to notifications about one case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, codec::EncryptedPhone};

/// Shortest case identifier accepted from a citizen.
pub const CASE_ID_MIN_LEN: usize = 6;
/// Longest case identifier accepted from a citizen.
pub const CASE_ID_MAX_LEN: usize = 25;

/// A persisted subscription, unique on `(case_id, phone)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
  pub case_id:    String,
  pub phone:      EncryptedPhone,
  /// Whether `case_id` has resolved to a hearing. Once `true`, never `false`.
  pub known_case: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Input for [`CourtStore::add_request`](crate::store::CourtStore::add_request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
  pub case_id:    String,
  pub phone:      EncryptedPhone,
  pub known_case: bool,
}

impl NewRequest {
  /// Build a request, normalising and validating `case_id`.
  pub fn new(case_id: &str, phone: EncryptedPhone, known_case: bool) -> Result<Self> {
    Ok(Self { case_id: normalize_case_id(case_id)?, phone, known_case })
  }
}

/// Trim and upper-case a citizen-supplied case identifier.
///
/// Valid identifiers are 6 to 25 ASCII letters, digits or hyphens.
pub fn normalize_case_id(raw: &str) -> Result<String> {
  let id = raw.trim().to_ascii_uppercase();
  let len_ok = (CASE_ID_MIN_LEN..=CASE_ID_MAX_LEN).contains(&id.len());
  let chars_ok = id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
  if len_ok && chars_ok {
    Ok(id)
  } else {
    Err(Error::InvalidCaseId(raw.to_owned()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalizes_whitespace_and_case() {
    assert_eq!(normalize_case_id("  ab-12345 ").unwrap(), "AB-12345");
  }

  #[test]
  fn rejects_short_long_and_punctuated_ids() {
    assert!(normalize_case_id("12345").is_err());
    assert!(normalize_case_id(&"9".repeat(26)).is_err());
    assert!(normalize_case_id("1234 5678").is_err());
    assert!(normalize_case_id("12345;DROP").is_err());
  }
}
