//! Matcher result types and the pure reductions applied to them.
//!
//! The store runs the queries; the functions here shape the rows into the
//! units the dispatcher works on.

use std::collections::{BTreeMap, btree_map::Entry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{codec::EncryptedPhone, hearing::Hearing, request::Request};

// ─── Candidate types ─────────────────────────────────────────────────────────

/// A request paired with the hearing it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
  pub request: Request,
  pub hearing: Hearing,
}

/// Unmatched requests past their TTL, for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredGroup {
  pub phone:    EncryptedPhone,
  pub case_ids: Vec<String>,
}

// ─── Grouper ─────────────────────────────────────────────────────────────────

/// Merge entries that share a phone into one entry per phone.
///
/// Case ids are deduplicated and put in [`order_case_ids`] order; output is
/// ordered by phone. A pass therefore sends at most one expiry message per
/// recipient.
pub fn group_expired(entries: impl IntoIterator<Item = ExpiredGroup>) -> Vec<ExpiredGroup> {
  let mut by_phone: BTreeMap<EncryptedPhone, Vec<String>> = BTreeMap::new();
  for entry in entries {
    by_phone.entry(entry.phone).or_default().extend(entry.case_ids);
  }
  by_phone
    .into_iter()
    .map(|(phone, mut case_ids)| {
      order_case_ids(&mut case_ids);
      ExpiredGroup { phone, case_ids }
    })
    .collect()
}

/// Deduplicate and sort case ids descending, the order expiry messages
/// list them in.
pub fn order_case_ids(case_ids: &mut Vec<String>) {
  case_ids.sort_unstable_by(|a, b| b.cmp(a));
  case_ids.dedup();
}

// ─── Newly matched ───────────────────────────────────────────────────────────

/// Reduce request ⨝ hearing rows to a single match per request.
///
/// The earliest hearing at or after `now` wins; when every hearing for the
/// case is in the past, the most recent one is used.
pub fn pick_hearing_per_request(rows: Vec<Match>, now: DateTime<Utc>) -> Vec<Match> {
  let mut picked: BTreeMap<(String, EncryptedPhone), Match> = BTreeMap::new();
  for row in rows {
    let key = (row.request.case_id.clone(), row.request.phone.clone());
    match picked.entry(key) {
      Entry::Vacant(slot) => {
        slot.insert(row);
      }
      Entry::Occupied(mut slot) => {
        if prefer(&row.hearing, &slot.get().hearing, now) {
          slot.insert(row);
        }
      }
    }
  }
  picked.into_values().collect()
}

fn prefer(candidate: &Hearing, current: &Hearing, now: DateTime<Utc>) -> bool {
  match (candidate.date >= now, current.date >= now) {
    (true, false) => true,
    (false, true) => false,
    (true, true) => candidate.date < current.date,
    (false, false) => candidate.date > current.date,
  }
}
