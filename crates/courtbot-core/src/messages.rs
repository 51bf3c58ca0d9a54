//! Outbound message bodies.
//!
//! Every body is passed through [`normalize_spaces`] so the literal layout of
//! the format strings never leaks into the SMS character count.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::{clock::Clock, hearing::Hearing};

/// Court-specific strings interpolated into every message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageContext {
  pub court_name: String,
  pub public_url: String,
}

/// Sent once when an unmatched request first resolves to a hearing.
pub fn found_it_will_remind<C: Clock + ?Sized>(
  ctx: &MessageContext,
  hearing: &Hearing,
  clock: &C,
) -> String {
  let local = clock.localize(hearing.date);
  let today = local.date() == clock.today();
  let has_past = hearing.date < clock.now();

  let who = if hearing.defendant.trim().is_empty() {
    String::new()
  } else {
    format!(" for {}", cleanup_name(&hearing.defendant))
  };
  let when = if today { "today".to_owned() } else { format!("on {}", day_label(local.date())) };
  let future = if today || has_past { " future hearings" } else { "" };

  normalize_spaces(&format!(
    "Hello from the {court}. We found a case{who} scheduled {when} at {time}, at {room}.
     We will send you a courtesy reminder the day before{future}.",
    court = ctx.court_name,
    time = time_label(local),
    room = hearing.room,
  ))
}

/// Sent the day before a hearing.
pub fn reminder<C: Clock + ?Sized>(ctx: &MessageContext, hearing: &Hearing, clock: &C) -> String {
  normalize_spaces(&format!(
    "Reminder: It appears you have a court hearing tomorrow at {time} at {room}.
     You should confirm your hearing date and time by going to {url}.
     - {court}",
    time = time_label(clock.localize(hearing.date)),
    room = hearing.room,
    url = ctx.public_url,
    court = ctx.court_name,
  ))
}

/// Sent once per recipient when unmatched requests reach their TTL.
pub fn unable_to_find(ctx: &MessageContext, case_ids: &[String]) -> String {
  let plural = if case_ids.len() > 1 { "s" } else { "" };
  normalize_spaces(&format!(
    "We haven't been able to find your court case{plural}: {ids}.
     You can go to {url} for more information.
     - {court}",
    ids = case_ids.join(", "),
    url = ctx.public_url,
    court = ctx.court_name,
  ))
}

// ─── Formatting helpers ──────────────────────────────────────────────────────

/// Collapse every run of whitespace to a single space.
pub fn normalize_spaces(msg: &str) -> String {
  msg.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"BARBER, DIANA S."` → `"Barber, Diana S."`
pub fn cleanup_name(name: &str) -> String {
  name
    .split_whitespace()
    .map(|word| {
      let mut chars = word.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// `Fri, Mar 27th`
fn day_label(date: NaiveDate) -> String {
  let day = date.day();
  let suffix = match (day % 10, day % 100) {
    (_, 11..=13) => "th",
    (1, _) => "st",
    (2, _) => "nd",
    (3, _) => "rd",
    _ => "th",
  };
  format!("{} {day}{suffix}", date.format("%a, %b"))
}

/// `1:00 PM`
fn time_label(local: NaiveDateTime) -> String { local.format("%-I:%M %p").to_string() }
