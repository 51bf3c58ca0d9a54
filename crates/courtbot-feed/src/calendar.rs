//! HTML court calendar adapter.
//!
//! The calendar is a page of `<pre>` blocks laid out for printing. Each block
//! is read line by line, accumulating the most recent date, time, courtroom
//! and docket; a hearing is emitted whenever all four are known.
//!
//! ```text
//! Friday, Mar. 27
//! 1:00 PM
//! Courtroom 2A    Judge Smith
//!   1234-3-15  Arraignment
//!   1235-3-15  Status Conference
//! ```

use std::{collections::HashSet, sync::LazyLock};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use courtbot_core::{clock::Clock, hearing::Hearing};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::warn;

use crate::{
  ParseError, ParsedFeed, Result, SourceKind,
  delimited::{feed_case_id, parse_time},
};

static DATE_LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^(?:Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday),\s+([A-Za-z]{3})\.\s+(\d{1,2})",
  )
  .expect("date pattern")
});

static TIME_LINE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(\d{1,2}:\d{2})\s+(AM|PM)").expect("time pattern"));

static DOCKET: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(\d{2,4}-\d{1,2}-\d{2})\s+(.*)$").expect("docket pattern")
});

static COLUMN_GAP: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\s{2}").expect("gap pattern"));

static PRE: LazyLock<Selector> =
  LazyLock::new(|| Selector::parse("pre").expect("pre selector"));

/// Fields accumulated while walking one block.
#[derive(Default)]
struct Cursor {
  day:      Option<(String, u32)>,
  time:     Option<String>,
  location: Option<String>,
  docket:   Option<(String, String)>,
}

pub(crate) fn parse<C: Clock + ?Sized>(payload: &str, clock: &C) -> Result<ParsedFeed> {
  let document = Html::parse_document(payload);
  let blocks: Vec<String> = document
    .select(&PRE)
    .map(|pre| pre.text().collect::<String>())
    .collect();

  if blocks.is_empty() {
    return Err(ParseError::Malformed {
      kind:   SourceKind::CalendarHtml,
      reason: "no <pre> calendar blocks".into(),
    });
  }

  let mut feed = ParsedFeed::default();
  for block in &blocks {
    parse_block(block, clock, &mut feed);
  }
  Ok(feed)
}

fn parse_block<C: Clock + ?Sized>(block: &str, clock: &C, feed: &mut ParsedFeed) {
  let mut cur = Cursor::default();
  let mut expect_location = false;
  let mut seen: HashSet<String> = HashSet::new();

  for line in block.lines() {
    if line.is_empty() {
      cur = Cursor::default();
    }

    if let Some(caps) = DATE_LINE.captures(line) {
      let day = caps[2].parse().unwrap_or(0);
      cur.day = Some((caps[1].to_owned(), day));
    }

    if let Some(caps) = TIME_LINE.captures(line) {
      cur.time = Some(format!("{} {}", &caps[1], &caps[2]));
      expect_location = true;
    } else if expect_location {
      if let Some(gap) = COLUMN_GAP.find(line) {
        cur.location = Some(line[..gap.start()].trim().to_owned());
        expect_location = false;
      }
    }

    if let Some(caps) = DOCKET.captures(line) {
      cur.docket = Some((caps[1].to_owned(), caps[2].trim().to_owned()));
    }

    let (Some((month, day)), Some(time), Some(location), Some((docket, category))) =
      (&cur.day, &cur.time, &cur.location, &cur.docket)
    else {
      continue;
    };
    if location.is_empty() || category.is_empty() || seen.contains(docket) {
      continue;
    }
    seen.insert(docket.clone());

    match to_hearing(month, *day, time, location, docket, category, clock) {
      Ok(h) => feed.hearings.push(h),
      Err(reason) => {
        warn!(kind = %SourceKind::CalendarHtml, %docket, %reason, "skipping calendar entry");
        feed.skipped += 1;
      }
    }
  }
}

fn to_hearing<C: Clock + ?Sized>(
  month: &str,
  day: u32,
  time: &str,
  location: &str,
  docket: &str,
  category: &str,
  clock: &C,
) -> std::result::Result<Hearing, String> {
  let date = nearest_date(month, day, clock.today())
    .ok_or_else(|| format!("unreadable date {month}. {day}"))?;
  let time = parse_time(time).ok_or_else(|| format!("unreadable time {time:?}"))?;
  let local = NaiveDateTime::new(date, time);
  let date = clock
    .resolve(local)
    .ok_or_else(|| format!("local time {local} does not exist"))?;

  Ok(Hearing {
    case_id: feed_case_id(docket)?,
    date,
    defendant: String::new(),
    room: location.to_owned(),
    hearing_type: Some(category.to_owned()),
  })
}

/// The calendar omits the year; pick the one that puts the date closest to
/// `today`.
fn nearest_date(month: &str, day: u32, today: NaiveDate) -> Option<NaiveDate> {
  let year = today.year();
  [year - 1, year, year + 1]
    .into_iter()
    .filter_map(|y| NaiveDate::parse_from_str(&format!("{y} {month} {day}"), "%Y %b %d").ok())
    .min_by_key(|d| (*d - today).num_days().abs())
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, FixedOffset, Utc};
  use courtbot_core::clock::FixedClock;

  use super::*;

  fn clock_at(now: &str) -> FixedClock {
    FixedClock::new(
      DateTime::parse_from_rfc3339(now).unwrap().with_timezone(&Utc),
      FixedOffset::west_opt(5 * 3600).unwrap(),
    )
  }

  const PAGE: &str = "<html><body><pre>
Friday, Mar. 27
1:00 PM
Courtroom 2A    Judge Smith
   1234-3-15  Arraignment
   1235-3-15  Status Conference
   1234-3-15  Arraignment

Monday, Mar. 30
</pre>
<pre>
Monday, Mar. 30
9:30 AM
Courtroom 1     Judge Jones
   88-12-15   Change of Plea
</pre></body></html>";

  #[test]
  fn emits_one_hearing_per_docket_line() {
    let feed = parse(PAGE, &clock_at("2015-03-20T12:00:00Z")).unwrap();
    assert_eq!(feed.skipped, 0);

    let rows: Vec<_> = feed
      .hearings
      .iter()
      .map(|h| (h.case_id.as_str(), h.room.as_str(), h.hearing_type.as_deref()))
      .collect();
    assert_eq!(rows, vec![
      ("1234-3-15", "Courtroom 2A", Some("Arraignment")),
      ("1235-3-15", "Courtroom 2A", Some("Status Conference")),
      ("88-12-15", "Courtroom 1", Some("Change of Plea")),
    ]);

    assert_eq!(
      feed.hearings[0].date,
      DateTime::parse_from_rfc3339("2015-03-27T18:00:00Z").unwrap().with_timezone(&Utc)
    );
    assert_eq!(
      feed.hearings[2].date,
      DateTime::parse_from_rfc3339("2015-03-30T14:30:00Z").unwrap().with_timezone(&Utc)
    );
    assert!(feed.hearings.iter().all(|h| h.defendant.is_empty()));
  }

  #[test]
  fn calendar_kind_is_routed_through_parse() {
    let feed = crate::parse(SourceKind::CalendarHtml, PAGE, &clock_at("2015-03-20T12:00:00Z")).unwrap();
    assert_eq!(feed.hearings.len(), 3);
  }

  #[test]
  fn blank_line_resets_the_block_state() {
    let page = "<pre>
Friday, Mar. 27
1:00 PM
Courtroom 2A    Judge Smith

   1234-3-15  Arraignment
</pre>";
    let err = crate::parse(SourceKind::CalendarHtml, page, &clock_at("2015-03-20T12:00:00Z"));
    assert!(matches!(err, Err(ParseError::NoRecords { .. })));
  }

  #[test]
  fn year_is_inferred_across_new_year() {
    let today = NaiveDate::from_ymd_opt(2015, 12, 28).unwrap();
    assert_eq!(nearest_date("Jan", 4, today), NaiveDate::from_ymd_opt(2016, 1, 4));
    assert_eq!(nearest_date("Dec", 30, today), NaiveDate::from_ymd_opt(2015, 12, 30));

    let today = NaiveDate::from_ymd_opt(2016, 1, 2).unwrap();
    assert_eq!(nearest_date("Dec", 30, today), NaiveDate::from_ymd_opt(2015, 12, 30));
  }

  #[test]
  fn page_without_pre_blocks_is_malformed() {
    let err = parse("<html><body><p>closed</p></body></html>", &clock_at("2015-03-20T12:00:00Z"));
    assert!(matches!(err, Err(ParseError::Malformed { .. })));
  }
}
