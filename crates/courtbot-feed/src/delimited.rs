//! Headerless CSV adapters for the court's criminal and civil event exports.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use courtbot_core::{clock::Clock, hearing::Hearing};
use tracing::warn;

use crate::{ParsedFeed, Result, SourceKind};

/// Column positions within one export row.
struct Layout {
  date:         usize,
  last:         usize,
  first:        usize,
  room:         usize,
  time:         usize,
  id:           usize,
  hearing_type: usize,
}

const CRIMINAL: Layout =
  Layout { date: 0, last: 1, first: 2, room: 3, time: 4, id: 5, hearing_type: 6 };

const CIVIL: Layout =
  Layout { date: 0, last: 1, first: 2, room: 4, time: 5, id: 6, hearing_type: 8 };

pub(crate) fn parse<C: Clock + ?Sized>(
  kind: SourceKind,
  payload: &str,
  clock: &C,
) -> Result<ParsedFeed> {
  let layout = match kind {
    SourceKind::CriminalCases => &CRIMINAL,
    _ => &CIVIL,
  };

  let mut reader = csv::ReaderBuilder::new()
    .has_headers(false)
    .flexible(true)
    .trim(csv::Trim::All)
    .from_reader(payload.as_bytes());

  let mut feed = ParsedFeed::default();
  for (line, record) in reader.records().enumerate() {
    let hearing = match record {
      Ok(record) => read_row(layout, &record, clock),
      Err(e) => Err(e.to_string()),
    };
    match hearing {
      Ok(h) => feed.hearings.push(h),
      Err(reason) => {
        warn!(%kind, row = line + 1, %reason, "skipping feed row");
        feed.skipped += 1;
      }
    }
  }
  Ok(feed)
}

fn read_row<C: Clock + ?Sized>(
  layout: &Layout,
  record: &csv::StringRecord,
  clock: &C,
) -> std::result::Result<Hearing, String> {
  let field = |idx: usize| record.get(idx).unwrap_or("");
  let required = |idx: usize, name: &str| {
    let value = field(idx);
    if value.is_empty() { Err(format!("missing {name}")) } else { Ok(value) }
  };

  let date = required(layout.date, "date")?;
  let time = required(layout.time, "time")?;
  let id = required(layout.id, "case id")?;
  let room = required(layout.room, "room")?;

  let local = parse_local(date, time).ok_or_else(|| format!("unreadable date {date:?} {time:?}"))?;
  let date = clock
    .resolve(local)
    .ok_or_else(|| format!("local time {local} does not exist"))?;
  let case_id = feed_case_id(id)?;

  let defendant = format!("{} {}", field(layout.first), field(layout.last))
    .trim()
    .to_owned();
  let hearing_type = Some(field(layout.hearing_type))
    .filter(|s| !s.is_empty())
    .map(str::to_owned);

  Ok(Hearing { case_id, date, defendant, room: room.to_owned(), hearing_type })
}

/// Case ids are kept as the court publishes them, trimmed and upper-cased.
/// Citizen input is held to a stricter format; the feed is not.
pub(crate) fn feed_case_id(raw: &str) -> std::result::Result<String, String> {
  let id = raw.trim().to_ascii_uppercase();
  if id.is_empty() { Err("missing case id".to_owned()) } else { Ok(id) }
}

/// Combine an `MM/DD/YYYY` date with a 12- or 24-hour clock time.
pub(crate) fn parse_local(date: &str, time: &str) -> Option<NaiveDateTime> {
  let date = NaiveDate::parse_from_str(date, "%m/%d/%Y").ok()?;
  Some(date.and_time(parse_time(time)?))
}

/// Accepts `1:00PM`, `1:00 PM`, `1:00:00 PM`, `13:00` and `13:00:00`.
pub(crate) fn parse_time(time: &str) -> Option<NaiveTime> {
  let compact: String = time.split_whitespace().collect::<String>().to_ascii_uppercase();
  ["%I:%M%p", "%I:%M:%S%p", "%H:%M", "%H:%M:%S"]
    .iter()
    .find_map(|fmt| NaiveTime::parse_from_str(&compact, fmt).ok())
}
