//! Court feed sources and parse adapters for Courtbot.
//!
//! A feed is a list of [`Source`]s, each a URL bound to the adapter that
//! understands its payload. Adapters turn payloads into canonical
//! [`Hearing`] rows; the [`fetch`] module downloads them. Nothing here
//! touches the database.
//!
//! # Quick start
//!
//! ```no_run
//! use courtbot_core::clock::SystemClock;
//! use courtbot_feed::{SourceKind, parse, parse_sources};
//!
//! let sources = parse_sources("https://example.org/cr.csv|criminal_cases").unwrap();
//! assert_eq!(sources[0].kind, SourceKind::CriminalCases);
//!
//! let feed = parse(SourceKind::CriminalCases, "03/27/2015,TURNER,FREDERICK,CNVCRT,1:00PM,4928456,Arraignment", &SystemClock).unwrap();
//! println!("{} hearings, {} skipped", feed.hearings.len(), feed.skipped);
//! ```

mod calendar;
mod delimited;
pub mod error;
pub mod fetch;

use std::fmt;

use courtbot_core::{clock::Clock, hearing::Hearing};

pub use error::{FetchError, ParseError, Result, SourceError};

// ─── Sources ─────────────────────────────────────────────────────────────────

/// Which adapter reads a source's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceKind {
  /// Headerless CSV: `date, last, first, room, time, id, type`.
  CriminalCases,
  /// Headerless CSV: `date, last, first, _, room, time, id, _, violation, _`.
  #[default]
  CivilCases,
  /// An HTML page of `<pre>` calendar blocks.
  CalendarHtml,
}

impl SourceKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::CriminalCases => "criminal_cases",
      Self::CivilCases => "civil_cases",
      Self::CalendarHtml => "calendar_html",
    }
  }

  fn from_name(s: &str) -> Option<Self> {
    match s {
      "criminal_cases" => Some(Self::CriminalCases),
      "civil_cases" => Some(Self::CivilCases),
      "calendar_html" => Some(Self::CalendarHtml),
      _ => None,
    }
  }
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One feed location and the adapter for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
  pub url:  String,
  pub kind: SourceKind,
}

/// Parse a comma-separated `url[|kind]` list.
///
/// Blank entries are ignored; a missing kind means
/// [`SourceKind::CivilCases`].
pub fn parse_sources(list: &str) -> Result<Vec<Source>, SourceError> {
  let mut sources = Vec::new();
  for entry in list.split(',') {
    let (url, kind) = match entry.split_once('|') {
      Some((url, kind)) => (url.trim(), Some(kind.trim())),
      None => (entry.trim(), None),
    };
    if url.is_empty() {
      continue;
    }
    let kind = match kind {
      None | Some("") => SourceKind::default(),
      Some(name) => SourceKind::from_name(name).ok_or_else(|| SourceError::UnknownKind {
        url:  url.to_owned(),
        kind: name.to_owned(),
      })?,
    };
    sources.push(Source { url: url.to_owned(), kind });
  }

  if sources.is_empty() {
    return Err(SourceError::Empty);
  }
  Ok(sources)
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Hearings decoded from one payload.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
  /// Valid rows, in feed order.
  pub hearings: Vec<Hearing>,
  /// Rows dropped for a missing field or an unreadable date.
  pub skipped:  usize,
}

/// Decode `payload` with the adapter for `kind`.
///
/// Local dates and times are read in the court's zone as seen by `clock`.
/// A payload with no valid rows at all is an error; individual bad rows are
/// counted in [`ParsedFeed::skipped`].
pub fn parse<C: Clock + ?Sized>(kind: SourceKind, payload: &str, clock: &C) -> Result<ParsedFeed> {
  let feed = match kind {
    SourceKind::CriminalCases | SourceKind::CivilCases => delimited::parse(kind, payload, clock)?,
    SourceKind::CalendarHtml => calendar::parse(payload, clock)?,
  };

  if feed.hearings.is_empty() {
    return Err(ParseError::NoRecords { kind, skipped: feed.skipped });
  }
  Ok(feed)
}
