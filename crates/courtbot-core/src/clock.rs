//! Wall-clock and court time zone abstraction.
//!
//! Feed timestamps are local court times and "tomorrow" is a local-calendar
//! notion, so every component that needs either goes through a [`Clock`]. The
//! production clock follows the process time zone (`TZ`); tests pin both the
//! instant and the offset with [`FixedClock`].

use chrono::{
  DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset,
  TimeDelta, TimeZone, Utc,
};

/// Source of "now" plus conversion between UTC instants and court-local time.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;

  /// Court-local wall time of `instant`.
  fn localize(&self, instant: DateTime<Utc>) -> NaiveDateTime;

  /// The instant a court-local wall time refers to. `None` when the local time
  /// does not exist (DST gap); the earliest instant when it is ambiguous.
  fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Utc>>;

  /// Court-local calendar date of [`Clock::now`].
  fn today(&self) -> NaiveDate { self.localize(self.now()).date() }
}

// ─── Implementations ─────────────────────────────────────────────────────────

/// Real time in the process-local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }

  fn localize(&self, instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&Local).naive_local()
  }

  fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
      .from_local_datetime(&local)
      .earliest()
      .map(|dt| dt.with_timezone(&Utc))
  }
}

/// A frozen instant in a fixed-offset zone.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
  pub now:    DateTime<Utc>,
  pub offset: FixedOffset,
}

impl FixedClock {
  pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self { Self { now, offset } }

  pub fn utc(now: DateTime<Utc>) -> Self {
    Self { now, offset: Utc.fix() }
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { self.now }

  fn localize(&self, instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&self.offset).naive_local()
  }

  fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    self
      .offset
      .from_local_datetime(&local)
      .earliest()
      .map(|dt| dt.with_timezone(&Utc))
  }
}

// ─── Calendar helpers ────────────────────────────────────────────────────────

/// The first existing instant of `date` in court-local time.
///
/// A few zones skip local midnight on DST changes; the first resolvable hour
/// of the day is used instead.
pub fn local_midnight<C: Clock + ?Sized>(clock: &C, date: NaiveDate) -> DateTime<Utc> {
  (0..3)
    .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
    .find_map(|time| clock.resolve(date.and_time(time)))
    .unwrap_or_else(|| date.and_time(NaiveTime::MIN).and_utc())
}

/// The half-open `[start, end)` range covering tomorrow in court-local time.
pub fn reminder_window<C: Clock + ?Sized>(clock: &C) -> (DateTime<Utc>, DateTime<Utc>) {
  let tomorrow = clock.today() + TimeDelta::days(1);
  let day_after = tomorrow + TimeDelta::days(1);
  (local_midnight(clock, tomorrow), local_midnight(clock, day_after))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn alaska(now: &str) -> FixedClock {
    FixedClock::new(
      DateTime::parse_from_rfc3339(now).unwrap().with_timezone(&Utc),
      FixedOffset::west_opt(8 * 3600).unwrap(),
    )
  }

  fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
  }

  #[test]
  fn window_covers_local_tomorrow() {
    let clock = alaska("2015-03-26T20:00:00Z");
    let (start, end) = reminder_window(&clock);
    assert_eq!(start, utc("2015-03-27T08:00:00Z"));
    assert_eq!(end, utc("2015-03-28T08:00:00Z"));
  }

  #[test]
  fn window_follows_local_date_not_utc_date() {
    // 23:30 local on the 26th is already the 27th in UTC.
    let clock = alaska("2015-03-27T07:30:00Z");
    assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2015, 3, 26).unwrap());
    let (start, _) = reminder_window(&clock);
    assert_eq!(start, utc("2015-03-27T08:00:00Z"));
  }

  #[test]
  fn resolve_round_trips_through_localize() {
    let clock = alaska("2015-03-26T20:00:00Z");
    let local = clock.localize(clock.now());
    assert_eq!(local.to_string(), "2015-03-26 12:00:00");
    assert_eq!(clock.resolve(local), Some(clock.now()));
  }
}
