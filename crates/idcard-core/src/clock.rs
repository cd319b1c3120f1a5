//! Source of "today" and "now" for the engine.

use chrono::{DateTime, NaiveDate, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;

  fn today(&self) -> NaiveDate { self.now().date_naive() }
}

/// Wall-clock time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
  /// Noon UTC on `date`.
  pub fn on(date: NaiveDate) -> Self {
    Self(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { self.0 }
}
