//! Conversion from the archive's timestamp format.
//!
//! Timestamps count from 2001-01-01T00:00:00Z. Older schemas store whole
//! seconds, newer ones nanoseconds; there is no flag saying which, so any
//! value above 1e10 is taken to be nanoseconds.

use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

const NANOSECOND_THRESHOLD: f64 = 1e10;

/// 2000-01-01T00:00:00Z
const EARLIEST_PLAUSIBLE: i64 = 946_684_800;
/// 2100-01-01T00:00:00Z
const LATEST_PLAUSIBLE: i64 = 4_102_444_800;

/// Convert a raw archive timestamp, substituting `now` for anything outside
/// 2000..=2100.
pub fn convert_apple_time(raw: f64, now: DateTime<Utc>) -> DateTime<Utc> {
  let seconds = if raw > NANOSECOND_THRESHOLD { raw / 1e9 } else { raw };
  let unix = seconds + APPLE_EPOCH_OFFSET as f64;

  if !unix.is_finite()
    || unix < EARLIEST_PLAUSIBLE as f64
    || unix > LATEST_PLAUSIBLE as f64
  {
    tracing::debug!(raw, "implausible archive timestamp; using now");
    return now;
  }

  let whole = unix.floor();
  let nanos = ((unix - whole) * 1e9) as u32;
  DateTime::from_timestamp(whole as i64, nanos).unwrap_or(now)
}

/// Convert a nullable raw timestamp. Missing and non-positive values mean
/// "no activity" and map to `None`.
pub fn apple_time_to_utc(raw: Option<f64>) -> Option<DateTime<Utc>> {
  raw
    .filter(|r| *r > 0.0)
    .map(|r| convert_apple_time(r, Utc::now()))
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn fixed_now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap() }

  #[test]
  fn seconds_are_shifted_by_the_epoch_offset() {
    let dt = convert_apple_time(700_000_000.0, fixed_now());
    assert_eq!(dt.timestamp(), 978_307_200 + 700_000_000);
    assert_eq!(dt, Utc.with_ymd_and_hms(2023, 3, 8, 20, 26, 40).unwrap());
  }

  #[test]
  fn large_values_are_nanoseconds() {
    let dt = convert_apple_time(700_000_000_000_000_000.0, fixed_now());
    assert_eq!(dt.timestamp(), 1_678_307_200);
  }

  #[test]
  fn out_of_range_becomes_now() {
    let now = fixed_now();
    // 1990-ish once shifted.
    assert_eq!(convert_apple_time(-400_000_000.0, now), now);
    // Past 2100 in seconds mode.
    assert_eq!(convert_apple_time(9_000_000_000.0, now), now);
  }

  #[test]
  fn missing_or_zero_is_no_activity() {
    assert_eq!(apple_time_to_utc(None), None);
    assert_eq!(apple_time_to_utc(Some(0.0)), None);
    assert!(apple_time_to_utc(Some(700_000_000.0)).is_some());
  }
}
