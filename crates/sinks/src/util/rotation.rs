//! Time-bucketed rotation
//!
//! Destinations roll over on UTC boundaries that are multiples of the
//! interval, so with a 4 hour interval files change at 00:00, 04:00, 08:00
//! and so on regardless of when the process started.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::SinkError;

/// Allowed rotation intervals in hours (0 disables rotation)
pub const ALLOWED_ROTATION_HOURS: [u32; 5] = [0, 1, 4, 12, 24];

/// Rotation interval in whole hours
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u32")]
pub struct RotationInterval(u32);

impl RotationInterval {
    /// Rotation disabled
    pub const DISABLED: Self = Self(0);

    /// Validate an interval given in hours
    pub fn from_hours(hours: u32) -> Result<Self, SinkError> {
        if ALLOWED_ROTATION_HOURS.contains(&hours) {
            Ok(Self(hours))
        } else {
            Err(SinkError::invalid(
                "rotation_interval",
                format!("{hours}, must be one of: 0, 1, 4, 12, 24"),
            ))
        }
    }

    /// Interval in hours
    #[inline]
    pub fn hours(&self) -> u32 {
        self.0
    }

    /// Check if rotation is on
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.0 > 0
    }

    fn period_secs(&self) -> i64 {
        i64::from(self.0) * 3600
    }

    /// Start of the bucket containing `now`
    pub fn bucket_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_enabled() {
            return None;
        }
        let period = self.period_secs();
        let start = now.timestamp().div_euclid(period) * period;
        Utc.timestamp_opt(start, 0).single()
    }

    /// First boundary strictly after `now`
    pub fn next_boundary(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = self.bucket_start(now)?;
        Utc.timestamp_opt(start.timestamp() + self.period_secs(), 0).single()
    }

    /// Time left until the next boundary
    pub fn until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.next_boundary(now)?;
        (next - now).to_std().ok()
    }
}

impl TryFrom<u32> for RotationInterval {
    type Error = SinkError;

    fn try_from(hours: u32) -> Result<Self, SinkError> {
        Self::from_hours(hours)
    }
}

impl std::fmt::Display for RotationInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_enabled() {
            write!(f, "{}h", self.0)
        } else {
            f.write_str("disabled")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_allowed_values() {
        for hours in ALLOWED_ROTATION_HOURS {
            assert_eq!(RotationInterval::from_hours(hours).unwrap().hours(), hours);
        }
        for hours in [2, 3, 6, 48] {
            let err = RotationInterval::from_hours(hours).unwrap_err();
            assert!(err.to_string().contains("rotation_interval"));
        }
    }

    #[test]
    fn test_disabled_has_no_boundary() {
        let now = at("2025-03-01T10:15:00Z");
        assert_eq!(RotationInterval::DISABLED.next_boundary(now), None);
        assert_eq!(RotationInterval::DISABLED.until_next(now), None);
    }

    #[test]
    fn test_boundaries_align_to_utc() {
        let now = at("2025-03-01T10:15:00Z");

        let hourly = RotationInterval::from_hours(1).unwrap();
        assert_eq!(hourly.bucket_start(now), Some(at("2025-03-01T10:00:00Z")));
        assert_eq!(hourly.next_boundary(now), Some(at("2025-03-01T11:00:00Z")));

        let four = RotationInterval::from_hours(4).unwrap();
        assert_eq!(four.bucket_start(now), Some(at("2025-03-01T08:00:00Z")));
        assert_eq!(four.until_next(now), Some(Duration::from_secs(105 * 60)));

        let daily = RotationInterval::from_hours(24).unwrap();
        assert_eq!(daily.next_boundary(now), Some(at("2025-03-02T00:00:00Z")));
    }

    #[test]
    fn test_exact_boundary_moves_forward() {
        let now = at("2025-03-01T12:00:00Z");
        let twelve = RotationInterval::from_hours(12).unwrap();
        assert_eq!(twelve.next_boundary(now), Some(at("2025-03-02T00:00:00Z")));
    }

    #[test]
    fn test_deserialize_rejects_unknown_interval() {
        #[derive(Debug, Deserialize)]
        struct Settings {
            rotation_interval: RotationInterval,
        }

        let ok: Settings = toml::from_str("rotation_interval = 4").unwrap();
        assert_eq!(ok.rotation_interval.hours(), 4);

        let err = toml::from_str::<Settings>("rotation_interval = 5").unwrap_err();
        assert!(err.to_string().contains("must be one of"));
    }
}
