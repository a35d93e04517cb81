//! Minute-bucket keys and sub-window decomposition
//!
//! A bucket message is the string `"<minuteUnixSeconds>_<bucketIndex>"`. The
//! trigger worker splits the minute it names into gap-sized [`SubWindow`]s.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Length of one bucket
pub const BUCKET_SPAN: Duration = Duration::from_secs(60);

const SEPARATOR: char = '_';

/// Convert a std duration into chrono's, saturating on overflow
fn delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

/// `at + d`, clamped to the latest representable instant
fn after(at: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    at.checked_add_signed(delta(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Parse one key part, accepting only the digits its own `Display` writes
/// back (no sign, no leading zeros)
fn canonical<T>(part: &str) -> Result<T, String>
where
    T: FromStr<Err = std::num::ParseIntError> + fmt::Display,
{
    let value: T = part.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    if value.to_string() != part {
        return Err(format!("{part:?} is not in canonical form"));
    }
    Ok(value)
}

/// Errors from parsing a bucket key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketKeyError {
    /// The key is not `<minute>_<bucket>`
    #[error("invalid format of msg key: {key} (expected 2 parts, got {parts})")]
    WrongPartCount { key: String, parts: usize },

    /// The minute part is not a unix timestamp in seconds
    #[error("invalid minute in msg key {key}: {reason}")]
    InvalidMinute { key: String, reason: String },

    /// The bucket part is not a non-negative integer
    #[error("invalid bucket in msg key {key}: {reason}")]
    InvalidBucket { key: String, reason: String },
}

/// Identifies one minute of one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    start: DateTime<Utc>,
    bucket: u32,
}

impl BucketKey {
    /// Build the key for the minute containing `at`
    pub fn for_minute(at: DateTime<Utc>, bucket: u32) -> Self {
        let start = at.duration_trunc(TimeDelta::minutes(1)).unwrap_or(at);
        Self { start, bucket }
    }

    /// Parse `"<minuteUnixSeconds>_<bucketIndex>"`
    pub fn parse(key: &str) -> Result<Self, BucketKeyError> {
        let parts: Vec<&str> = key.split(SEPARATOR).collect();
        let [minute, bucket] = parts.as_slice() else {
            return Err(BucketKeyError::WrongPartCount {
                key: key.to_string(),
                parts: parts.len(),
            });
        };

        let seconds: i64 = canonical(minute).map_err(|reason| BucketKeyError::InvalidMinute {
            key: key.to_string(),
            reason,
        })?;
        let start =
            DateTime::from_timestamp(seconds, 0).ok_or_else(|| BucketKeyError::InvalidMinute {
                key: key.to_string(),
                reason: format!("{seconds} is out of range"),
            })?;

        let bucket: u32 = canonical(bucket).map_err(|reason| BucketKeyError::InvalidBucket {
            key: key.to_string(),
            reason,
        })?;

        Ok(Self { start, bucket })
    }

    /// First instant covered by the bucket
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// First instant after the bucket
    pub fn end(&self) -> DateTime<Utc> {
        after(self.start, BUCKET_SPAN)
    }

    /// Shard index
    pub fn bucket(&self) -> u32 {
        self.bucket
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.start.timestamp(), SEPARATOR, self.bucket)
    }
}

impl FromStr for BucketKey {
    type Err = BucketKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Half-open time range `[start, end)` scanned in one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SubWindow {
    /// Window of length `gap` beginning at `start`
    pub fn starting_at(start: DateTime<Utc>, gap: Duration) -> Self {
        Self {
            start,
            end: after(start, gap),
        }
    }

    /// The windows a bucket is scanned in, in dispatch order.
    ///
    /// Only whole windows that end inside the bucket are emitted; when `gap`
    /// does not divide the minute the trailing remainder is never covered.
    pub fn tiling(key: &BucketKey, gap: Duration) -> Vec<SubWindow> {
        if gap.is_zero() {
            return vec![];
        }
        let end = key.end();
        let mut windows = Vec::new();
        let mut cursor = key.start();
        while cursor < end && after(cursor, gap) <= end {
            let window = Self::starting_at(cursor, gap);
            cursor = window.end;
            windows.push(window);
        }
        windows
    }
}

impl fmt::Display for SubWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.timestamp(), self.end.timestamp())
    }
}
