use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::exception::CloudPerfException;

static DURATION_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(weeks?|w|days?|d|hours?|h|minutes?|mins?|m|seconds?|secs?|s)?\s*")
        .unwrap()
});

/// How long a recorded benchmark stays fresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiryWindow(Duration);

impl ExpiryWindow {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Saturates at [`chrono::Duration::MAX`].
    pub fn as_chrono(&self) -> chrono::Duration {
        Self::chrono_secs(self.0.as_secs()).unwrap_or(chrono::Duration::MAX)
    }

    fn chrono_secs(secs: u64) -> Option<chrono::Duration> {
        i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
    }
}

impl Default for ExpiryWindow {
    /// Twelve weeks.
    fn default() -> Self {
        Self::from_secs(12 * 7 * 24 * 60 * 60)
    }
}

impl FromStr for ExpiryWindow {
    type Err = CloudPerfException;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CloudPerfException::InvalidDuration {
            value: s.to_string(),
        };
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }
        let mut secs = 0u64;
        let mut end = 0;
        for caps in DURATION_PART.captures_iter(trimmed) {
            let whole = caps.get(0).ok_or_else(invalid)?;
            if whole.start() != end {
                return Err(invalid());
            }
            end = whole.end();
            let amount: u64 = caps[1].parse().map_err(|_| invalid())?;
            let unit = caps.get(2).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            let factor = match unit.chars().next() {
                Some('w') => 7 * 24 * 60 * 60,
                Some('d') => 24 * 60 * 60,
                Some('h') => 60 * 60,
                Some('m') => 60,
                Some('s') | None => 1,
                Some(_) => return Err(invalid()),
            };
            secs = amount
                .checked_mul(factor)
                .and_then(|part| secs.checked_add(part))
                .ok_or_else(invalid)?;
        }
        if end != trimmed.len() || Self::chrono_secs(secs).is_none() {
            return Err(invalid());
        }
        Ok(Self::from_secs(secs))
    }
}

impl<'de> Deserialize<'de> for ExpiryWindow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
