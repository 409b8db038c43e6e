use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Instance types starting with `prefix` aren't benchmarked until `until` has passed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub prefix: String,
    pub until: NaiveDate,
}

#[derive(Clone, Debug, Default)]
pub struct Blacklist {
    entries: Vec<BlacklistEntry>,
}

impl Blacklist {
    pub fn new(entries: Vec<BlacklistEntry>) -> Self {
        Self { entries }
    }

    /// An instance type is skipped while `today` is on or before the expiry of
    /// any matching prefix.
    pub fn is_blacklisted(&self, instance_type: &str, today: NaiveDate) -> bool {
        self.entries
            .iter()
            .any(|entry| instance_type.starts_with(&entry.prefix) && today <= entry.until)
    }
}
