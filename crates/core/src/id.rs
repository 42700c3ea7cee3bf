//! Unique identifiers for monitored entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a monitor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonitorId(Ulid);

impl MonitorId {
    /// Generate a new MonitorId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MonitorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MonitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for MonitorId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
