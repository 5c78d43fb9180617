//! Overlap tie-break policy for B-roll windows.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which segment is visible when two B-roll windows overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// The higher index is drawn on top
    #[default]
    LastWins,
    /// The lower index keeps the screen
    FirstWins,
}

impl OverlapPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlapPolicy::LastWins => "last_wins",
            OverlapPolicy::FirstWins => "first_wins",
        }
    }

    /// Pick the visible index among those active at the same instant.
    pub fn winner(&self, active: impl IntoIterator<Item = usize>) -> Option<usize> {
        let iter = active.into_iter();
        match self {
            OverlapPolicy::LastWins => iter.max(),
            OverlapPolicy::FirstWins => iter.min(),
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_wins" | "last" => Ok(OverlapPolicy::LastWins),
            "first_wins" | "first" => Ok(OverlapPolicy::FirstWins),
            other => Err(format!("unknown overlap policy '{}'", other)),
        }
    }
}
