use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Case status of a victim row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum CaseStatus {
    #[default]
    Ongoing,
    Solved,
    Unsolved,
}

impl CaseStatus {
    pub const ALL: [Self; 3] = [Self::Ongoing, Self::Solved, Self::Unsolved];

    /// Wire spelling stored by the server.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ongoing => "Ongoing",
            Self::Solved => "Solved",
            Self::Unsolved => "Unsolved",
        }
    }

    /// Read a raw row value. Only an exact match after trimming counts;
    /// anything else, including a missing value, reads as `Ongoing`.
    pub fn normalize(raw: Option<&str>) -> Self {
        let trimmed = raw.map(str::trim).unwrap_or_default();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == trimmed)
            .unwrap_or_default()
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_values_round_through_normalize() {
        for status in CaseStatus::ALL {
            assert_eq!(CaseStatus::normalize(Some(status.as_str())), status);
        }
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(CaseStatus::normalize(Some("  Solved\n")), CaseStatus::Solved);
    }

    #[test]
    fn anything_else_is_ongoing() {
        assert_eq!(CaseStatus::normalize(Some("solved")), CaseStatus::Ongoing);
        assert_eq!(CaseStatus::normalize(Some("")), CaseStatus::Ongoing);
        assert_eq!(CaseStatus::normalize(Some("Closed")), CaseStatus::Ongoing);
        assert_eq!(CaseStatus::normalize(None), CaseStatus::Ongoing);
    }
}
