use std::fmt;

use serde::{Deserialize, Serialize};
use tether_core::ErrorCode;

/// Progress and outcome text shown under the location form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    Finding,
    CoordinatesSet,
    NoMatches,
    OutsideFence,
}

impl Advisory {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Finding => "Finding coordinates…",
            Self::CoordinatesSet => "Coordinates set",
            Self::NoMatches => "No matches found",
            Self::OutsideFence => "Found coords outside allowed region — ignored",
        }
    }

    /// Error code for outcomes that left the coordinates untouched.
    #[must_use]
    pub const fn code(self) -> Option<ErrorCode> {
        match self {
            Self::NoMatches => Some(ErrorCode::Exhausted),
            Self::OutsideFence => Some(ErrorCode::OutOfFence),
            Self::Finding | Self::CoordinatesSet => None,
        }
    }

    /// Whether the user should adjust the address or drag the marker.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(self.code(), Some(code) if code.needs_user_action())
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_outcomes_carry_codes() {
        assert_eq!(Advisory::NoMatches.code().map(ErrorCode::code), Some("E4102"));
        assert_eq!(Advisory::OutsideFence.code().map(ErrorCode::code), Some("E4101"));
        assert_eq!(Advisory::CoordinatesSet.code(), None);
        assert_eq!(Advisory::Finding.code(), None);
    }

    #[test]
    fn only_unresolved_outcomes_need_attention() {
        assert!(Advisory::NoMatches.needs_attention());
        assert!(Advisory::OutsideFence.needs_attention());
        assert!(!Advisory::CoordinatesSet.needs_attention());
        assert!(!Advisory::Finding.needs_attention());
    }
}
