use std::fmt;

/// Machine-readable error codes shared by the commit and lookup pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidConfig,
    TransportFailure,
    Rejected,
    OutOfFence,
    Exhausted,
    LookupDecodeFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::InvalidConfig => "E1003",
            Self::TransportFailure => "E4001",
            Self::Rejected => "E4002",
            Self::OutOfFence => "E4101",
            Self::Exhausted => "E4102",
            Self::LookupDecodeFailed => "E4103",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidConfig => "Invalid configuration value",
            Self::TransportFailure => "Remote call failed to complete",
            Self::Rejected => "Remote endpoint rejected the write",
            Self::OutOfFence => "Candidate outside allowed region",
            Self::Exhausted => "No acceptable candidate found",
            Self::LookupDecodeFailed => "Lookup response could not be decoded",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .tether/config.toml and retry."),
            Self::InvalidConfig => {
                Some("Quiet windows must be > 0 and the fence must have south < north, west < east.")
            }
            Self::TransportFailure => Some("Check connectivity, then change the value again to retry."),
            Self::Rejected => Some("Check the value against the backend's accepted choices and re-edit."),
            Self::OutOfFence => Some("Adjust the address or place the marker manually."),
            Self::Exhausted => Some("Adjust the address or place the marker manually."),
            Self::LookupDecodeFailed => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }

    /// Whether a user edit is the expected next step (no automatic retry exists).
    #[must_use]
    pub const fn needs_user_action(self) -> bool {
        matches!(
            self,
            Self::TransportFailure | Self::Rejected | Self::OutOfFence | Self::Exhausted
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Why a commit did not produce a server value.
///
/// `Aborted` is cancellation, not failure: the committer never rolls back or
/// surfaces an error for it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    /// The write did not complete (connection refused, reset, timeout...).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success outcome.
    #[error("rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// The write was cancelled because a newer intent superseded it.
    #[error("aborted")]
    Aborted,
}

impl CommitError {
    /// Machine-readable code associated with this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::TransportFailure,
            Self::Rejected { .. } => ErrorCode::Rejected,
            Self::Aborted => ErrorCode::InternalUnexpected,
        }
    }

    /// True when the error only reports cancellation.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Operator-facing message shown next to the field after a rollback.
    #[must_use]
    pub fn operator_message(&self) -> String {
        format!("Save failed ({}). {self}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::{CommitError, ErrorCode};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::InvalidConfig,
            ErrorCode::TransportFailure,
            ErrorCode::Rejected,
            ErrorCode::OutOfFence,
            ErrorCode::Exhausted,
            ErrorCode::LookupDecodeFailed,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::Rejected.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn commit_errors_map_to_codes() {
        assert_eq!(
            CommitError::Transport("reset".into()).code(),
            ErrorCode::TransportFailure
        );
        assert_eq!(
            CommitError::Rejected {
                status: 400,
                detail: "bad choice".into()
            }
            .code(),
            ErrorCode::Rejected
        );
        assert!(CommitError::Aborted.is_abort());
        assert!(!CommitError::Transport("x".into()).is_abort());
    }

    #[test]
    fn operator_message_carries_code_and_detail() {
        let msg = CommitError::Rejected {
            status: 400,
            detail: "\"Pending\" is not a valid choice".into(),
        }
        .operator_message();
        assert!(msg.contains("E4002"));
        assert!(msg.contains("not a valid choice"));
    }
}
