use std::fmt;

/// Machine-readable error codes surfaced by the library and the `cg` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidEntityId,
    EntityNotFound,
    InvalidEntityRecord,
    UnsupportedHistoryVersion,
    CorruptHistory,
    HistoryEntityMissing,
    MergeConflict,
    RemoteVersionConflict,
    RemoteUnavailable,
    RemoteRejected,
    SaveInProgress,
    StorageWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::InvalidEntityId => "E2001",
            Self::EntityNotFound => "E2002",
            Self::InvalidEntityRecord => "E2003",
            Self::UnsupportedHistoryVersion => "E3001",
            Self::CorruptHistory => "E3002",
            Self::HistoryEntityMissing => "E3003",
            Self::MergeConflict => "E4001",
            Self::RemoteVersionConflict => "E4002",
            Self::RemoteUnavailable => "E4003",
            Self::RemoteRejected => "E4004",
            Self::SaveInProgress => "E4005",
            Self::StorageWriteFailed => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidEntityId => "Invalid entity id",
            Self::EntityNotFound => "Entity not found",
            Self::InvalidEntityRecord => "Invalid entity record",
            Self::UnsupportedHistoryVersion => "Unsupported saved history version",
            Self::CorruptHistory => "Corrupt saved history",
            Self::HistoryEntityMissing => "Saved history references a missing entity",
            Self::MergeConflict => "Unresolved merge conflict",
            Self::RemoteVersionConflict => "Remote version conflict",
            Self::RemoteUnavailable => "Remote service unavailable",
            Self::RemoteRejected => "Remote service rejected the upload",
            Self::SaveInProgress => "Save already in progress",
            Self::StorageWriteFailed => "History storage write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .cartograph/config.toml and retry."),
            Self::InvalidEntityId => {
                Some("Entity ids are a kind prefix (n, w, r) followed by a number.")
            }
            Self::EntityNotFound | Self::InvalidEntityRecord => None,
            Self::UnsupportedHistoryVersion => {
                Some("Only saved history versions 2 and 3 can be restored.")
            }
            Self::CorruptHistory | Self::HistoryEntityMissing => {
                Some("Discard the saved history and start a new session.")
            }
            Self::MergeConflict => Some("Choose keep-mine or use-theirs for each conflict."),
            Self::RemoteVersionConflict => Some("Reload remote entities and merge again."),
            Self::RemoteUnavailable => Some("Retry once the remote service is reachable."),
            Self::RemoteRejected => None,
            Self::SaveInProgress => Some("Wait for the running save to finish."),
            Self::StorageWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => {
                Some("Another editing session holds the history lock; close it and retry.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
