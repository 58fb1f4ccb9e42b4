use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Recurrence pattern error")]
    Pattern(#[from] PatternError),

    #[error("Property error")]
    Property(#[from] PropertyError),

    #[error("Calendar source error")]
    Source(#[from] SourceError),

    #[error("Hex decoding error")]
    Hex(#[from] hex::FromHexError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Meeting not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Reasons a recurrence blob is rejected. Any of these means the item is
/// treated as a one-off meeting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Recurrence blob truncated at offset {offset} (needed {needed} bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("Recurrence period must be positive, got {0}")]
    InvalidPeriod(u32),

    #[error("Recurrence {field} count {count} exceeds limit {limit}")]
    CountTooLarge {
        field: &'static str,
        count: u32,
        limit: u32,
    },

    #[error("Unknown recurrence pattern type {0:#06x}")]
    UnknownPatternType(u16),

    #[error("Recurrence date {0} is out of range")]
    DateOutOfRange(u32),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Property snapshot has {found} values, expected at least {expected}")]
    MissingProperties { expected: usize, found: usize },

    #[error("Property '{name}' has an unexpected type")]
    WrongType { name: &'static str },

    #[error("Property '{name}' could not be parsed as a date: {value}")]
    BadDate { name: &'static str, value: String },
}

/// Errors reported by a calendar source. Only `Io` failures are retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("I/O failure talking to calendar source: {0}")]
    Io(String),

    #[error("Calendar source rejected the request: {0}")]
    Other(String),

    #[error("Interrupted while waiting to retry")]
    Interrupted,
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Io(_))
    }
}
