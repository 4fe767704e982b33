use thiserror::Error;

/// Errors surfaced by the calendar core.
///
/// None of these are ever folded into a default value; the caller decides
/// how to present them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The calendar payload was not an array, was empty, or did not
    /// describe the requested month.
    #[error("malformed calendar data: {0}")]
    MalformedCalendarData(String),

    /// Failure reported by the calendar/events/notes collaborator.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// A date, month or target expression that could not be interpreted.
    #[error("invalid date input: {0}")]
    InvalidDateInput(String),
}

impl CoreError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedCalendarData(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkFailure(msg.into())
    }

    pub fn invalid_date(msg: impl Into<String>) -> Self {
        Self::InvalidDateInput(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
