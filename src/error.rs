use chrono::NaiveDate;
use thiserror::Error;

/// Failures raised by the ETL pipeline itself.
///
/// The binary layer converts these into [`AppError`] with a stable exit code;
/// library callers can match on the variant.
#[derive(Debug, Clone, Error)]
pub enum EtlError {
    /// Network, status, or response-shape failure for one series.
    #[error("fetch failed for series {series_id}: {message}")]
    Fetch { series_id: String, message: String },

    /// The provider does not know the series identifier.
    #[error("unknown series {series_id}")]
    UnknownSeries { series_id: String },

    /// SQLite connectivity or schema failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A (date, indicator) key appeared twice where it must be unique.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

impl EtlError {
    pub fn fetch(series_id: &str, message: impl Into<String>) -> Self {
        Self::Fetch {
            series_id: series_id.to_string(),
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            EtlError::InvalidRange { .. } => 2,
            EtlError::Fetch { .. } | EtlError::UnknownSeries { .. } => 4,
            EtlError::Storage(_) => 5,
            EtlError::DataIntegrity(_) => 6,
        }
    }
}

impl From<rusqlite::Error> for EtlError {
    fn from(err: rusqlite::Error) -> Self {
        EtlError::Storage(err.to_string())
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<EtlError> for AppError {
    fn from(err: EtlError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
