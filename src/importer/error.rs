// ==========================================
// Hierarchy Recon - Importer error types
// ==========================================
// Tooling: thiserror derive
// Row-level failures are captured as strings in ImportSummary;
// these variants are for call-level failures and per-row mapping.
// ==========================================

use crate::domain::types::CsvFormat;
use crate::repository::RepositoryError;
use thiserror::Error;

/// Importer error type
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== File =====
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unsupported file format: {0} (only .csv/.xlsx/.xls)")]
    UnsupportedFormat(String),

    #[error("file read failed: {0}")]
    FileReadError(String),

    #[error("Excel parse failed: {0}")]
    ExcelParseError(String),

    #[error("CSV parse failed: {0}")]
    CsvParseError(String),

    #[error("input has no header row")]
    MissingHeader,

    // ===== Field mapping =====
    #[error("row {row}: {message}")]
    FieldMappingError { row: usize, message: String },

    #[error("row {row}: invalid {field} value '{value}': {message}")]
    TypeConversionError {
        row: usize,
        field: String,
        value: String,
        message: String,
    },

    // ===== Call level =====
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("file format '{0}' cannot be imported as a hierarchy")]
    NotAHierarchyFile(CsvFormat),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result alias
pub type ImportResult<T> = Result<T, ImportError>;
