// ==========================================
// Hierarchy Recon - API error types
// ==========================================
// Responsibility: one error type for facade callers (CLI, embedders);
// lower-layer errors are mapped to user-facing messages here
// ==========================================

use crate::exporter::ExportError;
use crate::importer::ImportError;
use crate::repository::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // Input errors
    // ==========================================
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unrecognized file format: {0}")]
    UnrecognizedFormat(String),

    #[error("business rule violated: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // Pipeline errors
    // ==========================================
    #[error("import failed: {0}")]
    ImportError(String),

    #[error("export failed: {0}")]
    ExportError(String),

    // ==========================================
    // Data access errors
    // ==========================================
    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("database connection failed: {0}")]
    DatabaseConnectionError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// From RepositoryError
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} (id={})", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("lock acquisition failed: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("duplicate key: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("dangling reference: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::DatabaseError(format!("stored {} is unreadable: {}", field, message))
            }
            RepositoryError::Other(e) => ApiError::Other(e),
        }
    }
}

// ==========================================
// From ImportError
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::ProjectNotFound(id) => ApiError::NotFound(format!("project {}", id)),
            ImportError::FileNotFound(path) => ApiError::NotFound(format!("file {}", path)),
            ImportError::UnsupportedFormat(ext) => {
                ApiError::InvalidInput(format!("unsupported file type '{}'", ext))
            }
            ImportError::NotAHierarchyFile(format) => ApiError::UnrecognizedFormat(format!(
                "expected a hierarchy file, detected {}",
                format
            )),
            ImportError::Repository(e) => e.into(),
            ImportError::Other(e) => ApiError::Other(e),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

// ==========================================
// From ExportError
// ==========================================
impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::ProjectNotFound(id) => ApiError::NotFound(format!("project {}", id)),
            ExportError::Repository(e) => e.into(),
            ExportError::Other(e) => ApiError::Other(e),
            ExportError::CsvWriteError(msg) => ApiError::ExportError(msg),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
