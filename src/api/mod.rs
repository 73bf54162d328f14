// ==========================================
// Hierarchy Recon - API layer
// ==========================================
// Responsibility: facade used by the CLI and embedding applications
// ==========================================

pub mod error;
pub mod hierarchy_api;

pub use error::{ApiError, ApiResult};
pub use hierarchy_api::{HierarchyApi, ImportReport};
