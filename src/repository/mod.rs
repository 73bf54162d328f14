// ==========================================
// Hierarchy Recon - Repository layer
// ==========================================
// Responsibility: data access behind traits, hides SQL details
// Constraint: parameterized queries only, no business logic
// ==========================================

pub mod error;
pub mod hierarchy_repo;
pub mod hierarchy_repo_impl;

pub use error::{RepositoryError, RepositoryResult};
pub use hierarchy_repo::HierarchyRepository;
pub use hierarchy_repo_impl::HierarchyRepositoryImpl;
