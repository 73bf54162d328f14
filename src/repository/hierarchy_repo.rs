// ==========================================
// Hierarchy Recon - Hierarchy Repository Trait
// ==========================================
// Responsibility: record-oriented access to projects and nodes
// Constraint: no business rules, plain CRUD only
// ==========================================

use crate::domain::hierarchy::{HierarchyNode, Project};
use crate::repository::error::RepositoryResult;
use std::sync::Arc;

// ==========================================
// HierarchyRepository Trait
// ==========================================
// Implementor: HierarchyRepositoryImpl (rusqlite)
pub trait HierarchyRepository: Send + Sync {
    // ===== Projects =====

    fn project_exists(&self, project_id: &str) -> RepositoryResult<bool>;

    fn create_project(&self, project: &Project) -> RepositoryResult<()>;

    fn find_project(&self, project_id: &str) -> RepositoryResult<Option<Project>>;

    // ===== Nodes =====

    /// Look up a node by its external key.
    ///
    /// # Returns
    /// - Ok(Some(node)): found
    /// - Ok(None): no node with that hierarchy_id in the project
    fn find_by_hierarchy_id(
        &self,
        project_id: &str,
        hierarchy_id: &str,
    ) -> RepositoryResult<Option<HierarchyNode>>;

    /// Insert a node.
    ///
    /// # Returns
    /// - Ok(id): storage id (generated when `node.id` is empty)
    /// - Err(UniqueConstraintViolation): hierarchy_id already used in the project
    fn create(&self, node: &HierarchyNode) -> RepositoryResult<String>;

    /// Overwrite every mutable column of an existing node (matched by `id`).
    fn update(&self, node: &HierarchyNode) -> RepositoryResult<()>;

    /// All nodes of a project in insertion order.
    fn find_all_by_project(&self, project_id: &str) -> RepositoryResult<Vec<HierarchyNode>>;
}

// Shared handle: the facade hands one repository to several components.
impl<T: HierarchyRepository + ?Sized> HierarchyRepository for Arc<T> {
    fn project_exists(&self, project_id: &str) -> RepositoryResult<bool> {
        (**self).project_exists(project_id)
    }

    fn create_project(&self, project: &Project) -> RepositoryResult<()> {
        (**self).create_project(project)
    }

    fn find_project(&self, project_id: &str) -> RepositoryResult<Option<Project>> {
        (**self).find_project(project_id)
    }

    fn find_by_hierarchy_id(
        &self,
        project_id: &str,
        hierarchy_id: &str,
    ) -> RepositoryResult<Option<HierarchyNode>> {
        (**self).find_by_hierarchy_id(project_id, hierarchy_id)
    }

    fn create(&self, node: &HierarchyNode) -> RepositoryResult<String> {
        (**self).create(node)
    }

    fn update(&self, node: &HierarchyNode) -> RepositoryResult<()> {
        (**self).update(node)
    }

    fn find_all_by_project(&self, project_id: &str) -> RepositoryResult<Vec<HierarchyNode>> {
        (**self).find_all_by_project(project_id)
    }
}
