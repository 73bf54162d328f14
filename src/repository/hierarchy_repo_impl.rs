// ==========================================
// Hierarchy Recon - Hierarchy Repository implementation
// ==========================================
// Responsibility: project / hierarchy_node tables via rusqlite
// Constraint: no business rules, plain CRUD only
// ==========================================

use crate::db::{configure_sqlite_connection, init_schema, open_sqlite_connection};
use crate::domain::hierarchy::{HierarchyNode, Project};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::hierarchy_repo::HierarchyRepository;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const NODE_COLUMNS: &str = r#"
    id, project_id, hierarchy_id, name, description, parent_id, is_root,
    level_path, level_sort_orders, sort_order, flags, custom_flags,
    source_mappings, formula_config, filter_config, xref_key, metadata,
    created_at, updated_at
"#;

// Raw column values; JSON decoding happens outside the rusqlite row callback
// so that decode failures surface as RepositoryError instead of rusqlite errors.
struct NodeRow {
    id: String,
    project_id: String,
    hierarchy_id: String,
    name: String,
    description: Option<String>,
    parent_id: Option<String>,
    is_root: bool,
    level_path: String,
    level_sort_orders: String,
    sort_order: i64,
    flags: String,
    custom_flags: String,
    source_mappings: String,
    formula_config: Option<String>,
    filter_config: Option<String>,
    xref_key: Option<i64>,
    metadata: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NodeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            hierarchy_id: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            parent_id: row.get(5)?,
            is_root: row.get(6)?,
            level_path: row.get(7)?,
            level_sort_orders: row.get(8)?,
            sort_order: row.get(9)?,
            flags: row.get(10)?,
            custom_flags: row.get(11)?,
            source_mappings: row.get(12)?,
            formula_config: row.get(13)?,
            filter_config: row.get(14)?,
            xref_key: row.get(15)?,
            metadata: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }

    fn into_node(self) -> RepositoryResult<HierarchyNode> {
        Ok(HierarchyNode {
            level_path: decode("level_path", &self.level_path)?,
            level_sort_orders: decode("level_sort_orders", &self.level_sort_orders)?,
            flags: decode("flags", &self.flags)?,
            custom_flags: decode("custom_flags", &self.custom_flags)?,
            source_mappings: decode("source_mappings", &self.source_mappings)?,
            formula_config: decode_opt("formula_config", self.formula_config.as_deref())?,
            filter_config: decode_opt("filter_config", self.filter_config.as_deref())?,
            metadata: decode("metadata", &self.metadata)?,
            id: self.id,
            project_id: self.project_id,
            hierarchy_id: self.hierarchy_id,
            name: self.name,
            description: self.description,
            parent_id: self.parent_id,
            is_root: self.is_root,
            sort_order: self.sort_order,
            xref_key: self.xref_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn decode<T: DeserializeOwned>(field: &str, raw: &str) -> RepositoryResult<T> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: e.to_string(),
    })
}

fn decode_opt<T: DeserializeOwned>(field: &str, raw: Option<&str>) -> RepositoryResult<Option<T>> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() || s.trim() == "null" => Ok(None),
        Some(s) => decode(field, s).map(Some),
    }
}

// Column values shared by INSERT and UPDATE (everything except id/project/created_at).
struct EncodedNode {
    level_path: String,
    level_sort_orders: String,
    flags: String,
    custom_flags: String,
    source_mappings: String,
    formula_config: Option<String>,
    filter_config: Option<String>,
    metadata: String,
}

impl EncodedNode {
    fn encode(node: &HierarchyNode) -> RepositoryResult<Self> {
        Ok(Self {
            level_path: serde_json::to_string(&node.level_path)?,
            level_sort_orders: serde_json::to_string(&node.level_sort_orders)?,
            flags: serde_json::to_string(&node.flags)?,
            custom_flags: serde_json::to_string(&node.custom_flags)?,
            source_mappings: serde_json::to_string(&node.source_mappings)?,
            formula_config: node
                .formula_config
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            filter_config: node
                .filter_config
                .as_ref()
                .filter(|f| !f.is_empty())
                .map(serde_json::to_string)
                .transpose()?,
            metadata: serde_json::to_string(&node.metadata)?,
        })
    }
}

// ==========================================
// HierarchyRepositoryImpl
// ==========================================
pub struct HierarchyRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl HierarchyRepositoryImpl {
    /// Open the database file (schema is created by `db::init_schema`).
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Share an existing connection.
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    /// Private in-memory database with the schema applied.
    pub fn in_memory() -> RepositoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure_sqlite_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl HierarchyRepository for HierarchyRepositoryImpl {
    fn project_exists(&self, project_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM project WHERE project_id = ?1",
                params![project_id],
                |_row| Ok(true),
            )
            .optional()?;
        Ok(found.unwrap_or(false))
    }

    fn create_project(&self, project: &Project) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO project (project_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![project.project_id, project.name, project.created_at],
        )?;
        Ok(())
    }

    fn find_project(&self, project_id: &str) -> RepositoryResult<Option<Project>> {
        let conn = self.get_conn()?;
        let project = conn
            .query_row(
                "SELECT project_id, name, created_at FROM project WHERE project_id = ?1",
                params![project_id],
                |row| {
                    Ok(Project {
                        project_id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    fn find_by_hierarchy_id(
        &self,
        project_id: &str,
        hierarchy_id: &str,
    ) -> RepositoryResult<Option<HierarchyNode>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM hierarchy_node WHERE project_id = ?1 AND hierarchy_id = ?2",
            NODE_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![project_id, hierarchy_id], NodeRow::from_row)
            .optional()?;
        row.map(NodeRow::into_node).transpose()
    }

    fn create(&self, node: &HierarchyNode) -> RepositoryResult<String> {
        let id = if node.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            node.id.clone()
        };
        let encoded = EncodedNode::encode(node)?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO hierarchy_node (
                id, project_id, hierarchy_id, name, description, parent_id, is_root,
                level_path, level_sort_orders, sort_order, flags, custom_flags,
                source_mappings, formula_config, filter_config, xref_key, metadata,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19
            )
            "#,
            params![
                id,
                node.project_id,
                node.hierarchy_id,
                node.name,
                node.description,
                node.parent_id,
                node.is_root,
                encoded.level_path,
                encoded.level_sort_orders,
                node.sort_order,
                encoded.flags,
                encoded.custom_flags,
                encoded.source_mappings,
                encoded.formula_config,
                encoded.filter_config,
                node.xref_key,
                encoded.metadata,
                node.created_at,
                node.updated_at,
            ],
        )?;
        Ok(id)
    }

    fn update(&self, node: &HierarchyNode) -> RepositoryResult<()> {
        let encoded = EncodedNode::encode(node)?;
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE hierarchy_node SET
                hierarchy_id = ?2, name = ?3, description = ?4, parent_id = ?5, is_root = ?6,
                level_path = ?7, level_sort_orders = ?8, sort_order = ?9, flags = ?10,
                custom_flags = ?11, source_mappings = ?12, formula_config = ?13,
                filter_config = ?14, xref_key = ?15, metadata = ?16, updated_at = ?17
            WHERE id = ?1
            "#,
            params![
                node.id,
                node.hierarchy_id,
                node.name,
                node.description,
                node.parent_id,
                node.is_root,
                encoded.level_path,
                encoded.level_sort_orders,
                node.sort_order,
                encoded.flags,
                encoded.custom_flags,
                encoded.source_mappings,
                encoded.formula_config,
                encoded.filter_config,
                node.xref_key,
                encoded.metadata,
                Utc::now(),
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "HierarchyNode".to_string(),
                id: node.id.clone(),
            });
        }
        Ok(())
    }

    fn find_all_by_project(&self, project_id: &str) -> RepositoryResult<Vec<HierarchyNode>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM hierarchy_node WHERE project_id = ?1 ORDER BY seq",
            NODE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![project_id], NodeRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(NodeRow::into_node).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{FormulaConfig, FormulaRule, SourceMapping, MappingFlags};
    use crate::domain::types::FormulaOperation;

    fn repo_with_project() -> HierarchyRepositoryImpl {
        let repo = HierarchyRepositoryImpl::in_memory().unwrap();
        repo.create_project(&Project {
            project_id: "P1".to_string(),
            name: "Test".to_string(),
            created_at: Utc::now(),
        })
        .unwrap();
        repo
    }

    #[test]
    fn test_create_assigns_id_and_round_trips_json_columns() {
        let repo = repo_with_project();
        let mut node = HierarchyNode::new("P1", "REVENUE", "Revenue");
        node.level_path = vec!["Revenue".to_string()];
        node.custom_flags.insert("sign_change_flag", true);
        node.source_mappings.push(SourceMapping {
            mapping_index: 3,
            database: "DW".to_string(),
            schema: "GL".to_string(),
            table: "FACT".to_string(),
            column: "AMOUNT".to_string(),
            column_type: Some("NUMBER".to_string()),
            source_filter_value: None,
            precedence_group: None,
            flags: MappingFlags::default(),
        });
        node.formula_config = Some(FormulaConfig {
            group_name: "Revenue".to_string(),
            main_hierarchy_id: "REVENUE".to_string(),
            rules: vec![FormulaRule {
                operation: FormulaOperation::Sum,
                hierarchy_name_or_id: "Product Sales".to_string(),
                precedence: 1,
                constant: None,
            }],
            expression: None,
        });

        let id = repo.create(&node).unwrap();
        assert!(!id.is_empty());

        let loaded = repo.find_by_hierarchy_id("P1", "REVENUE").unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.custom_flags.get("SIGN_CHANGE_FLAG"), Some(true));
        assert_eq!(loaded.source_mappings[0].mapping_index, 3);
        assert_eq!(loaded.formula_config, node.formula_config);
        assert!(loaded.filter_config.is_none());
    }

    #[test]
    fn test_duplicate_hierarchy_id_is_unique_violation() {
        let repo = repo_with_project();
        let node = HierarchyNode::new("P1", "A", "A");
        repo.create(&node).unwrap();
        let err = repo.create(&node).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn test_update_links_parent_and_keeps_insertion_order() {
        let repo = repo_with_project();
        let parent_id = repo.create(&HierarchyNode::new("P1", "B", "B")).unwrap();
        let child_id = repo.create(&HierarchyNode::new("P1", "A", "A")).unwrap();

        let mut child = repo.find_by_hierarchy_id("P1", "A").unwrap().unwrap();
        child.set_parent(Some(parent_id.clone()));
        repo.update(&child).unwrap();

        let all = repo.find_all_by_project("P1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].hierarchy_id, "B");
        assert_eq!(all[1].id, child_id);
        assert_eq!(all[1].parent_id.as_deref(), Some(parent_id.as_str()));
        assert!(!all[1].is_root);
    }

    #[test]
    fn test_update_unknown_node_is_not_found() {
        let repo = repo_with_project();
        let mut node = HierarchyNode::new("P1", "X", "X");
        node.id = "missing".to_string();
        assert!(matches!(
            repo.update(&node),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_project_exists() {
        let repo = repo_with_project();
        assert!(repo.project_exists("P1").unwrap());
        assert!(!repo.project_exists("P2").unwrap());
    }
}
