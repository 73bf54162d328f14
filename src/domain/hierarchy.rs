// ==========================================
// Hierarchy Recon - Hierarchy domain model
// ==========================================
// Node, flags, source mappings, formula and filter configuration.
// Usage: importer writes, exporter/anomaly engine read
// Aligned with: hierarchy_node table (JSON columns for nested parts)
// ==========================================

use crate::domain::types::FormulaOperation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Highest LEVEL_n column the exporter writes.
pub const MAX_LEVELS: usize = 15;

/// `hierarchy_id` prefix of placeholder nodes created during legacy gap filling.
pub const SYNTHESIZED_ID_PREFIX: &str = "SYNTH_";

/// Metadata key marking a placeholder node.
pub const META_SYNTHESIZED: &str = "synthesized";

// ==========================================
// Project
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// HierarchyNode
// ==========================================
// Invariants:
// - is_root == parent_id.is_none()
// - hierarchy_id unique within project_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    // ===== Identity =====
    pub id: String, // storage id, assigned by the repository on create
    pub hierarchy_id: String,
    pub project_id: String,

    // ===== Descriptive =====
    pub name: String,
    pub description: Option<String>,

    // ===== Structure =====
    pub parent_id: Option<String>, // storage id of the parent
    pub is_root: bool,
    pub level_path: Vec<String>,
    pub level_sort_orders: Vec<Option<i64>>, // per tree level, root first
    pub sort_order: i64,

    // ===== Flags =====
    pub flags: NodeFlags,
    pub custom_flags: CustomFlags,

    // ===== Mapping / calculation =====
    pub source_mappings: Vec<SourceMapping>,
    pub formula_config: Option<FormulaConfig>,
    pub filter_config: Option<FilterConfig>,

    // ===== Legacy round-trip =====
    pub xref_key: Option<i64>,
    pub metadata: Map<String, Value>,

    // ===== Audit =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HierarchyNode {
    /// New root node with default flags and no storage id yet.
    pub fn new(project_id: &str, hierarchy_id: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            hierarchy_id: hierarchy_id.to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            description: None,
            parent_id: None,
            is_root: true,
            level_path: Vec::new(),
            level_sort_orders: Vec::new(),
            sort_order: 0,
            flags: NodeFlags::default(),
            custom_flags: CustomFlags::default(),
            source_mappings: Vec::new(),
            formula_config: None,
            filter_config: None,
            xref_key: None,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Placeholder created by the legacy importer for a missing ancestor.
    pub fn is_synthesized(&self) -> bool {
        self.hierarchy_id.starts_with(SYNTHESIZED_ID_PREFIX)
            || self
                .metadata
                .get(META_SYNTHESIZED)
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// Own formula or total formula.
    pub fn has_formula(&self) -> bool {
        self.formula_config.is_some() || self.total_formula().is_some()
    }

    pub fn total_formula(&self) -> Option<&TotalFormula> {
        self.filter_config
            .as_ref()
            .and_then(|f| f.total_formula.as_ref())
    }

    /// Link to a parent (or detach when `None`), keeping is_root consistent.
    pub fn set_parent(&mut self, parent_id: Option<String>) {
        self.is_root = parent_id.is_none();
        self.parent_id = parent_id;
    }
}

// ==========================================
// NodeFlags - fixed boolean set
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFlags {
    pub include: bool,
    pub exclude: bool,
    pub transform: bool,
    pub calculation: bool,
    pub active: bool,
    pub is_leaf: bool,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            include: true,
            exclude: false,
            transform: false,
            calculation: false,
            active: true,
            is_leaf: false,
        }
    }
}

// ==========================================
// CustomFlags - open-ended named booleans
// ==========================================
// Keys are stored upper-case; lookups are case-insensitive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomFlags(BTreeMap<String, bool>);

impl CustomFlags {
    pub fn insert(&mut self, key: &str, value: bool) {
        let key = key.trim().to_uppercase();
        if !key.is_empty() {
            self.0.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.0.get(&key.trim().to_uppercase()).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &bool)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, bool)> for CustomFlags {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        let mut flags = CustomFlags::default();
        for (key, value) in iter {
            flags.insert(&key, value);
        }
        flags
    }
}

// ==========================================
// SourceMapping
// ==========================================
// mapping_index is data: preserved verbatim across export/import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapping {
    pub mapping_index: i64,
    pub database: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub column_type: Option<String>,
    pub source_filter_value: Option<String>,
    pub precedence_group: Option<String>,
    pub flags: MappingFlags,
}

impl SourceMapping {
    /// Normalized (database, table, column) used for duplicate detection.
    pub fn target_key(&self) -> (String, String, String) {
        (
            self.database.trim().to_uppercase(),
            self.table.trim().to_uppercase(),
            self.column.trim().to_uppercase(),
        )
    }

    /// Same target and filter, ignoring flags and index.
    pub fn same_target(&self, other: &SourceMapping) -> bool {
        self.target_key() == other.target_key()
            && self.schema.trim().eq_ignore_ascii_case(other.schema.trim())
            && self.source_filter_value == other.source_filter_value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingFlags {
    pub include: bool,
    pub exclude: bool,
    pub transform: bool,
    pub active: bool,
}

impl Default for MappingFlags {
    fn default() -> Self {
        Self {
            include: true,
            exclude: false,
            transform: false,
            active: true,
        }
    }
}

// ==========================================
// FormulaConfig / FormulaRule
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaConfig {
    pub group_name: String,
    pub main_hierarchy_id: String,
    pub rules: Vec<FormulaRule>,
    pub expression: Option<String>, // free-text formula, checked by the anomaly engine
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRule {
    pub operation: FormulaOperation,
    pub hierarchy_name_or_id: String, // name until resolved, hierarchy_id afterwards
    pub precedence: i64,
    pub constant: Option<f64>,
}

// ==========================================
// FilterConfig / TotalFormula
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    pub filter_groups: BTreeMap<String, String>,
    pub total_formula: Option<TotalFormula>,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        self.filter_groups.is_empty() && self.total_formula.is_none()
    }
}

/// Aggregate whose operands are other, distinct hierarchies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalFormula {
    pub group_name: String,
    pub main_hierarchy_name: String,
    pub aggregation: FormulaOperation,
    pub children: Vec<TotalFormulaChild>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalFormulaChild {
    pub hierarchy_id: Option<String>, // None until resolved
    pub hierarchy_name: String,
}
