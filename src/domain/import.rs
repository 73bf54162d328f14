// ==========================================
// Hierarchy Recon - Import domain model
// ==========================================
// Intermediate row record (file parser → field mapper → this struct)
// and the result types returned by import / resolve calls.
// Lifetime: rows live only inside one import call
// ==========================================

use crate::domain::hierarchy::SourceMapping;
use crate::domain::types::{CsvFormat, FormulaOperation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ==========================================
// RawHierarchyRow - mapped CSV row
// ==========================================
// Both dialects map into this shape; fields a dialect does not carry stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHierarchyRow {
    pub row_number: usize, // 1-based data row, used in error messages

    // Identity
    pub hierarchy_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,

    // Structure
    pub parent_hierarchy_id: Option<String>,
    pub is_root: Option<bool>,
    pub sort_order: Option<i64>,
    pub xref_key: Option<i64>,
    pub parent_xref_key: Option<i64>,
    pub levels: Vec<String>,           // LEVEL_1..LEVEL_15, positional, "" when empty
    pub level_sorts: Vec<Option<i64>>, // LEVEL_n sort columns, positional

    // Flags
    pub flags: RowFlags,
    pub custom_flags: BTreeMap<String, bool>,

    // Calculation
    pub formula: RowFormula,
    pub filter_groups: BTreeMap<String, String>,

    // Inline source mapping; index None means "append after the highest"
    pub mapping: Option<SourceMapping>,
    pub mapping_index: Option<i64>,

    // Legacy-only fields kept for round trip
    pub metadata: Map<String, Value>,
}

/// Fixed flags as read from the row; `None` when the column is absent or blank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFlags {
    pub include: Option<bool>,
    pub exclude: Option<bool>,
    pub transform: Option<bool>,
    pub calculation: Option<bool>,
    pub active: Option<bool>,
    pub is_leaf: Option<bool>,
}

/// Formula columns of one row.
///
/// Standard rows may fold several operands sharing one operation into a single row
/// (`|`-separated parallel lists); legacy rows carry at most one operand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowFormula {
    pub group_name: Option<String>,
    pub operation: Option<FormulaOperation>,
    pub operation_raw: Option<String>,
    pub operands: Vec<String>,
    pub precedences: Vec<Option<i64>>,
    pub constants: Vec<Option<f64>>,
    pub expression: Option<String>,
    pub aggregation: Option<FormulaOperation>,
}

impl RowFormula {
    pub fn has_rule_data(&self) -> bool {
        self.operation.is_some() && (!self.operands.is_empty() || !self.constants.is_empty())
    }
}

/// One row of a mapping CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRow {
    pub row_number: usize,
    pub hierarchy_id: Option<String>,
    pub mapping_index: Option<i64>,
    pub mapping: SourceMapping,
}

// ==========================================
// ImportSummary - result of one import call
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub synthesized: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ImportSummary {
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another summary (e.g. parse-stage errors) into this one.
    pub fn merge(&mut self, other: ImportSummary) {
        self.imported += other.imported;
        self.skipped += other.skipped;
        self.synthesized += other.synthesized;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

// ==========================================
// ResolveReport - Formula Reference Resolver result
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
    pub nodes_updated: usize,
    pub references_resolved: usize,
    pub warnings: Vec<String>,
}

// ==========================================
// FormatDetection - Format Detector result
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDetection {
    pub format: CsvFormat,
    pub confidence: u8,
    pub hierarchy_score: usize,
    pub mapping_score: usize,
    pub legacy_score: usize,
}
