// ==========================================
// Hierarchy Recon - Anomaly domain model
// ==========================================
// Output of the anomaly engine: JSON-serializable findings,
// per-check toggles and the aggregated summary.
// ==========================================

use crate::domain::types::{AnomalyType, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ==========================================
// Anomaly
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub node_ref: Option<NodeRef>,
    pub message: String,
    pub details: Value,
    pub auto_fixable: bool,
    pub fix_action: Option<FixAction>,
}

/// Node an anomaly points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub id: String,
    pub hierarchy_id: String,
    pub name: String,
}

/// Suggested fix for auto-fixable anomalies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixAction {
    pub action: String,
    pub params: Value,
}

// ==========================================
// DetectionConfig - per-check toggles
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionConfig {
    pub check_missing_mappings: bool,
    pub check_type_mismatches: bool,
    pub check_pattern_consistency: bool,
    pub check_cycles: bool,
    pub check_duplicate_mappings: bool,
    pub check_formulas: bool,
    pub check_naming: bool,
    /// Share of mapped siblings that must agree on one table (0.0..=1.0).
    pub pattern_consistency_threshold: f64,
    /// Optional regex every node name must match.
    pub naming_pattern: Option<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            check_missing_mappings: true,
            check_type_mismatches: true,
            check_pattern_consistency: true,
            check_cycles: true,
            check_duplicate_mappings: true,
            check_formulas: true,
            check_naming: true,
            pattern_consistency_threshold: 0.7,
            naming_pattern: None,
        }
    }
}

// ==========================================
// AnomalySummary
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalySummary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub auto_fixable_count: usize,
}
