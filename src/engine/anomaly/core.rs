// ==========================================
// Hierarchy Recon - Anomaly detector
// ==========================================
// Read-only analysis of an assembled forest.
// Input: all nodes of a project + DetectionConfig
// Output: anomalies sorted error → warning → info (stable within a severity)
// ==========================================

use crate::domain::anomaly::{Anomaly, AnomalySummary, DetectionConfig};
use crate::domain::hierarchy::{HierarchyNode, SourceMapping};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use super::checks::{self, Forest};
use super::report;

// ==========================================
// AnomalyDetector
// ==========================================
// Stateless; toggles and thresholds come in with each call
#[derive(Debug, Default)]
pub struct AnomalyDetector;

impl AnomalyDetector {
    pub fn new() -> Self {
        Self
    }

    /// Run every enabled check over the forest.
    ///
    /// An invalid `naming_pattern` disables only the pattern part of the naming check.
    #[instrument(skip(self, nodes, config), fields(nodes = nodes.len()))]
    pub fn detect(&self, nodes: &[HierarchyNode], config: &DetectionConfig) -> Vec<Anomaly> {
        let forest = Forest::new(nodes);
        let mut anomalies = Vec::new();

        if config.check_cycles {
            checks::cycles(&forest, &mut anomalies);
        }
        if config.check_missing_mappings {
            checks::missing_mappings(&forest, &mut anomalies);
        }
        if config.check_type_mismatches {
            checks::type_mismatches(&forest, &mut anomalies);
        }
        if config.check_pattern_consistency {
            checks::pattern_consistency(&forest, config.pattern_consistency_threshold, &mut anomalies);
        }
        if config.check_duplicate_mappings {
            checks::duplicate_mappings(&forest, &mut anomalies);
        }
        if config.check_formulas {
            checks::formulas(&forest, &mut anomalies);
        }
        if config.check_naming {
            let pattern = config
                .naming_pattern
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .and_then(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(pattern = p, error = %e, "invalid naming pattern ignored");
                        None
                    }
                });
            checks::naming(&forest, pattern.as_ref(), &mut anomalies);
        }

        anomalies.sort_by_key(|a| a.severity);
        info!(found = anomalies.len(), "anomaly detection finished");
        anomalies
    }

    /// Duplicate and type checks for one mapping before it is committed.
    pub fn check_mapping_change(
        &self,
        node: &HierarchyNode,
        candidate: &SourceMapping,
        all_nodes: &[HierarchyNode],
    ) -> Vec<Anomaly> {
        let mut anomalies: Vec<Anomaly> = checks::duplicate_for_candidate(node, candidate, all_nodes)
            .into_iter()
            .chain(checks::type_mismatch(node, candidate))
            .collect();
        anomalies.sort_by_key(|a| a.severity);
        debug!(
            hierarchy_id = %node.hierarchy_id,
            found = anomalies.len(),
            "mapping change checked"
        );
        anomalies
    }

    pub fn summarize(&self, anomalies: &[Anomaly]) -> AnomalySummary {
        report::summarize(anomalies)
    }
}
