use crate::domain::anomaly::{Anomaly, AnomalySummary};
use serde::{Deserialize, Serialize};

// ==========================================
// AnomalyReport - detection output for callers
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    pub project_id: String,
    pub anomalies: Vec<Anomaly>,
    pub summary: AnomalySummary,
}

impl AnomalyReport {
    pub fn new(project_id: &str, anomalies: Vec<Anomaly>) -> Self {
        let summary = summarize(&anomalies);
        Self {
            project_id: project_id.to_string(),
            anomalies,
            summary,
        }
    }
}

/// Counts by type, by severity and auto-fixable.
pub fn summarize(anomalies: &[Anomaly]) -> AnomalySummary {
    let mut summary = AnomalySummary {
        total: anomalies.len(),
        ..Default::default()
    };
    for anomaly in anomalies {
        *summary
            .by_type
            .entry(anomaly.anomaly_type.to_string())
            .or_default() += 1;
        *summary
            .by_severity
            .entry(anomaly.severity.to_string())
            .or_default() += 1;
        if anomaly.auto_fixable {
            summary.auto_fixable_count += 1;
        }
    }
    summary
}
