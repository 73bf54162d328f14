// ==========================================
// Hierarchy Recon - Engine layer
// ==========================================
// Responsibility: analysis rules over an in-memory forest, no SQL
// ==========================================

pub mod anomaly;

pub use anomaly::{AnomalyDetector, AnomalyReport};
