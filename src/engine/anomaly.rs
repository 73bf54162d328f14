// ==========================================
// Hierarchy Recon - Anomaly engine
// ==========================================
// Responsibility: static analysis of an assembled forest
// Checks: missing mapping, type mismatch, sibling pattern, cycles,
// duplicate mapping, formula issues, naming
// Constraint: never mutates or persists nodes
// ==========================================

mod checks;
mod core;
mod report;


pub use self::core::AnomalyDetector;
pub use report::{summarize, AnomalyReport};
