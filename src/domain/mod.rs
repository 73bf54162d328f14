// ==========================================
// Hierarchy Recon - Domain layer
// ==========================================
// Responsibility: entities, enums and column vocabulary
// Constraint: no data access, no engine logic
// ==========================================

pub mod anomaly;
pub mod columns;
pub mod hierarchy;
pub mod import;
pub mod types;

// Re-exports
pub use anomaly::{Anomaly, AnomalySummary, DetectionConfig, FixAction, NodeRef};
pub use hierarchy::{
    CustomFlags, FilterConfig, FormulaConfig, FormulaRule, HierarchyNode, MappingFlags, NodeFlags,
    Project, SourceMapping, TotalFormula, TotalFormulaChild, MAX_LEVELS, META_SYNTHESIZED,
    SYNTHESIZED_ID_PREFIX,
};
pub use import::{
    FormatDetection, ImportSummary, MappingRow, RawHierarchyRow, ResolveReport, RowFlags, RowFormula,
};
pub use types::{AnomalyType, CsvFormat, FormulaOperation, ImportDialect, LevelWindow, Severity};
