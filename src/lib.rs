// ==========================================
// Hierarchy Recon - Core library
// ==========================================
// Flat legacy CSV exports → validated hierarchy forest and back,
// plus static anomaly analysis of the stored forest.
// Stack: Rust + SQLite
// ==========================================

// ==========================================
// Module declarations
// ==========================================

// Domain layer - entities and column vocabulary
pub mod domain;

// Repository layer - data access
pub mod repository;

// Engine layer - anomaly analysis
pub mod engine;

// Import layer - CSV / Excel → forest
pub mod importer;

// Export layer - forest → CSV
pub mod exporter;

// Configuration layer
pub mod config;

// Database infrastructure (connection setup / schema)
pub mod db;

// Logging
pub mod logging;

// API layer - facade
pub mod api;

// ==========================================
// Re-exports
// ==========================================

pub use domain::types::{AnomalyType, CsvFormat, FormulaOperation, ImportDialect, Severity};

pub use domain::{
    Anomaly, AnomalySummary, DetectionConfig, FormatDetection, HierarchyNode, ImportSummary,
    Project, ResolveReport, SourceMapping,
};

pub use engine::{AnomalyDetector, AnomalyReport};

pub use exporter::{ExportOptions, HierarchyExporter, MappingExporter};

pub use importer::{FormatDetector, HierarchyImporterImpl, ImportOptions, MappingImporter};

pub use api::{ApiError, HierarchyApi, ImportReport};

// ==========================================
// Version
// ==========================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "Hierarchy Recon";
