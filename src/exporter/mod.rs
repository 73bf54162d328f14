// ==========================================
// Hierarchy Recon - Export layer
// ==========================================
// Responsibility: persisted forest → standard hierarchy CSV / mapping CSV
// Output is re-importable by the standard importer
// ==========================================

pub mod error;
pub mod hierarchy_exporter;
pub mod layout;
pub mod mapping_exporter;

pub use error::{ExportError, ExportResult};
pub use hierarchy_exporter::{export_order, render, ExportOptions, HierarchyExporter};
pub use layout::CsvLayout;
pub use mapping_exporter::{render_mappings, MappingExporter};
