// ==========================================
// Hierarchy Recon - Import layer
// ==========================================
// Responsibility: CSV / Excel → persisted hierarchy forest
// Supports: standard and legacy hierarchy files, mapping files
// ==========================================

// Module declarations
pub mod arena;
pub mod conflict_handler;
pub mod csv_analyzer;
pub mod data_cleaner;
pub mod dialect;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod format_detector;
pub mod formula_resolver;
pub mod hierarchy_importer;
pub mod hierarchy_importer_trait;
pub mod legacy_dialect;
pub mod level_path;
pub mod mapping_importer;
pub mod standard_dialect;
pub mod total_formula;

// Re-export core types
pub use conflict_handler::ConflictHandler as ConflictHandlerImpl;
pub use csv_analyzer::{ColumnProfile, CsvAnalysis, CsvAnalyzer};
pub use data_cleaner::DataCleaner as DataCleanerImpl;
pub use dialect::{DialectStrategy, RowGroup};
pub use error::{ImportError, ImportResult};
pub use field_mapper::FieldMapper as FieldMapperImpl;
pub use file_parser::{CsvParser, ExcelParser, ParsedTable, RawRow, UniversalFileParser};
pub use format_detector::FormatDetector;
pub use formula_resolver::{FormulaReferenceResolver, ReferenceIndex};
pub use hierarchy_importer::{HierarchyImporterImpl, ImportOptions};
pub use level_path::LevelPathResolver;
pub use mapping_importer::MappingImporter;

// Re-export trait interfaces
pub use hierarchy_importer_trait::{
    ConflictHandler, DataCleaner, FieldMapper, FileParser, HierarchyImporter,
};
