// ==========================================
// Hierarchy Recon - Importer Traits
// ==========================================
// Responsibility: interfaces of the import pipeline stages (no implementation)
// Pipeline: parse → map → group → build → resolve refs → link → persist
// ==========================================

use crate::domain::import::{ImportSummary, MappingRow, RawHierarchyRow};
use crate::domain::types::ImportDialect;
use crate::importer::error::ImportResult;
use crate::importer::file_parser::{ParsedTable, RawRow};
use std::collections::HashSet;
use std::path::Path;

// ==========================================
// HierarchyImporter Trait
// ==========================================
// Implementor: HierarchyImporterImpl
pub trait HierarchyImporter {
    /// Import a parsed table in the given dialect.
    ///
    /// # Returns
    /// - Ok(ImportSummary): per-row errors and warnings are inside the summary
    /// - Err(ProjectNotFound): nothing was processed
    fn import_table(
        &self,
        project_id: &str,
        table: &ParsedTable,
        dialect: ImportDialect,
    ) -> ImportResult<ImportSummary>;

    /// Import already-mapped rows.
    ///
    /// `has_leaf_column` tells whether IS_LEAF_NODE was present; when it was not,
    /// `is_leaf` is derived from the linked structure.
    fn import_rows(
        &self,
        project_id: &str,
        rows: Vec<RawHierarchyRow>,
        dialect: ImportDialect,
        has_leaf_column: bool,
    ) -> ImportResult<ImportSummary>;
}

// ==========================================
// FileParser Trait
// ==========================================
// Implementors: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    /// Parse a file into header + rows.
    ///
    /// Malformed rows are reported in `ParsedTable::parse_errors` and skipped;
    /// only a missing/unreadable file or a missing header is an Err.
    fn parse_file(&self, file_path: &Path) -> ImportResult<ParsedTable>;
}

// ==========================================
// FieldMapper Trait
// ==========================================
// Implementor: FieldMapper
pub trait FieldMapper: Send + Sync {
    /// Map one standard-dialect row.
    fn map_standard_row(
        &self,
        table: &ParsedTable,
        row: &RawRow,
        custom_flag_columns: &[String],
    ) -> ImportResult<RawHierarchyRow>;

    /// Map one legacy-dialect row.
    fn map_legacy_row(
        &self,
        table: &ParsedTable,
        row: &RawRow,
        custom_flag_columns: &[String],
    ) -> ImportResult<RawHierarchyRow>;

    /// Map one mapping-CSV row.
    fn map_mapping_row(&self, table: &ParsedTable, row: &RawRow) -> ImportResult<MappingRow>;

    /// Columns of `table` carried as custom flags in the given dialect.
    fn custom_flag_columns(&self, table: &ParsedTable, dialect: ImportDialect) -> Vec<String>;
}

// ==========================================
// DataCleaner Trait
// ==========================================
// Implementor: DataCleaner
pub trait DataCleaner: Send + Sync {
    /// Trim (and optionally upper-case) a text value.
    fn clean_text(&self, value: &str, uppercase: bool) -> String;

    /// Blank → None, otherwise the trimmed value.
    fn normalize_null(&self, value: Option<&str>) -> Option<String>;

    /// TRUE/FALSE, 1/0, Y/N, YES/NO, T/F (case-insensitive). None for anything else.
    fn parse_bool(&self, value: &str) -> Option<bool>;

    /// Integer, tolerating a zero fraction written by spreadsheets ("12.0").
    fn parse_int(&self, value: &str) -> Option<i64>;

    fn parse_float(&self, value: &str) -> Option<f64>;

    /// Upper-snake identifier: "Net Sales (EU)" → "NET_SALES_EU".
    fn slugify(&self, value: &str) -> String;
}

// ==========================================
// ConflictHandler Trait
// ==========================================
// Implementor: ConflictHandler
pub trait ConflictHandler: Send + Sync {
    /// Repeated hierarchy ids within one batch.
    ///
    /// # Returns
    /// - Vec<(row_number, hierarchy_id)>: every occurrence after the first
    fn detect_duplicates(&self, keys: &[(usize, String)]) -> Vec<(usize, String)>;

    /// Hierarchy ids already present in the project.
    fn detect_existing(
        &self,
        keys: &[(usize, String)],
        existing_ids: &HashSet<String>,
    ) -> Vec<(usize, String)>;
}
