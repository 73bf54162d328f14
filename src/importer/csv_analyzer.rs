// ==========================================
// Hierarchy Recon - CSV analyzer
// ==========================================
// Column profiling of a parsed table before import:
// canonical field, fill counts, boolean/number likeness, samples,
// deepest populated LEVEL_n, custom-flag candidates, detected format.
// ==========================================

use crate::domain::columns as col;
use crate::domain::hierarchy::MAX_LEVELS;
use crate::domain::import::FormatDetection;
use crate::domain::types::ImportDialect;
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_parser::ParsedTable;
use crate::importer::format_detector::FormatDetector;
use crate::importer::hierarchy_importer_trait::{DataCleaner as _, FieldMapper as _};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

const MAX_SAMPLES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub header: String,
    pub normalized: String,
    pub canonical: Option<String>, // None for columns with no fixed meaning
    pub filled: usize,
    pub empty: usize,
    pub distinct: usize,
    pub boolean_like: bool,
    pub numeric_like: bool,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvAnalysis {
    pub detection: FormatDetection,
    pub row_count: usize,
    pub column_count: usize,
    pub level_depth: usize,
    pub columns: Vec<ColumnProfile>,
    pub custom_flag_candidates: Vec<String>,
    pub parse_errors: Vec<String>,
}

pub struct CsvAnalyzer;

impl CsvAnalyzer {
    pub fn analyze(&self, table: &ParsedTable) -> CsvAnalysis {
        let detection = FormatDetector.detect(&table.headers);
        let dialect = ImportDialect::from_format(detection.format).unwrap_or(ImportDialect::Standard);

        let known: HashSet<String> = col::standard_known_columns(MAX_LEVELS)
            .into_iter()
            .chain(col::legacy_known_columns(MAX_LEVELS))
            .chain(col::MAPPING_COLUMNS.iter().map(|c| c.to_string()))
            .collect();

        let columns = table
            .headers
            .iter()
            .zip(&table.normalized_headers)
            .enumerate()
            .map(|(idx, (header, normalized))| self.profile(table, idx, header, normalized, &known))
            .collect();

        CsvAnalysis {
            detection,
            row_count: table.rows.len(),
            column_count: table.headers.len(),
            level_depth: self.level_depth(table),
            columns,
            custom_flag_candidates: FieldMapper.custom_flag_columns(table, dialect),
            parse_errors: table.parse_errors.clone(),
        }
    }

    fn profile(
        &self,
        table: &ParsedTable,
        idx: usize,
        header: &str,
        normalized: &str,
        known: &HashSet<String>,
    ) -> ColumnProfile {
        let values: Vec<&str> = table.column_values(idx).collect();
        let distinct: BTreeSet<&str> = values.iter().copied().collect();
        let has_values = !values.is_empty();

        ColumnProfile {
            header: header.to_string(),
            normalized: normalized.to_string(),
            canonical: known.contains(normalized).then(|| normalized.to_string()),
            filled: values.len(),
            empty: table.rows.len() - values.len(),
            distinct: distinct.len(),
            boolean_like: has_values && values.iter().all(|v| DataCleaner.parse_bool(v).is_some()),
            numeric_like: has_values && values.iter().all(|v| DataCleaner.parse_float(v).is_some()),
            samples: distinct.iter().take(MAX_SAMPLES).map(|s| s.to_string()).collect(),
        }
    }

    /// Highest LEVEL_n holding at least one value.
    fn level_depth(&self, table: &ParsedTable) -> usize {
        (1..=MAX_LEVELS)
            .rev()
            .find(|n| {
                table
                    .column_index(&col::level(*n))
                    .is_some_and(|idx| table.column_values(idx).next().is_some())
            })
            .unwrap_or(0)
    }
}
