// ==========================================
// Hierarchy Recon - File parser
// ==========================================
// Supports: CSV (RFC4180 quoting) / Excel (.xlsx/.xls, first sheet)
// Output: ParsedTable with raw and normalized headers
// ==========================================

use crate::domain::columns::normalize_header;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::hierarchy_importer_trait::FileParser;
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

// ==========================================
// ParsedTable
// ==========================================
/// One data row; `values` is aligned with the table headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub row_number: usize, // 1-based, header excluded
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub normalized_headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub parse_errors: Vec<String>,
    index: HashMap<String, usize>,
}

impl ParsedTable {
    pub fn new(headers: Vec<String>) -> Self {
        let normalized_headers: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut index = HashMap::new();
        for (i, h) in normalized_headers.iter().enumerate() {
            // first occurrence wins for duplicated headers
            index.entry(h.clone()).or_insert(i);
        }
        Self {
            headers,
            normalized_headers,
            rows: Vec::new(),
            parse_errors: Vec::new(),
            index,
        }
    }

    /// Column position by normalized name.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    /// Trimmed non-empty cell value.
    pub fn get<'a>(&self, row: &'a RawRow, column: &str) -> Option<&'a str> {
        self.column_index(column)
            .and_then(|i| row.values.get(i))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Non-empty values of one column (for profiling).
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |r| r.values.get(idx))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn push_record(&mut self, row_number: usize, mut values: Vec<String>) {
        if values.iter().all(|v| v.trim().is_empty()) {
            return;
        }
        if values.len() > self.headers.len() {
            let extra_non_empty = values[self.headers.len()..]
                .iter()
                .any(|v| !v.trim().is_empty());
            if extra_non_empty {
                self.parse_errors.push(format!(
                    "row {}: expected {} columns, found {}",
                    row_number,
                    self.headers.len(),
                    values.len()
                ));
                return;
            }
            values.truncate(self.headers.len());
        }
        // short rows are padded
        values.resize(self.headers.len(), String::new());
        self.rows.push(RawRow { row_number, values });
    }
}

// ==========================================
// CSV Parser
// ==========================================
pub struct CsvParser;

impl CsvParser {
    /// Parse CSV text already in memory.
    pub fn parse_str(&self, text: &str) -> ImportResult<ParsedTable> {
        self.parse_reader(text.as_bytes())
    }

    pub fn parse_reader<R: Read>(&self, source: R) -> ImportResult<ParsedTable> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // row length checked per row
            .from_reader(source);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::MissingHeader);
        }

        let mut table = ParsedTable::new(headers);
        for (idx, result) in reader.records().enumerate() {
            let row_number = idx + 1;
            match result {
                Ok(record) => {
                    let values = record.iter().map(|v| v.to_string()).collect();
                    table.push_record(row_number, values);
                }
                Err(e) => table.parse_errors.push(format!("row {}: {}", row_number, e)),
            }
        }
        Ok(table)
    }
}

impl FileParser for CsvParser {
    fn parse_file(&self, file_path: &Path) -> ImportResult<ParsedTable> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }
        let file = File::open(file_path)?;
        self.parse_reader(file)
    }
}

// ==========================================
// Excel Parser
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_file(&self, file_path: &Path) -> ImportResult<ParsedTable> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        let mut workbook = open_workbook_auto(file_path)?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("workbook has no sheets".to_string()))?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        let mut rows = range.rows();
        let header_row = rows.next().ok_or(ImportError::MissingHeader)?;
        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::MissingHeader);
        }

        let mut table = ParsedTable::new(headers);
        for (idx, data_row) in rows.enumerate() {
            let values = data_row.iter().map(|cell| cell.to_string()).collect();
            table.push_record(idx + 1, values);
        }
        Ok(table)
    }
}

// ==========================================
// Universal parser (picks by extension)
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_file(&self, file_path: &Path) -> ImportResult<ParsedTable> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" | "txt" => CsvParser.parse_file(file_path),
            "xlsx" | "xls" | "xlsm" => ExcelParser.parse_file(file_path),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_csv_parser_normalizes_headers_and_quotes() {
        let table = CsvParser
            .parse_str("Hierarchy Name,level-1,Description\n\"Sales, EU\",Income,\"He said \"\"hi\"\"\"\n")
            .unwrap();

        assert_eq!(table.normalized_headers, vec!["HIERARCHY_NAME", "LEVEL_1", "DESCRIPTION"]);
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(table.get(row, "HIERARCHY_NAME"), Some("Sales, EU"));
        assert_eq!(table.get(row, "DESCRIPTION"), Some("He said \"hi\""));
    }

    #[test]
    fn test_csv_parser_skip_empty_rows() {
        let table = CsvParser.parse_str("A,B\n1,2\n,\n3,4\n").unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].row_number, 3);
    }

    #[test]
    fn test_long_row_is_parse_error_short_row_padded() {
        let table = CsvParser.parse_str("A,B\n1,2,3\n4\n").unwrap();
        assert_eq!(table.parse_errors.len(), 1);
        assert!(table.parse_errors[0].starts_with("row 1:"));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].values, vec!["4".to_string(), String::new()]);
    }

    #[test]
    fn test_csv_parser_file_not_found() {
        let result = CsvParser.parse_file(Path::new("non_existent.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_universal_parser_reads_csv_file() {
        let mut temp_file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(temp_file, "HIERARCHY_ID,HIERARCHY_NAME").unwrap();
        writeln!(temp_file, "REV,Revenue").unwrap();

        let table = UniversalFileParser.parse_file(temp_file.path()).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(table.has_column("HIERARCHY_ID"));
    }

    #[test]
    fn test_universal_parser_rejects_unknown_extension() {
        let result = UniversalFileParser.parse_file(Path::new("data.json"));
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }
}
