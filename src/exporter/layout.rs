// ==========================================
// Hierarchy Recon - CSV layout
// ==========================================
// Fixed column order plus a name → position index so rows can be
// filled by column name and still come out rectangular.
// ==========================================

use crate::exporter::error::{ExportError, ExportResult};
use std::collections::HashMap;

pub struct CsvLayout {
    header: Vec<String>,
    index: HashMap<String, usize>,
}

impl CsvLayout {
    pub fn new(header: Vec<String>) -> Self {
        let index = header
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self { header, index }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn blank(&self) -> Vec<String> {
        vec![String::new(); self.header.len()]
    }

    /// Set a cell; columns outside the layout are ignored.
    pub fn set(&self, record: &mut [String], column: &str, value: impl Into<String>) {
        if let Some(&i) = self.index.get(column) {
            record[i] = value.into();
        }
    }

    pub fn get<'a>(&self, record: &'a [String], column: &str) -> &'a str {
        self.index
            .get(column)
            .map(|&i| record[i].as_str())
            .unwrap_or("")
    }

    /// Serialize header + records as CSV text.
    pub fn write(&self, records: &[Vec<String>]) -> ExportResult<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for record in records {
            writer.write_record(record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ExportError::CsvWriteError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ExportError::CsvWriteError(e.to_string()))
    }
}
