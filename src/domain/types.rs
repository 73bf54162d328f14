// ==========================================
// Hierarchy Recon - Domain type definitions
// ==========================================
// Enumerations shared by the importer, exporter and anomaly engine.
// Serialized forms match what the CSV files and JSON payloads carry.
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// Formula operation
// ==========================================
// Serialized as SUM / SUBTRACT / MULTIPLY / DIVIDE / AVERAGE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormulaOperation {
    Sum,
    Subtract,
    Multiply,
    Divide,
    Average,
}

impl FormulaOperation {
    /// Canonical upper-case keyword written to CSV.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaOperation::Sum => "SUM",
            FormulaOperation::Subtract => "SUBTRACT",
            FormulaOperation::Multiply => "MULTIPLY",
            FormulaOperation::Divide => "DIVIDE",
            FormulaOperation::Average => "AVERAGE",
        }
    }

    /// Parse an operation keyword or symbol.
    ///
    /// Legacy exports use a mix of words and symbols (`ADD`, `+`, `MINUS`, `AVG` ...),
    /// all of which map onto the five canonical operations. Returns `None` for anything
    /// else so callers can keep the raw text as a free-form expression.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase();
        match normalized.as_str() {
            "SUM" | "ADD" | "PLUS" | "+" | "TOTAL" => Some(FormulaOperation::Sum),
            "SUBTRACT" | "SUB" | "MINUS" | "-" | "LESS" => Some(FormulaOperation::Subtract),
            "MULTIPLY" | "MUL" | "TIMES" | "*" | "X" => Some(FormulaOperation::Multiply),
            "DIVIDE" | "DIV" | "/" => Some(FormulaOperation::Divide),
            "AVERAGE" | "AVG" | "MEAN" => Some(FormulaOperation::Average),
            _ => None,
        }
    }
}

impl fmt::Display for FormulaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// Anomaly severity
// ==========================================
// Ordering: Error < Warning < Info, so a plain sort puts errors first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

// ==========================================
// Anomaly type
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    MissingMapping,
    TypeMismatch,
    PatternInconsistency,
    CircularReference,
    DuplicateMapping,
    FormulaIssue,
    NamingConvention,
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnomalyType::MissingMapping => "missing_mapping",
            AnomalyType::TypeMismatch => "type_mismatch",
            AnomalyType::PatternInconsistency => "pattern_inconsistency",
            AnomalyType::CircularReference => "circular_reference",
            AnomalyType::DuplicateMapping => "duplicate_mapping",
            AnomalyType::FormulaIssue => "formula_issue",
            AnomalyType::NamingConvention => "naming_convention",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// CSV format (Format Detector output)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvFormat {
    Hierarchy,
    Mapping,
    Legacy,
    Unknown,
}

impl fmt::Display for CsvFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvFormat::Hierarchy => write!(f, "hierarchy"),
            CsvFormat::Mapping => write!(f, "mapping"),
            CsvFormat::Legacy => write!(f, "legacy"),
            CsvFormat::Unknown => write!(f, "unknown"),
        }
    }
}

// ==========================================
// Import dialect
// ==========================================
// Standard: current hierarchy export; Legacy: old reporting tool export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportDialect {
    Standard,
    Legacy,
}

impl ImportDialect {
    /// Dialect implied by a detected format (mapping/unknown files have none).
    pub fn from_format(format: CsvFormat) -> Option<Self> {
        match format {
            CsvFormat::Hierarchy => Some(ImportDialect::Standard),
            CsvFormat::Legacy => Some(ImportDialect::Legacy),
            CsvFormat::Mapping | CsvFormat::Unknown => None,
        }
    }
}

impl fmt::Display for ImportDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportDialect::Standard => write!(f, "standard"),
            ImportDialect::Legacy => write!(f, "legacy"),
        }
    }
}

// ==========================================
// Level window
// ==========================================
// Inclusive, 1-based range of LEVEL_n columns a dialect reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelWindow {
    pub first: usize,
    pub last: usize,
}

impl LevelWindow {
    /// Standard dialect: LEVEL_1..LEVEL_9
    pub const STANDARD: LevelWindow = LevelWindow { first: 1, last: 9 };

    /// Legacy dialect: LEVEL_1 holds the project name, tree levels are LEVEL_2..LEVEL_9
    pub const LEGACY: LevelWindow = LevelWindow { first: 2, last: 9 };

    pub fn columns(&self) -> std::ops::RangeInclusive<usize> {
        self.first..=self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_parse_aliases() {
        assert_eq!(FormulaOperation::parse("sum"), Some(FormulaOperation::Sum));
        assert_eq!(FormulaOperation::parse(" + "), Some(FormulaOperation::Sum));
        assert_eq!(FormulaOperation::parse("Minus"), Some(FormulaOperation::Subtract));
        assert_eq!(FormulaOperation::parse("AVG"), Some(FormulaOperation::Average));
        assert_eq!(FormulaOperation::parse("{A} + {B}"), None);
    }

    #[test]
    fn test_severity_order() {
        let mut severities = vec![Severity::Info, Severity::Error, Severity::Warning];
        severities.sort();
        assert_eq!(
            severities,
            vec![Severity::Error, Severity::Warning, Severity::Info]
        );
    }

    #[test]
    fn test_anomaly_type_serialization() {
        let json = serde_json::to_string(&AnomalyType::CircularReference).unwrap();
        assert_eq!(json, "\"circular_reference\"");
        assert_eq!(AnomalyType::CircularReference.to_string(), "circular_reference");
    }

    #[test]
    fn test_dialect_from_format() {
        assert_eq!(
            ImportDialect::from_format(CsvFormat::Legacy),
            Some(ImportDialect::Legacy)
        );
        assert_eq!(ImportDialect::from_format(CsvFormat::Mapping), None);
    }
}
