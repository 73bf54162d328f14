// ==========================================
// Hierarchy Recon - Format detector
// ==========================================
// Scores a header set against three pattern families:
//   legacy (checked first, wins at >= 3 unless a standard-only column is present)
//   hierarchy vs mapping (higher wins at >= 2)
// Ties and low scores fall back to Unknown.
// ==========================================

use crate::domain::columns as col;
use crate::domain::import::FormatDetection;
use crate::domain::types::CsvFormat;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

pub const LEGACY_THRESHOLD: usize = 3;
pub const TABULAR_THRESHOLD: usize = 2;
const CONFIDENCE_PER_FIELD: usize = 20;

// Separator-tolerant, anchored, case-insensitive pattern for a canonical column name.
fn field_pattern(canonical: &str) -> Regex {
    let body = canonical
        .split('_')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[_\-\s]*");
    Regex::new(&format!(r"(?i)^\s*{}\s*$", body)).expect("canonical column pattern")
}

fn family(fields: &[&str]) -> Vec<(String, Regex)> {
    fields
        .iter()
        .map(|f| (f.to_string(), field_pattern(f)))
        .collect()
}

static LEGACY_FIELDS: LazyLock<Vec<(String, Regex)>> = LazyLock::new(|| {
    let mut fields = vec![
        col::XREF_HIERARCHY_KEY,
        col::FORMULA_GROUP,
        col::ARITHMETIC_LOGIC,
        col::FORMULA_PARAM_REF,
    ];
    fields.extend(col::LEGACY_FLAG_COLUMNS.iter().copied());
    family(&fields)
});

static HIERARCHY_FIELDS: LazyLock<Vec<(String, Regex)>> = LazyLock::new(|| {
    family(&[
        col::HIERARCHY_ID,
        col::HIERARCHY_NAME,
        col::PARENT_ID,
        col::DESCRIPTION,
        col::IS_ROOT,
        col::SORT_ORDER,
        col::XREF_KEY,
        col::PARENT_XREF_KEY,
        col::FORMULA_GROUP_NAME,
    ])
});

static MAPPING_FIELDS: LazyLock<Vec<(String, Regex)>> = LazyLock::new(|| {
    family(&[
        col::MAPPING_INDEX,
        col::SOURCE_DATABASE,
        col::SOURCE_SCHEMA,
        col::SOURCE_TABLE,
        col::SOURCE_COLUMN,
        col::SOURCE_COLUMN_TYPE,
        col::SOURCE_UID,
        col::PRECEDENCE_GROUP,
    ])
});

// Columns the legacy layout never carries; any of them rules legacy out.
static STANDARD_ONLY_FIELDS: LazyLock<Vec<(String, Regex)>> =
    LazyLock::new(|| family(&[col::PARENT_ID, col::IS_ROOT]));

static LEVEL_ORDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*level[_\-\s]*(\d+)[_\-\s]*order\s*$").expect("level order pattern")
});

static LEVEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*level[_\-\s]*(\d+)\s*$").expect("level pattern"));

static LEVEL_SORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*level[_\-\s]*(\d+)[_\-\s]*sort\s*$").expect("level sort pattern")
});

pub struct FormatDetector;

impl FormatDetector {
    /// Classify a header set.
    pub fn detect<S: AsRef<str>>(&self, headers: &[S]) -> FormatDetection {
        let headers: Vec<&str> = headers.iter().map(|h| h.as_ref()).collect();

        let legacy_score = self.legacy_score(&headers);
        let hierarchy_score = self.hierarchy_score(&headers);
        let mapping_score = score(&MAPPING_FIELDS, &headers);

        let standard_only = score(&STANDARD_ONLY_FIELDS, &headers) > 0
            || headers.iter().any(|h| LEVEL_ORDER_RE.is_match(h));

        let (format, winning_score) = if legacy_score >= LEGACY_THRESHOLD && !standard_only {
            (CsvFormat::Legacy, legacy_score)
        } else if hierarchy_score > mapping_score && hierarchy_score >= TABULAR_THRESHOLD {
            (CsvFormat::Hierarchy, hierarchy_score)
        } else if mapping_score > hierarchy_score && mapping_score >= TABULAR_THRESHOLD {
            (CsvFormat::Mapping, mapping_score)
        } else {
            (CsvFormat::Unknown, 0)
        };

        let confidence = (winning_score * CONFIDENCE_PER_FIELD).min(100) as u8;
        debug!(
            format = %format,
            confidence,
            legacy_score,
            hierarchy_score,
            mapping_score,
            standard_only,
            "format detected"
        );

        FormatDetection {
            format,
            confidence,
            hierarchy_score,
            mapping_score,
            legacy_score,
        }
    }

    fn legacy_score(&self, headers: &[&str]) -> usize {
        let levels = level_numbers(headers, &LEVEL_RE);
        let sorts = level_numbers(headers, &LEVEL_SORT_RE);
        let paired = levels.intersection(&sorts).next().is_some();
        score(&LEGACY_FIELDS, headers) + usize::from(paired)
    }

    fn hierarchy_score(&self, headers: &[&str]) -> usize {
        let any_level = headers.iter().any(|h| LEVEL_RE.is_match(h));
        score(&HIERARCHY_FIELDS, headers) + usize::from(any_level)
    }
}

/// Number of canonical fields of a family matched by at least one header.
fn score(fields: &[(String, Regex)], headers: &[&str]) -> usize {
    fields
        .iter()
        .filter(|(_, re)| headers.iter().any(|h| re.is_match(h)))
        .count()
}

fn level_numbers(headers: &[&str], re: &Regex) -> HashSet<u32> {
    headers
        .iter()
        .filter_map(|h| re.captures(h))
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
        .collect()
}
