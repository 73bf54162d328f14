// ==========================================
// Hierarchy Recon - Data cleaner
// ==========================================
// Responsibility: TRIM / NULL normalization / boolean and number literals
// ==========================================

use crate::importer::hierarchy_importer_trait::DataCleaner as DataCleanerTrait;

pub struct DataCleaner;

impl DataCleanerTrait for DataCleaner {
    fn clean_text(&self, value: &str, uppercase: bool) -> String {
        let trimmed = value.trim();
        if uppercase {
            trimmed.to_uppercase()
        } else {
            trimmed.to_string()
        }
    }

    fn normalize_null(&self, value: Option<&str>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn parse_bool(&self, value: &str) -> Option<bool> {
        match value.trim().to_uppercase().as_str() {
            "TRUE" | "T" | "1" | "Y" | "YES" => Some(true),
            "FALSE" | "F" | "0" | "N" | "NO" => Some(false),
            _ => None,
        }
    }

    fn parse_int(&self, value: &str) -> Option<i64> {
        let trimmed = value.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return Some(v);
        }
        // spreadsheets write integers as "12.0"
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
            _ => None,
        }
    }

    fn parse_float(&self, value: &str) -> Option<f64> {
        trimmed_number(value).parse::<f64>().ok().filter(|f| f.is_finite())
    }

    fn slugify(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut pending_sep = false;
        for ch in value.trim().chars() {
            if ch.is_alphanumeric() {
                if pending_sep && !out.is_empty() {
                    out.push('_');
                }
                pending_sep = false;
                out.extend(ch.to_uppercase());
            } else {
                pending_sep = true;
            }
        }
        out
    }
}

// Thousands separators are tolerated in numeric cells.
fn trimmed_number(value: &str) -> String {
    value.trim().replace(',', "")
}

impl DataCleaner {
    /// Slug of a level path, segments joined with "__".
    pub fn slugify_path(&self, path: &[String]) -> String {
        path.iter()
            .map(|segment| self.slugify(segment))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("__")
    }

    /// `TRUE`/`FALSE` literal written to CSV.
    pub fn format_bool(value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_literals() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.parse_bool("true"), Some(true));
        assert_eq!(cleaner.parse_bool(" Yes "), Some(true));
        assert_eq!(cleaner.parse_bool("0"), Some(false));
        assert_eq!(cleaner.parse_bool("n"), Some(false));
        assert_eq!(cleaner.parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_int_accepts_spreadsheet_floats() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.parse_int("12"), Some(12));
        assert_eq!(cleaner.parse_int("12.0"), Some(12));
        assert_eq!(cleaner.parse_int("12.5"), None);
        assert_eq!(cleaner.parse_int("abc"), None);
    }

    #[test]
    fn test_parse_float() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.parse_float("1,250.5"), Some(1250.5));
        assert_eq!(cleaner.parse_float("-3"), Some(-3.0));
        assert_eq!(cleaner.parse_float("x"), None);
    }

    #[test]
    fn test_normalize_null() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.normalize_null(Some("  ")), None);
        assert_eq!(cleaner.normalize_null(Some("NULL")), None);
        assert_eq!(cleaner.normalize_null(Some(" a ")), Some("a".to_string()));
        assert_eq!(cleaner.normalize_null(None), None);
    }

    #[test]
    fn test_slugify() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.slugify("Net Sales (EU)"), "NET_SALES_EU");
        assert_eq!(cleaner.slugify("  cost-of goods "), "COST_OF_GOODS");
        assert_eq!(
            cleaner.slugify_path(&["Income".to_string(), "Product Sales".to_string()]),
            "INCOME__PRODUCT_SALES"
        );
    }
}
