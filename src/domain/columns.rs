// ==========================================
// Hierarchy Recon - CSV column names
// ==========================================
// Canonical (normalized) header names of the three file layouts.
// Headers are normalized before lookup: upper-case, `-`/space → `_`.
// ==========================================

// ===== Standard hierarchy format =====
pub const HIERARCHY_ID: &str = "HIERARCHY_ID";
pub const HIERARCHY_NAME: &str = "HIERARCHY_NAME";
pub const DESCRIPTION: &str = "DESCRIPTION";
pub const PARENT_ID: &str = "PARENT_ID";
pub const IS_ROOT: &str = "IS_ROOT";
pub const SORT_ORDER: &str = "SORT_ORDER";
pub const XREF_KEY: &str = "XREF_KEY";
pub const PARENT_XREF_KEY: &str = "PARENT_XREF_KEY";

pub const INCLUDE_FLAG: &str = "INCLUDE_FLAG";
pub const EXCLUDE_FLAG: &str = "EXCLUDE_FLAG";
pub const TRANSFORM_FLAG: &str = "TRANSFORM_FLAG";
pub const CALCULATION_FLAG: &str = "CALCULATION_FLAG";
pub const ACTIVE_FLAG: &str = "ACTIVE_FLAG";
pub const IS_LEAF_NODE: &str = "IS_LEAF_NODE";

pub const FORMULA_GROUP_NAME: &str = "FORMULA_GROUP_NAME";
pub const FORMULA_OPERATION: &str = "FORMULA_OPERATION";
pub const FORMULA_OPERAND: &str = "FORMULA_OPERAND";
pub const FORMULA_PRECEDENCE: &str = "FORMULA_PRECEDENCE";
pub const FORMULA_CONSTANT: &str = "FORMULA_CONSTANT";
pub const FORMULA_EXPRESSION: &str = "FORMULA_EXPRESSION";
pub const AGGREGATION: &str = "AGGREGATION";

/// Number of FILTER_GROUP_n columns.
pub const FILTER_GROUP_COUNT: usize = 4;

/// Separator for folded multi-operand cells.
pub const MULTI_VALUE_SEPARATOR: char = '|';

// ===== Legacy format =====
pub const XREF_HIERARCHY_KEY: &str = "XREF_HIERARCHY_KEY";
pub const FORMULA_GROUP: &str = "FORMULA_GROUP";
pub const ARITHMETIC_LOGIC: &str = "ARITHMETIC_LOGIC";
pub const FORMULA_PARAM_REF: &str = "FORMULA_PARAM_REF";
pub const FORMULA_PARAM2_CONST_NUMBER: &str = "FORMULA_PARAM2_CONST_NUMBER";
pub const EXCLUSION_FLAG: &str = "EXCLUSION_FLAG";

/// Legacy flag columns without a fixed slot; imported as custom flags.
pub const LEGACY_FLAG_COLUMNS: &[&str] = &[
    "DO_NOT_EXPAND_FLAG",
    "IS_SECURED_FLAG",
    "SPLIT_ACTIVE_FLAG",
    "EXCLUSION_FLAG",
    "VOLUME_FLAG",
    "ID_UNPIVOT_FLAG",
    "ID_ROW_FLAG",
    "REMOVE_FROM_TOTALS",
    "SIGN_CHANGE_FLAG",
    "CREATE_NEW_COLUMN",
];

// ===== Mapping format =====
pub const MAPPING_INDEX: &str = "MAPPING_INDEX";
pub const SOURCE_DATABASE: &str = "SOURCE_DATABASE";
pub const SOURCE_SCHEMA: &str = "SOURCE_SCHEMA";
pub const SOURCE_TABLE: &str = "SOURCE_TABLE";
pub const SOURCE_COLUMN: &str = "SOURCE_COLUMN";
pub const SOURCE_COLUMN_TYPE: &str = "SOURCE_COLUMN_TYPE";
pub const SOURCE_UID: &str = "SOURCE_UID";
pub const PRECEDENCE_GROUP: &str = "PRECEDENCE_GROUP";

/// Mapping export column order.
pub const MAPPING_COLUMNS: &[&str] = &[
    HIERARCHY_ID,
    MAPPING_INDEX,
    SOURCE_DATABASE,
    SOURCE_SCHEMA,
    SOURCE_TABLE,
    SOURCE_COLUMN,
    SOURCE_COLUMN_TYPE,
    SOURCE_UID,
    PRECEDENCE_GROUP,
    INCLUDE_FLAG,
    EXCLUDE_FLAG,
    TRANSFORM_FLAG,
    ACTIVE_FLAG,
];

pub fn level(n: usize) -> String {
    format!("LEVEL_{}", n)
}

/// Standard per-level sort column.
pub fn level_order(n: usize) -> String {
    format!("LEVEL_{}_ORDER", n)
}

/// Legacy per-level sort column.
pub fn level_sort(n: usize) -> String {
    format!("LEVEL_{}_SORT", n)
}

pub fn filter_group(n: usize) -> String {
    format!("FILTER_GROUP_{}", n)
}

/// Normalize a header for lookup: trim, upper-case, separators → `_`.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for ch in raw.trim().trim_start_matches('\u{feff}').chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            if !last_underscore && !out.is_empty() {
                out.push('_');
            }
            last_underscore = true;
        } else {
            out.extend(ch.to_uppercase());
            last_underscore = false;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Columns with a fixed meaning in the standard format (custom flags excluded).
pub fn standard_known_columns(max_levels: usize) -> Vec<String> {
    let mut cols: Vec<String> = [
        HIERARCHY_ID,
        HIERARCHY_NAME,
        DESCRIPTION,
        PARENT_ID,
        IS_ROOT,
        SORT_ORDER,
        XREF_KEY,
        PARENT_XREF_KEY,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    cols.extend((1..=max_levels).map(level));
    cols.extend((1..=max_levels).map(level_order));
    cols.extend(
        [
            INCLUDE_FLAG,
            EXCLUDE_FLAG,
            TRANSFORM_FLAG,
            CALCULATION_FLAG,
            ACTIVE_FLAG,
            IS_LEAF_NODE,
            FORMULA_GROUP_NAME,
            FORMULA_OPERATION,
            FORMULA_OPERAND,
            FORMULA_PRECEDENCE,
            FORMULA_CONSTANT,
            FORMULA_EXPRESSION,
            AGGREGATION,
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    cols.extend((1..=FILTER_GROUP_COUNT).map(filter_group));
    cols
}

/// Columns with a fixed meaning in the legacy format.
pub fn legacy_known_columns(max_levels: usize) -> Vec<String> {
    let mut cols: Vec<String> = [
        XREF_HIERARCHY_KEY,
        PARENT_XREF_KEY,
        HIERARCHY_ID,
        HIERARCHY_NAME,
        DESCRIPTION,
        SORT_ORDER,
        ACTIVE_FLAG,
        CALCULATION_FLAG,
        INCLUDE_FLAG,
        EXCLUDE_FLAG,
        TRANSFORM_FLAG,
        IS_LEAF_NODE,
        FORMULA_GROUP,
        FORMULA_PRECEDENCE,
        ARITHMETIC_LOGIC,
        FORMULA_PARAM_REF,
        FORMULA_PARAM2_CONST_NUMBER,
        SOURCE_DATABASE,
        SOURCE_SCHEMA,
        SOURCE_TABLE,
        SOURCE_COLUMN,
        SOURCE_COLUMN_TYPE,
        SOURCE_UID,
        PRECEDENCE_GROUP,
        MAPPING_INDEX,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    cols.extend((1..=max_levels).map(level));
    cols.extend((1..=max_levels).map(level_sort));
    cols.extend((1..=FILTER_GROUP_COUNT).map(filter_group));
    cols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Hierarchy Name"), "HIERARCHY_NAME");
        assert_eq!(normalize_header(" level-1 sort "), "LEVEL_1_SORT");
        assert_eq!(normalize_header("\u{feff}HIERARCHY_ID"), "HIERARCHY_ID");
        assert_eq!(normalize_header("parent__id"), "PARENT_ID");
    }

    #[test]
    fn test_known_columns_do_not_overlap_legacy_sort() {
        let standard = standard_known_columns(15);
        assert!(standard.contains(&"LEVEL_3_ORDER".to_string()));
        assert!(!standard.iter().any(|c| c.ends_with("_SORT")));
    }
}
