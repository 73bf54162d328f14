// ==========================================
// Hierarchy Recon - Field mapper
// ==========================================
// Responsibility: source column → RawHierarchyRow / MappingRow + type conversion
// Lookups use normalized headers (see columns::normalize_header)
// ==========================================

use crate::domain::columns::{self as col, MULTI_VALUE_SEPARATOR};
use crate::domain::hierarchy::{MappingFlags, SourceMapping, MAX_LEVELS};
use crate::domain::import::{MappingRow, RawHierarchyRow, RowFlags, RowFormula};
use crate::domain::types::{FormulaOperation, ImportDialect};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{ParsedTable, RawRow};
use crate::importer::hierarchy_importer_trait::{
    DataCleaner as DataCleanerTrait, FieldMapper as FieldMapperTrait,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Metadata keys written by the legacy mapping.
pub mod meta_keys {
    pub const ARITHMETIC_LOGIC: &str = "arithmetic_logic";
    pub const PROJECT_LABEL: &str = "project_label";
    pub const LEGACY_XREF: &str = "legacy_xref";
}

pub struct FieldMapper;

impl FieldMapperTrait for FieldMapper {
    fn map_standard_row(
        &self,
        table: &ParsedTable,
        row: &RawRow,
        custom_flag_columns: &[String],
    ) -> ImportResult<RawHierarchyRow> {
        let n = row.row_number;
        let mut level_sorts = self.level_sorts(table, row, col::level_order)?;
        // Files produced by older tools use LEVEL_n_SORT in the standard layout too
        if level_sorts.iter().all(Option::is_none) {
            level_sorts = self.level_sorts(table, row, col::level_sort)?;
        }
        let (mapping, mapping_index) = self.inline_mapping(table, row)?;

        Ok(RawHierarchyRow {
            row_number: n,
            hierarchy_id: self.get_string(table, row, col::HIERARCHY_ID),
            name: self.get_string(table, row, col::HIERARCHY_NAME),
            description: self.get_string(table, row, col::DESCRIPTION),
            parent_hierarchy_id: self.get_string(table, row, col::PARENT_ID),
            is_root: self.parse_bool(table, row, col::IS_ROOT)?,
            sort_order: self.parse_int(table, row, col::SORT_ORDER)?,
            xref_key: self.parse_int(table, row, col::XREF_KEY)?,
            parent_xref_key: self.parse_int(table, row, col::PARENT_XREF_KEY)?,
            levels: self.levels(table, row),
            level_sorts,
            flags: self.row_flags(table, row)?,
            custom_flags: self.custom_flags(table, row, custom_flag_columns),
            formula: self.standard_formula(table, row)?,
            filter_groups: self.filter_groups(table, row),
            mapping,
            mapping_index,
            metadata: Default::default(),
        })
    }

    fn map_legacy_row(
        &self,
        table: &ParsedTable,
        row: &RawRow,
        custom_flag_columns: &[String],
    ) -> ImportResult<RawHierarchyRow> {
        let n = row.row_number;
        let levels = self.levels(table, row);
        let xref_key = self.parse_int(table, row, col::XREF_HIERARCHY_KEY)?;
        let (mapping, mapping_index) = self.inline_mapping(table, row)?;

        // ARITHMETIC_LOGIC is either an operation keyword or a free-text formula
        let arithmetic_logic = self.get_string(table, row, col::ARITHMETIC_LOGIC);
        let operation = arithmetic_logic.as_deref().and_then(FormulaOperation::parse);
        let expression = match (&arithmetic_logic, operation) {
            (Some(raw), None) => Some(raw.clone()),
            _ => None,
        };
        let operand = self.get_string(table, row, col::FORMULA_PARAM_REF);
        let constant = self.parse_float(table, row, col::FORMULA_PARAM2_CONST_NUMBER)?;
        let formula = RowFormula {
            group_name: self.get_string(table, row, col::FORMULA_GROUP),
            operation,
            operation_raw: arithmetic_logic.clone(),
            operands: if operand.is_some() || constant.is_some() {
                vec![operand.unwrap_or_default()]
            } else {
                Vec::new()
            },
            precedences: vec![self.parse_int(table, row, col::FORMULA_PRECEDENCE)?],
            constants: vec![constant],
            expression,
            aggregation: None,
        };

        let mut metadata = serde_json::Map::new();
        if let Some(raw) = arithmetic_logic {
            metadata.insert(meta_keys::ARITHMETIC_LOGIC.to_string(), Value::String(raw));
        }
        if let Some(label) = levels.first().filter(|l| !l.is_empty()) {
            metadata.insert(meta_keys::PROJECT_LABEL.to_string(), Value::String(label.clone()));
        }
        if let Some(key) = xref_key {
            metadata.insert(meta_keys::LEGACY_XREF.to_string(), Value::from(key));
        }

        Ok(RawHierarchyRow {
            row_number: n,
            hierarchy_id: self.get_string(table, row, col::HIERARCHY_ID),
            name: self.get_string(table, row, col::HIERARCHY_NAME),
            description: self.get_string(table, row, col::DESCRIPTION),
            parent_hierarchy_id: None,
            is_root: None,
            sort_order: self.parse_int(table, row, col::SORT_ORDER)?,
            xref_key,
            parent_xref_key: self.parse_int(table, row, col::PARENT_XREF_KEY)?,
            levels,
            level_sorts: self.level_sorts(table, row, col::level_sort)?,
            flags: self.row_flags(table, row)?,
            custom_flags: self.custom_flags(table, row, custom_flag_columns),
            formula,
            filter_groups: self.filter_groups(table, row),
            mapping,
            mapping_index,
            metadata,
        })
    }

    fn map_mapping_row(&self, table: &ParsedTable, row: &RawRow) -> ImportResult<MappingRow> {
        let (mapping, mapping_index) = self.inline_mapping(table, row)?;
        let mut mapping = mapping.ok_or_else(|| ImportError::FieldMappingError {
            row: row.row_number,
            message: "SOURCE_TABLE and SOURCE_COLUMN are both empty".to_string(),
        })?;

        let defaults = MappingFlags::default();
        mapping.flags = MappingFlags {
            include: self
                .parse_bool(table, row, col::INCLUDE_FLAG)?
                .unwrap_or(defaults.include),
            exclude: self
                .parse_bool(table, row, col::EXCLUDE_FLAG)?
                .unwrap_or(defaults.exclude),
            transform: self
                .parse_bool(table, row, col::TRANSFORM_FLAG)?
                .unwrap_or(defaults.transform),
            active: self
                .parse_bool(table, row, col::ACTIVE_FLAG)?
                .unwrap_or(defaults.active),
        };

        Ok(MappingRow {
            row_number: row.row_number,
            hierarchy_id: self.get_string(table, row, col::HIERARCHY_ID),
            mapping_index,
            mapping,
        })
    }

    fn custom_flag_columns(&self, table: &ParsedTable, dialect: ImportDialect) -> Vec<String> {
        // Columns of either layout are never flags, whichever dialect reads the file
        let mut known: HashSet<String> = col::standard_known_columns(MAX_LEVELS)
            .into_iter()
            .chain(col::legacy_known_columns(MAX_LEVELS))
            .collect();
        known.extend(col::MAPPING_COLUMNS.iter().map(|c| c.to_string()));

        let mut columns: Vec<String> = Vec::new();
        for (idx, header) in table.normalized_headers.iter().enumerate() {
            if header.is_empty() || columns.contains(header) {
                continue;
            }
            let is_legacy_flag =
                dialect == ImportDialect::Legacy && col::LEGACY_FLAG_COLUMNS.contains(&header.as_str());
            if is_legacy_flag {
                columns.push(header.clone());
                continue;
            }
            if known.contains(header) {
                continue;
            }
            let mut values = table.column_values(idx).peekable();
            if values.peek().is_none() {
                continue;
            }
            if values.all(|v| DataCleaner.parse_bool(v).is_some()) {
                columns.push(header.clone());
            }
        }
        columns
    }
}

impl FieldMapper {
    fn get_string(&self, table: &ParsedTable, row: &RawRow, column: &str) -> Option<String> {
        DataCleaner.normalize_null(table.get(row, column))
    }

    fn parse_int(&self, table: &ParsedTable, row: &RawRow, column: &str) -> ImportResult<Option<i64>> {
        match self.get_string(table, row, column) {
            None => Ok(None),
            Some(value) => DataCleaner
                .parse_int(&value)
                .map(Some)
                .ok_or_else(|| conversion_error(row, column, &value, "not an integer")),
        }
    }

    fn parse_float(&self, table: &ParsedTable, row: &RawRow, column: &str) -> ImportResult<Option<f64>> {
        match self.get_string(table, row, column) {
            None => Ok(None),
            Some(value) => DataCleaner
                .parse_float(&value)
                .map(Some)
                .ok_or_else(|| conversion_error(row, column, &value, "not a number")),
        }
    }

    fn parse_bool(&self, table: &ParsedTable, row: &RawRow, column: &str) -> ImportResult<Option<bool>> {
        match self.get_string(table, row, column) {
            None => Ok(None),
            Some(value) => DataCleaner
                .parse_bool(&value)
                .map(Some)
                .ok_or_else(|| conversion_error(row, column, &value, "not a boolean")),
        }
    }

    fn parse_operation(
        &self,
        table: &ParsedTable,
        row: &RawRow,
        column: &str,
    ) -> ImportResult<Option<FormulaOperation>> {
        match self.get_string(table, row, column) {
            None => Ok(None),
            Some(value) => FormulaOperation::parse(&value)
                .map(Some)
                .ok_or_else(|| conversion_error(row, column, &value, "unknown operation")),
        }
    }

    /// LEVEL_1..LEVEL_15 positionally ("" where absent).
    fn levels(&self, table: &ParsedTable, row: &RawRow) -> Vec<String> {
        (1..=MAX_LEVELS)
            .map(|n| {
                table
                    .get(row, &col::level(n))
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect()
    }

    fn level_sorts(
        &self,
        table: &ParsedTable,
        row: &RawRow,
        column_name: fn(usize) -> String,
    ) -> ImportResult<Vec<Option<i64>>> {
        (1..=MAX_LEVELS)
            .map(|n| self.parse_int(table, row, &column_name(n)))
            .collect()
    }

    fn row_flags(&self, table: &ParsedTable, row: &RawRow) -> ImportResult<RowFlags> {
        Ok(RowFlags {
            include: self.parse_bool(table, row, col::INCLUDE_FLAG)?,
            exclude: self.parse_bool(table, row, col::EXCLUDE_FLAG)?,
            transform: self.parse_bool(table, row, col::TRANSFORM_FLAG)?,
            calculation: self.parse_bool(table, row, col::CALCULATION_FLAG)?,
            active: self.parse_bool(table, row, col::ACTIVE_FLAG)?,
            is_leaf: self.parse_bool(table, row, col::IS_LEAF_NODE)?,
        })
    }

    // Unparsable values in flag columns are ignored rather than failing the row.
    fn custom_flags(
        &self,
        table: &ParsedTable,
        row: &RawRow,
        columns: &[String],
    ) -> BTreeMap<String, bool> {
        columns
            .iter()
            .filter_map(|c| {
                table
                    .get(row, c)
                    .and_then(|v| DataCleaner.parse_bool(v))
                    .map(|b| (c.clone(), b))
            })
            .collect()
    }

    fn standard_formula(&self, table: &ParsedTable, row: &RawRow) -> ImportResult<RowFormula> {
        let operation_raw = self.get_string(table, row, col::FORMULA_OPERATION);
        let operation = self.parse_operation(table, row, col::FORMULA_OPERATION)?;

        let operands = split_multi(table.get(row, col::FORMULA_OPERAND));
        let precedences = split_multi(table.get(row, col::FORMULA_PRECEDENCE))
            .into_iter()
            .map(|p| {
                if p.is_empty() {
                    Ok(None)
                } else {
                    DataCleaner
                        .parse_int(&p)
                        .map(Some)
                        .ok_or_else(|| conversion_error(row, col::FORMULA_PRECEDENCE, &p, "not an integer"))
                }
            })
            .collect::<ImportResult<Vec<_>>>()?;
        let constants = split_multi(table.get(row, col::FORMULA_CONSTANT))
            .into_iter()
            .map(|c| {
                if c.is_empty() {
                    Ok(None)
                } else {
                    DataCleaner
                        .parse_float(&c)
                        .map(Some)
                        .ok_or_else(|| conversion_error(row, col::FORMULA_CONSTANT, &c, "not a number"))
                }
            })
            .collect::<ImportResult<Vec<_>>>()?;

        Ok(RowFormula {
            group_name: self.get_string(table, row, col::FORMULA_GROUP_NAME),
            operation,
            operation_raw,
            operands,
            precedences,
            constants,
            expression: self.get_string(table, row, col::FORMULA_EXPRESSION),
            aggregation: self.parse_operation(table, row, col::AGGREGATION)?,
        })
    }

    fn filter_groups(&self, table: &ParsedTable, row: &RawRow) -> BTreeMap<String, String> {
        (1..=col::FILTER_GROUP_COUNT)
            .filter_map(|n| {
                let column = col::filter_group(n);
                self.get_string(table, row, &column).map(|v| (column, v))
            })
            .collect()
    }

    /// SOURCE_* columns of a row, if it names a table or column.
    fn inline_mapping(
        &self,
        table: &ParsedTable,
        row: &RawRow,
    ) -> ImportResult<(Option<SourceMapping>, Option<i64>)> {
        let source_table = self.get_string(table, row, col::SOURCE_TABLE);
        let source_column = self.get_string(table, row, col::SOURCE_COLUMN);
        if source_table.is_none() && source_column.is_none() {
            return Ok((None, None));
        }

        let mapping_index = self.parse_int(table, row, col::MAPPING_INDEX)?;
        let mapping = SourceMapping {
            mapping_index: mapping_index.unwrap_or(0),
            database: self
                .get_string(table, row, col::SOURCE_DATABASE)
                .unwrap_or_default(),
            schema: self
                .get_string(table, row, col::SOURCE_SCHEMA)
                .unwrap_or_default(),
            table: source_table.unwrap_or_default(),
            column: source_column.unwrap_or_default(),
            column_type: self.get_string(table, row, col::SOURCE_COLUMN_TYPE),
            source_filter_value: self.get_string(table, row, col::SOURCE_UID),
            precedence_group: self.get_string(table, row, col::PRECEDENCE_GROUP),
            flags: MappingFlags::default(),
        };
        Ok((Some(mapping), mapping_index))
    }
}

/// Split a `|`-separated cell, keeping empty positions so parallel lists stay aligned.
fn split_multi(value: Option<&str>) -> Vec<String> {
    match value {
        None => Vec::new(),
        Some(v) => v
            .split(MULTI_VALUE_SEPARATOR)
            .map(|s| s.trim().to_string())
            .collect(),
    }
}

fn conversion_error(row: &RawRow, field: &str, value: &str, message: &str) -> ImportError {
    ImportError::TypeConversionError {
        row: row.row_number,
        field: field.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::file_parser::CsvParser;

    #[test]
    fn test_map_standard_row_with_folded_operands() {
        let table = CsvParser
            .parse_str(
                "HIERARCHY_ID,HIERARCHY_NAME,LEVEL_1,LEVEL_1_ORDER,XREF_KEY,FORMULA_OPERATION,FORMULA_OPERAND,FORMULA_PRECEDENCE,FORMULA_CONSTANT,ACTIVE_FLAG\n\
                 NET,Net,Income,3,7,+,A|B|,1||3,||2.5,false\n",
            )
            .unwrap();
        let row = FieldMapper
            .map_standard_row(&table, &table.rows[0], &[])
            .unwrap();

        assert_eq!(row.hierarchy_id.as_deref(), Some("NET"));
        assert_eq!(row.xref_key, Some(7));
        assert_eq!(row.levels[0], "Income");
        assert_eq!(row.level_sorts[0], Some(3));
        assert_eq!(row.flags.active, Some(false));
        assert_eq!(row.flags.include, None);
        assert_eq!(row.formula.operation, Some(FormulaOperation::Sum));
        assert_eq!(row.formula.operands, vec!["A", "B", ""]);
        assert_eq!(row.formula.precedences, vec![Some(1), None, Some(3)]);
        assert_eq!(row.formula.constants, vec![None, None, Some(2.5)]);
    }

    #[test]
    fn test_bad_integer_is_row_error() {
        let table = CsvParser
            .parse_str("HIERARCHY_NAME,SORT_ORDER\nRevenue,first\n")
            .unwrap();
        let err = FieldMapper
            .map_standard_row(&table, &table.rows[0], &[])
            .unwrap_err();
        assert!(err.to_string().starts_with("row 1:"));
    }

    #[test]
    fn test_unknown_operation_is_row_error_in_standard() {
        let table = CsvParser
            .parse_str("HIERARCHY_NAME,FORMULA_OPERATION\nRevenue,POWER\n")
            .unwrap();
        assert!(FieldMapper
            .map_standard_row(&table, &table.rows[0], &[])
            .is_err());
    }

    #[test]
    fn test_map_legacy_row_keeps_raw_logic() {
        let table = CsvParser
            .parse_str(
                "XREF_HIERARCHY_KEY,LEVEL_1,LEVEL_1_SORT,LEVEL_2,ARITHMETIC_LOGIC,FORMULA_PARAM_REF,SIGN_CHANGE_FLAG\n\
                 10,FY Plan,1,Income,{Sales} - {Returns},,TRUE\n\
                 11,FY Plan,1,Income,MINUS,Returns,FALSE\n",
            )
            .unwrap();
        let flags = FieldMapper.custom_flag_columns(&table, ImportDialect::Legacy);
        assert_eq!(flags, vec!["SIGN_CHANGE_FLAG".to_string()]);

        let first = FieldMapper
            .map_legacy_row(&table, &table.rows[0], &flags)
            .unwrap();
        assert_eq!(first.formula.operation, None);
        assert_eq!(first.formula.expression.as_deref(), Some("{Sales} - {Returns}"));
        assert_eq!(
            first.metadata.get(meta_keys::PROJECT_LABEL),
            Some(&Value::String("FY Plan".to_string()))
        );
        assert_eq!(first.custom_flags.get("SIGN_CHANGE_FLAG"), Some(&true));

        let second = FieldMapper
            .map_legacy_row(&table, &table.rows[1], &flags)
            .unwrap();
        assert_eq!(second.formula.operation, Some(FormulaOperation::Subtract));
        assert_eq!(second.formula.operands, vec!["Returns"]);
        assert_eq!(
            second.metadata.get(meta_keys::ARITHMETIC_LOGIC),
            Some(&Value::String("MINUS".to_string()))
        );
    }

    #[test]
    fn test_custom_flag_discovery_standard() {
        let table = CsvParser
            .parse_str(
                "HIERARCHY_NAME,IS_SECURED,NOTES,EMPTY_COL\nA,TRUE,hello,\nB,false,x,\n",
            )
            .unwrap();
        let flags = FieldMapper.custom_flag_columns(&table, ImportDialect::Standard);
        assert_eq!(flags, vec!["IS_SECURED".to_string()]);
    }

    #[test]
    fn test_layout_columns_never_become_flags() {
        let table = CsvParser
            .parse_str(
                "HIERARCHY_ID,HIERARCHY_NAME,PARENT_ID,IS_ROOT,LEVEL_1,LEVEL_1_ORDER,LEVEL_2_SORT,VOLUME_FLAG,IS_SECURED\n\
                 INCOME,Income,,1,Income,1,0,TRUE,false\n\
                 SALES,Sales,INCOME,0,Income,0,1,FALSE,true\n",
            )
            .unwrap();
        let legacy = FieldMapper.custom_flag_columns(&table, ImportDialect::Legacy);
        assert_eq!(legacy, vec!["VOLUME_FLAG".to_string(), "IS_SECURED".to_string()]);

        let standard = FieldMapper.custom_flag_columns(&table, ImportDialect::Standard);
        assert_eq!(standard, vec!["VOLUME_FLAG".to_string(), "IS_SECURED".to_string()]);
    }

    #[test]
    fn test_map_mapping_row() {
        let table = CsvParser
            .parse_str(
                "HIERARCHY_ID,MAPPING_INDEX,SOURCE_DATABASE,SOURCE_SCHEMA,SOURCE_TABLE,SOURCE_COLUMN,ACTIVE_FLAG\n\
                 REV,4,DW,GL,FACT_GL,AMOUNT,FALSE\n\
                 REV,,DW,GL,,,TRUE\n",
            )
            .unwrap();
        let mapped = FieldMapper.map_mapping_row(&table, &table.rows[0]).unwrap();
        assert_eq!(mapped.mapping_index, Some(4));
        assert_eq!(mapped.mapping.table, "FACT_GL");
        assert!(!mapped.mapping.flags.active);

        assert!(FieldMapper.map_mapping_row(&table, &table.rows[1]).is_err());
    }
}
