// ==========================================
// Hierarchy Recon - Import dialect strategies
// ==========================================
// Standard and legacy files share one pipeline; what differs
// (row grouping, node identity, parent resolution, gap filling)
// sits behind DialectStrategy.
// ==========================================

use crate::domain::hierarchy::{
    FilterConfig, FormulaConfig, FormulaRule, HierarchyNode, NodeFlags, SourceMapping,
};
use crate::domain::import::{ImportSummary, RawHierarchyRow};
use crate::domain::types::{FormulaOperation, ImportDialect};
use crate::importer::arena::{NodeArena, NodeIdx};
use crate::importer::hierarchy_importer::ImportOptions;
use crate::importer::legacy_dialect::LegacyDialect;
use crate::importer::standard_dialect::StandardDialect;
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ==========================================
// RowGroup - one node and its formula-rule rows
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroup {
    pub hierarchy_id: String,
    pub name: String,
    pub path: Vec<String>,
    pub path_sorts: Vec<Option<i64>>,
    pub rows: Vec<RawHierarchyRow>, // rows[0] is the main row
}

impl RowGroup {
    pub fn leader(&self) -> &RawHierarchyRow {
        &self.rows[0]
    }

    pub fn row_number(&self) -> usize {
        self.leader().row_number
    }

    /// Every cross-reference key carried by the group's rows.
    pub fn xrefs(&self) -> impl Iterator<Item = i64> + '_ {
        self.rows.iter().filter_map(|r| r.xref_key)
    }
}

/// Group leadership comparator.
///
/// Rows with an explicit cross-reference key come first, lowest key first;
/// rows without a key follow in file order. Equal keys fall back to file order.
pub fn leadership_order(a: &RawHierarchyRow, b: &RawHierarchyRow) -> Ordering {
    match (a.xref_key, b.xref_key) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.row_number.cmp(&b.row_number)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.row_number.cmp(&b.row_number),
    }
}

/// Missing ancestor to be synthesized (legacy only).
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub hierarchy_id: String,
    pub name: String,
    pub path: Vec<String>,
    pub sorts: Vec<Option<i64>>,
}

// ==========================================
// DialectStrategy Trait
// ==========================================
// Implementors: StandardDialect, LegacyDialect
pub trait DialectStrategy: Send + Sync {
    /// Group mapped rows into nodes; rows that cannot be grouped are summary errors.
    fn group_rows(&self, rows: Vec<RawHierarchyRow>, summary: &mut ImportSummary) -> Vec<RowGroup>;

    /// Ancestor paths needed by the groups but not present as rows, shallowest first.
    fn missing_ancestors(&self, _groups: &[RowGroup]) -> Vec<Placeholder> {
        Vec::new()
    }

    /// Node for a group, not yet linked to a parent.
    fn build_node(&self, project_id: &str, group: &RowGroup, summary: &mut ImportSummary) -> HierarchyNode {
        build_common_node(project_id, group, summary)
    }

    /// Parent of an arena node; `group` is None for placeholders.
    fn resolve_parent(
        &self,
        arena: &NodeArena,
        idx: NodeIdx,
        group: Option<&RowGroup>,
        summary: &mut ImportSummary,
    ) -> Option<NodeIdx>;
}

impl ImportDialect {
    pub fn strategy(self, options: &ImportOptions) -> Box<dyn DialectStrategy> {
        match self {
            ImportDialect::Standard => Box::new(StandardDialect::new(options.standard_window)),
            ImportDialect::Legacy => Box::new(LegacyDialect::new(options.legacy_window)),
        }
    }
}

// ==========================================
// Shared node construction
// ==========================================

/// Node fields common to both dialects. The main row wins; later rows only fill gaps.
pub fn build_common_node(project_id: &str, group: &RowGroup, summary: &mut ImportSummary) -> HierarchyNode {
    let leader = group.leader();
    let mut node = HierarchyNode::new(project_id, &group.hierarchy_id, &group.name);

    node.description = group.rows.iter().find_map(|r| r.description.clone());
    node.level_path = group.path.clone();
    node.level_sort_orders = group.path_sorts.clone();
    node.sort_order = leader
        .sort_order
        .or_else(|| group.path_sorts.last().copied().flatten())
        .unwrap_or(0);
    node.xref_key = leader.xref_key;
    node.flags = merge_flags(&group.rows);

    for row in &group.rows {
        for (key, value) in &row.custom_flags {
            if node.custom_flags.get(key).is_none() {
                node.custom_flags.insert(key, *value);
            }
        }
        for (key, value) in &row.metadata {
            node.metadata.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    node.source_mappings = collect_mappings(&group.rows);

    let mut filter_groups = BTreeMap::new();
    for row in &group.rows {
        for (key, value) in &row.filter_groups {
            filter_groups.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    if !filter_groups.is_empty() {
        node.filter_config = Some(FilterConfig {
            filter_groups,
            total_formula: None,
        });
    }

    node.formula_config = build_formula_config(group, summary);
    node
}

fn merge_flags(rows: &[RawHierarchyRow]) -> NodeFlags {
    let defaults = NodeFlags::default();
    let first = |pick: fn(&RawHierarchyRow) -> Option<bool>, default: bool| {
        rows.iter().find_map(pick).unwrap_or(default)
    };
    NodeFlags {
        include: first(|r| r.flags.include, defaults.include),
        exclude: first(|r| r.flags.exclude, defaults.exclude),
        transform: first(|r| r.flags.transform, defaults.transform),
        calculation: first(|r| r.flags.calculation, defaults.calculation),
        active: first(|r| r.flags.active, defaults.active),
        is_leaf: first(|r| r.flags.is_leaf, defaults.is_leaf),
    }
}

/// Inline mappings of all rows, ordered by index. Rows without an index
/// append after the highest one seen so far; an index already taken keeps its first mapping.
fn collect_mappings(rows: &[RawHierarchyRow]) -> Vec<SourceMapping> {
    let mut by_index: BTreeMap<i64, SourceMapping> = BTreeMap::new();
    for row in rows {
        let Some(mapping) = &row.mapping else {
            continue;
        };
        let index = row
            .mapping_index
            .unwrap_or_else(|| by_index.keys().next_back().map_or(1, |max| max + 1));
        by_index.entry(index).or_insert_with(|| SourceMapping {
            mapping_index: index,
            ..mapping.clone()
        });
    }
    by_index.into_values().collect()
}

/// Formula configuration of a group.
///
/// Each row contributes one rule per operand position (operand or constant present).
/// Precedence defaults to the rule's 1-based position. The group label comes from the
/// first row carrying one, falling back to the node name.
pub fn build_formula_config(group: &RowGroup, summary: &mut ImportSummary) -> Option<FormulaConfig> {
    let mut rules: Vec<FormulaRule> = Vec::new();

    for row in &group.rows {
        let formula = &row.formula;
        let positions = formula.operands.len().max(formula.constants.len());
        for i in 0..positions {
            let operand = formula.operands.get(i).map(|s| s.trim()).unwrap_or("");
            let constant = formula.constants.get(i).copied().flatten();
            if operand.is_empty() && constant.is_none() {
                continue;
            }
            let operation = match formula.operation {
                Some(op) => op,
                None => {
                    summary.warning(format!(
                        "row {}: formula operand '{}' has no operation, using SUM",
                        row.row_number, operand
                    ));
                    FormulaOperation::Sum
                }
            };
            let precedence = formula
                .precedences
                .get(i)
                .copied()
                .flatten()
                .unwrap_or(rules.len() as i64 + 1);
            rules.push(FormulaRule {
                operation,
                hierarchy_name_or_id: operand.to_string(),
                precedence,
                constant,
            });
        }
    }

    let group_name = group.rows.iter().find_map(|r| r.formula.group_name.clone());
    let expression = group.rows.iter().find_map(|r| r.formula.expression.clone());

    if group_name.is_none() && rules.is_empty() && expression.is_none() {
        return None;
    }

    Some(FormulaConfig {
        group_name: group_name.unwrap_or_else(|| group.name.clone()),
        main_hierarchy_id: group.hierarchy_id.clone(),
        rules,
        expression,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::MappingFlags;
    use crate::domain::import::RowFormula;

    fn row(n: usize, xref: Option<i64>) -> RawHierarchyRow {
        RawHierarchyRow {
            row_number: n,
            xref_key: xref,
            ..Default::default()
        }
    }

    fn group(rows: Vec<RawHierarchyRow>) -> RowGroup {
        RowGroup {
            hierarchy_id: "NET".to_string(),
            name: "Net".to_string(),
            path: vec!["Net".to_string()],
            path_sorts: vec![Some(4)],
            rows,
        }
    }

    #[test]
    fn test_leadership_order() {
        let mut rows = vec![row(1, None), row(2, Some(20)), row(3, Some(10)), row(4, None)];
        rows.sort_by(leadership_order);
        let order: Vec<usize> = rows.iter().map(|r| r.row_number).collect();
        assert_eq!(order, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_build_formula_config_from_rule_rows() {
        let mut main = row(1, Some(1));
        main.formula = RowFormula {
            group_name: Some("NET_CALC".to_string()),
            operation: Some(FormulaOperation::Sum),
            operands: vec!["Gross".to_string(), "Other".to_string()],
            precedences: vec![Some(1)],
            ..Default::default()
        };
        let mut extra = row(2, Some(1000));
        extra.formula = RowFormula {
            operation: Some(FormulaOperation::Subtract),
            operands: vec!["Returns".to_string()],
            ..Default::default()
        };

        let mut summary = ImportSummary::default();
        let config = build_formula_config(&group(vec![main, extra]), &mut summary).unwrap();
        assert_eq!(config.group_name, "NET_CALC");
        assert_eq!(config.main_hierarchy_id, "NET");
        assert_eq!(config.rules.len(), 3);
        assert_eq!(config.rules[1].precedence, 2);
        assert_eq!(config.rules[2].operation, FormulaOperation::Subtract);
        assert_eq!(config.rules[2].precedence, 3);
        assert!(summary.warnings.is_empty());
    }

    #[test]
    fn test_operand_without_operation_defaults_to_sum() {
        let mut main = row(1, None);
        main.formula.operands = vec!["Gross".to_string()];
        let mut summary = ImportSummary::default();
        let config = build_formula_config(&group(vec![main]), &mut summary).unwrap();
        assert_eq!(config.rules[0].operation, FormulaOperation::Sum);
        assert_eq!(config.group_name, "Net");
        assert_eq!(summary.warnings.len(), 1);
    }

    #[test]
    fn test_no_formula_columns_means_no_config() {
        let mut summary = ImportSummary::default();
        assert!(build_formula_config(&group(vec![row(1, None)]), &mut summary).is_none());
    }

    #[test]
    fn test_common_node_merges_rows() {
        let mapping = |table: &str| SourceMapping {
            mapping_index: 0,
            database: "DW".to_string(),
            schema: "GL".to_string(),
            table: table.to_string(),
            column: "AMOUNT".to_string(),
            column_type: None,
            source_filter_value: None,
            precedence_group: None,
            flags: MappingFlags::default(),
        };
        let mut main = row(1, Some(1));
        main.flags.active = Some(false);
        main.mapping = Some(mapping("FACT_A"));
        main.mapping_index = Some(3);
        main.custom_flags.insert("SIGN_CHANGE_FLAG".to_string(), true);
        let mut extra = row(2, Some(2));
        extra.mapping = Some(mapping("FACT_B"));
        extra.description = Some("from extra".to_string());
        extra.custom_flags.insert("SIGN_CHANGE_FLAG".to_string(), false);

        let mut summary = ImportSummary::default();
        let node = build_common_node("P1", &group(vec![main, extra]), &mut summary);

        assert!(!node.flags.active);
        assert!(node.flags.include);
        assert_eq!(node.sort_order, 4);
        assert_eq!(node.description.as_deref(), Some("from extra"));
        assert_eq!(node.custom_flags.get("sign_change_flag"), Some(true));
        let indexes: Vec<i64> = node.source_mappings.iter().map(|m| m.mapping_index).collect();
        assert_eq!(indexes, vec![3, 4]);
        assert_eq!(node.source_mappings[1].table, "FACT_B");
    }
}
