// ==========================================
// Hierarchy Recon - Total-formula detection
// ==========================================
// A FORMULA_GROUP_NAME shared by several distinct nodes, exactly one of
// which carries AGGREGATION, is a total formula: the aggregating node
// gets filter_config.total_formula, the other nodes become its children.
//
// Label shared by distinct nodes:
//   0 aggregators          → ordinary shared label, left alone
//   >1 aggregators         → warning, not converted
//   node with repeat rows  → warning, not converted (could be a rule group)
// ==========================================

use crate::domain::hierarchy::{FilterConfig, HierarchyNode, TotalFormula, TotalFormulaChild};
use crate::domain::import::ImportSummary;
use crate::domain::types::FormulaOperation;
use crate::importer::dialect::RowGroup;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TotalFormulaPlan {
    pub label: String,
    pub aggregation: FormulaOperation,
    pub parent: usize,        // group index
    pub children: Vec<usize>, // group indexes, file order
}

#[derive(Default)]
struct LabelUse {
    groups: Vec<usize>,
    rows_per_group: HashMap<usize, usize>,
    aggregators: Vec<(usize, FormulaOperation)>,
}

/// Scan the row groups for total-formula labels.
pub fn plan_total_formulas(groups: &[RowGroup], summary: &mut ImportSummary) -> Vec<TotalFormulaPlan> {
    let mut order: Vec<String> = Vec::new();
    let mut uses: HashMap<String, LabelUse> = HashMap::new();

    for (gi, group) in groups.iter().enumerate() {
        for row in &group.rows {
            let Some(label) = &row.formula.group_name else {
                continue;
            };
            let entry = uses.entry(label.clone()).or_insert_with(|| {
                order.push(label.clone());
                LabelUse::default()
            });
            if !entry.groups.contains(&gi) {
                entry.groups.push(gi);
            }
            *entry.rows_per_group.entry(gi).or_insert(0) += 1;
            if let Some(aggregation) = row.formula.aggregation {
                entry.aggregators.push((gi, aggregation));
            }
        }
    }

    let mut plans = Vec::new();
    for label in order {
        let Some(usage) = uses.remove(&label) else {
            continue;
        };
        if usage.groups.len() < 2 || usage.aggregators.is_empty() {
            continue;
        }
        if usage.aggregators.len() > 1 {
            summary.warning(format!(
                "formula group '{}': {} rows carry AGGREGATION, total formula not created",
                label,
                usage.aggregators.len()
            ));
            continue;
        }
        if let Some((gi, _)) = usage.rows_per_group.iter().find(|(_, count)| **count > 1) {
            summary.warning(format!(
                "formula group '{}': node '{}' repeats the label on several rows, total formula not created",
                label, groups[*gi].name
            ));
            continue;
        }

        let (parent, aggregation) = usage.aggregators[0];
        plans.push(TotalFormulaPlan {
            label,
            aggregation,
            parent,
            children: usage.groups.into_iter().filter(|g| *g != parent).collect(),
        });
    }
    plans
}

impl TotalFormulaPlan {
    /// Attach the total formula to the aggregating node. Child ids are known from the batch.
    pub fn apply(&self, groups: &[RowGroup], parent: &mut HierarchyNode) {
        let total = TotalFormula {
            group_name: self.label.clone(),
            main_hierarchy_name: parent.name.clone(),
            aggregation: self.aggregation,
            children: self
                .children
                .iter()
                .map(|gi| TotalFormulaChild {
                    hierarchy_id: Some(groups[*gi].hierarchy_id.clone()),
                    hierarchy_name: groups[*gi].name.clone(),
                })
                .collect(),
        };
        parent
            .filter_config
            .get_or_insert_with(FilterConfig::default)
            .total_formula = Some(total);
    }

    /// The label was only a total-formula marker on this node; drop the empty formula config.
    pub fn strip_label(&self, node: &mut HierarchyNode) {
        let label_only = node.formula_config.as_ref().is_some_and(|f| {
            f.group_name == self.label && f.rules.is_empty() && f.expression.is_none()
        });
        if label_only {
            node.formula_config = None;
        }
    }

    pub fn participants(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.parent).chain(self.children.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::FormulaConfig;
    use crate::domain::import::RawHierarchyRow;

    fn group(id: &str, rows: Vec<(Option<&str>, Option<FormulaOperation>)>) -> RowGroup {
        RowGroup {
            hierarchy_id: id.to_string(),
            name: id.to_lowercase(),
            path: Vec::new(),
            path_sorts: Vec::new(),
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, (label, agg))| {
                    let mut row = RawHierarchyRow {
                        row_number: i + 1,
                        ..Default::default()
                    };
                    row.formula.group_name = label.map(str::to_string);
                    row.formula.aggregation = agg;
                    row
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_aggregator_creates_plan() {
        let groups = vec![
            group("TOTAL", vec![(Some("T1"), Some(FormulaOperation::Sum))]),
            group("A", vec![(Some("T1"), None)]),
            group("B", vec![(Some("T1"), None)]),
        ];
        let mut summary = ImportSummary::default();
        let plans = plan_total_formulas(&groups, &mut summary);

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].parent, 0);
        assert_eq!(plans[0].children, vec![1, 2]);
        assert!(summary.warnings.is_empty());

        let mut node = HierarchyNode::new("P1", "TOTAL", "total");
        node.formula_config = Some(FormulaConfig {
            group_name: "T1".to_string(),
            main_hierarchy_id: "TOTAL".to_string(),
            rules: Vec::new(),
            expression: None,
        });
        plans[0].apply(&groups, &mut node);
        plans[0].strip_label(&mut node);
        assert!(node.formula_config.is_none());
        let total = node.total_formula().unwrap();
        assert_eq!(total.children.len(), 2);
        assert_eq!(total.children[0].hierarchy_id.as_deref(), Some("A"));
    }

    #[test]
    fn test_no_aggregator_is_ordinary_label() {
        let groups = vec![group("A", vec![(Some("G"), None)]), group("B", vec![(Some("G"), None)])];
        let mut summary = ImportSummary::default();
        assert!(plan_total_formulas(&groups, &mut summary).is_empty());
        assert!(summary.warnings.is_empty());
    }

    #[test]
    fn test_ambiguous_labels_warn() {
        let two_aggregators = vec![
            group("A", vec![(Some("G"), Some(FormulaOperation::Sum))]),
            group("B", vec![(Some("G"), Some(FormulaOperation::Sum))]),
        ];
        let mut summary = ImportSummary::default();
        assert!(plan_total_formulas(&two_aggregators, &mut summary).is_empty());
        assert_eq!(summary.warnings.len(), 1);

        let repeats = vec![
            group("A", vec![(Some("G"), Some(FormulaOperation::Sum))]),
            group("B", vec![(Some("G"), None), (Some("G"), None)]),
        ];
        let mut summary = ImportSummary::default();
        assert!(plan_total_formulas(&repeats, &mut summary).is_empty());
        assert_eq!(summary.warnings.len(), 1);
    }

    #[test]
    fn test_single_node_label_is_rule_group() {
        let groups = vec![group(
            "NET",
            vec![(Some("G"), Some(FormulaOperation::Sum)), (Some("G"), None)],
        )];
        let mut summary = ImportSummary::default();
        assert!(plan_total_formulas(&groups, &mut summary).is_empty());
        assert!(summary.warnings.is_empty());
    }
}
