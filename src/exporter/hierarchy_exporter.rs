// ==========================================
// Hierarchy Recon - Hierarchy exporter
// ==========================================
// Forest → standard-format CSV (inverse of the standard importer).
// Order: depth-first from roots, siblings by (sort_order, arrival).
// Placeholders are walked through but not written.
// Formula rules with the main row's operation fold into the main row;
// each other operation gets one extra row keyed by a synthetic XREF_KEY.
// ==========================================

use crate::domain::columns as col;
use crate::domain::hierarchy::{FormulaRule, HierarchyNode, MAX_LEVELS};
use crate::domain::types::FormulaOperation;
use crate::exporter::error::{ExportError, ExportResult};
use crate::exporter::layout::CsvLayout;
use crate::importer::data_cleaner::DataCleaner;
use crate::repository::HierarchyRepository;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, instrument};

// ==========================================
// ExportOptions
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    pub synthetic_xref_start: i64,
    pub max_levels: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            synthetic_xref_start: 1000,
            max_levels: MAX_LEVELS,
        }
    }
}

// ==========================================
// Traversal
// ==========================================

/// Node indexes in export order. Placeholders are included (callers filter);
/// nodes only reachable through a cycle are appended in arrival order.
pub fn export_order(nodes: &[HierarchyNode]) -> Vec<usize> {
    let by_id: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        match node.parent_id.as_deref().and_then(|p| by_id.get(p)) {
            Some(&parent) if parent != i => children.entry(parent).or_default().push(i),
            // roots and orphans whose parent is not in the project
            _ => roots.push(i),
        }
    }
    let sibling_key = |i: &usize| (nodes[*i].sort_order, *i);
    roots.sort_by_key(sibling_key);
    for list in children.values_mut() {
        list.sort_by_key(sibling_key);
    }

    let mut order = Vec::with_capacity(nodes.len());
    let mut visited = vec![false; nodes.len()];
    let starts: Vec<usize> = roots.into_iter().chain(0..nodes.len()).collect();
    for start in starts {
        if visited[start] {
            continue;
        }
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            order.push(i);
            if let Some(kids) = children.get(&i) {
                stack.extend(kids.iter().rev().filter(|k| !visited[**k]));
            }
        }
    }
    order
}

/// Ancestor chain root → self (cycle-safe).
fn ancestor_chain(nodes: &[HierarchyNode], by_id: &HashMap<&str, usize>, idx: usize) -> Vec<usize> {
    let mut chain = vec![idx];
    let mut seen: HashSet<usize> = HashSet::from([idx]);
    let mut current = idx;
    while let Some(&parent) = nodes[current]
        .parent_id
        .as_deref()
        .and_then(|p| by_id.get(p))
    {
        if !seen.insert(parent) {
            break;
        }
        chain.push(parent);
        current = parent;
    }
    chain.reverse();
    chain
}

// ==========================================
// Rendering
// ==========================================

fn hierarchy_header(max_levels: usize, custom_flags: &[String]) -> Vec<String> {
    let mut header: Vec<String> = [
        col::HIERARCHY_ID,
        col::HIERARCHY_NAME,
        col::DESCRIPTION,
        col::PARENT_ID,
        col::IS_ROOT,
        col::SORT_ORDER,
        col::XREF_KEY,
        col::PARENT_XREF_KEY,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend((1..=max_levels).map(col::level));
    header.extend((1..=max_levels).map(col::level_order));
    header.extend(
        [
            col::INCLUDE_FLAG,
            col::EXCLUDE_FLAG,
            col::TRANSFORM_FLAG,
            col::CALCULATION_FLAG,
            col::ACTIVE_FLAG,
            col::IS_LEAF_NODE,
            col::FORMULA_GROUP_NAME,
            col::FORMULA_OPERATION,
            col::FORMULA_OPERAND,
            col::FORMULA_PRECEDENCE,
            col::FORMULA_CONSTANT,
            col::FORMULA_EXPRESSION,
            col::AGGREGATION,
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    header.extend((1..=col::FILTER_GROUP_COUNT).map(col::filter_group));
    header.extend(custom_flags.iter().cloned());
    header
}

/// Rules grouped by operation in order of first appearance; the first group is the main row's.
fn rules_by_operation(rules: &[FormulaRule]) -> Vec<(FormulaOperation, Vec<&FormulaRule>)> {
    let mut groups: Vec<(FormulaOperation, Vec<&FormulaRule>)> = Vec::new();
    for rule in rules {
        match groups.iter_mut().find(|(op, _)| *op == rule.operation) {
            Some((_, list)) => list.push(rule),
            None => groups.push((rule.operation, vec![rule])),
        }
    }
    groups
}

fn write_rules(layout: &CsvLayout, record: &mut [String], operation: FormulaOperation, rules: &[&FormulaRule]) {
    let sep = col::MULTI_VALUE_SEPARATOR.to_string();
    layout.set(record, col::FORMULA_OPERATION, operation.as_str());
    layout.set(
        record,
        col::FORMULA_OPERAND,
        rules
            .iter()
            .map(|r| r.hierarchy_name_or_id.as_str())
            .collect::<Vec<_>>()
            .join(&sep),
    );
    layout.set(
        record,
        col::FORMULA_PRECEDENCE,
        rules
            .iter()
            .map(|r| r.precedence.to_string())
            .collect::<Vec<_>>()
            .join(&sep),
    );
    if rules.iter().any(|r| r.constant.is_some()) {
        layout.set(
            record,
            col::FORMULA_CONSTANT,
            rules
                .iter()
                .map(|r| r.constant.map(|c| c.to_string()).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(&sep),
        );
    }
}

/// Main-row XREF_KEY per exported node: the stored key when unique, otherwise
/// the next free key counting from 1.
fn assign_main_keys(nodes: &[HierarchyNode], exported: &[usize]) -> HashMap<usize, i64> {
    let mut keys = HashMap::new();
    let mut used: HashSet<i64> = HashSet::new();
    let mut pending = Vec::new();
    for &i in exported {
        match nodes[i].xref_key {
            Some(key) if used.insert(key) => {
                keys.insert(i, key);
            }
            _ => pending.push(i),
        }
    }
    let mut next = 1;
    for i in pending {
        while used.contains(&next) {
            next += 1;
        }
        used.insert(next);
        keys.insert(i, next);
    }
    keys
}

/// Render nodes (repository order) as standard-format CSV text.
pub fn render(nodes: &[HierarchyNode], options: &ExportOptions) -> ExportResult<String> {
    let max_levels = options.max_levels.clamp(1, MAX_LEVELS);
    let by_id: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let exported: Vec<usize> = export_order(nodes)
        .into_iter()
        .filter(|i| !nodes[*i].is_synthesized())
        .collect();
    let exported_set: HashSet<usize> = exported.iter().copied().collect();
    // A stored leaf that later gained children is written as a non-leaf
    let has_children: HashSet<usize> = nodes
        .iter()
        .enumerate()
        .filter_map(|(i, n)| {
            let parent = *by_id.get(n.parent_id.as_deref()?)?;
            (parent != i).then_some(parent)
        })
        .collect();

    let custom_flags: Vec<String> = exported
        .iter()
        .flat_map(|i| nodes[*i].custom_flags.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let layout = CsvLayout::new(hierarchy_header(max_levels, &custom_flags));

    let main_keys = assign_main_keys(nodes, &exported);
    let mut next_synthetic = main_keys
        .values()
        .max()
        .map_or(options.synthetic_xref_start, |max| (max + 1).max(options.synthetic_xref_start));
    let used_keys: HashSet<i64> = main_keys.values().copied().collect();

    // Total-formula labels written on child rows without a formula of their own
    let mut child_labels: HashMap<String, String> = HashMap::new();
    for &i in &exported {
        let node = &nodes[i];
        if node.formula_config.is_some() {
            continue;
        }
        if let Some(total) = node.total_formula() {
            for child in &total.children {
                let key = child
                    .hierarchy_id
                    .clone()
                    .unwrap_or_else(|| child.hierarchy_name.clone());
                child_labels
                    .entry(key)
                    .or_insert_with(|| total.group_name.clone());
            }
        }
    }

    let mut records: Vec<Vec<String>> = Vec::new();
    let mut extra_rows = 0usize;
    for &i in &exported {
        let node = &nodes[i];
        let mut record = layout.blank();

        layout.set(&mut record, col::HIERARCHY_ID, node.hierarchy_id.as_str());
        layout.set(&mut record, col::HIERARCHY_NAME, node.name.as_str());
        layout.set(&mut record, col::DESCRIPTION, node.description.clone().unwrap_or_default());
        layout.set(&mut record, col::IS_ROOT, DataCleaner::format_bool(node.is_root));
        layout.set(&mut record, col::SORT_ORDER, node.sort_order.to_string());
        if let Some(key) = main_keys.get(&i) {
            layout.set(&mut record, col::XREF_KEY, key.to_string());
        }
        if let Some(&parent) = node.parent_id.as_deref().and_then(|p| by_id.get(p)) {
            layout.set(&mut record, col::PARENT_ID, nodes[parent].hierarchy_id.as_str());
            if exported_set.contains(&parent) {
                if let Some(key) = main_keys.get(&parent) {
                    layout.set(&mut record, col::PARENT_XREF_KEY, key.to_string());
                }
            }
        }

        let chain = ancestor_chain(nodes, &by_id, i);
        for (pos, &ancestor) in chain.iter().take(max_levels).enumerate() {
            layout.set(&mut record, &col::level(pos + 1), nodes[ancestor].name.as_str());
            let own = pos + 1 == chain.len();
            let sort = node
                .level_sort_orders
                .get(pos)
                .copied()
                .flatten()
                .or(if own { Some(node.sort_order) } else { None });
            if let Some(sort) = sort {
                layout.set(&mut record, &col::level_order(pos + 1), sort.to_string());
            }
        }

        let flags = &node.flags;
        layout.set(&mut record, col::INCLUDE_FLAG, DataCleaner::format_bool(flags.include));
        layout.set(&mut record, col::EXCLUDE_FLAG, DataCleaner::format_bool(flags.exclude));
        layout.set(&mut record, col::TRANSFORM_FLAG, DataCleaner::format_bool(flags.transform));
        layout.set(&mut record, col::CALCULATION_FLAG, DataCleaner::format_bool(flags.calculation));
        layout.set(&mut record, col::ACTIVE_FLAG, DataCleaner::format_bool(flags.active));
        let is_leaf = flags.is_leaf && !has_children.contains(&i);
        layout.set(&mut record, col::IS_LEAF_NODE, DataCleaner::format_bool(is_leaf));

        if let Some(filter) = &node.filter_config {
            for (column, value) in &filter.filter_groups {
                layout.set(&mut record, column, value.as_str());
            }
        }
        for flag in &custom_flags {
            let value = node.custom_flags.get(flag).unwrap_or(false);
            layout.set(&mut record, flag, DataCleaner::format_bool(value));
        }

        // Non-formula columns are shared by the main row and its extra rows
        let shared = record.clone();
        let mut extras: Vec<Vec<String>> = Vec::new();

        match (&node.formula_config, node.total_formula()) {
            (Some(config), _) => {
                layout.set(&mut record, col::FORMULA_GROUP_NAME, config.group_name.as_str());
                if let Some(expression) = &config.expression {
                    layout.set(&mut record, col::FORMULA_EXPRESSION, expression.as_str());
                }
                let mut by_operation = rules_by_operation(&config.rules).into_iter();
                if let Some((operation, rules)) = by_operation.next() {
                    write_rules(&layout, &mut record, operation, &rules);
                }
                for (operation, rules) in by_operation {
                    while used_keys.contains(&next_synthetic) {
                        next_synthetic += 1;
                    }
                    let mut extra = shared.clone();
                    layout.set(&mut extra, col::XREF_KEY, next_synthetic.to_string());
                    layout.set(&mut extra, col::FORMULA_GROUP_NAME, config.group_name.as_str());
                    write_rules(&layout, &mut extra, operation, &rules);
                    next_synthetic += 1;
                    extras.push(extra);
                }
            }
            (None, Some(total)) => {
                layout.set(&mut record, col::FORMULA_GROUP_NAME, total.group_name.as_str());
                layout.set(&mut record, col::AGGREGATION, total.aggregation.as_str());
            }
            (None, None) => {
                let label = child_labels
                    .get(&node.hierarchy_id)
                    .or_else(|| child_labels.get(&node.name));
                if let Some(label) = label {
                    layout.set(&mut record, col::FORMULA_GROUP_NAME, label.as_str());
                }
            }
        }

        extra_rows += extras.len();
        records.push(record);
        records.extend(extras);
    }

    info!(
        nodes = exported.len(),
        extra_rows,
        custom_flags = custom_flags.len(),
        "hierarchy rendered"
    );
    layout.write(&records)
}

// ==========================================
// HierarchyExporter
// ==========================================
pub struct HierarchyExporter<R>
where
    R: HierarchyRepository,
{
    repo: R,
}

impl<R> HierarchyExporter<R>
where
    R: HierarchyRepository,
{
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub fn export(&self, project_id: &str, options: &ExportOptions) -> ExportResult<String> {
        if !self.repo.project_exists(project_id)? {
            return Err(ExportError::ProjectNotFound(project_id.to_string()));
        }
        let nodes = self.repo.find_all_by_project(project_id)?;
        render(&nodes, options)
    }
}
