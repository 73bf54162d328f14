// ==========================================
// Hierarchy Recon - Anomaly checks
// ==========================================
// One function per anomaly type. Each appends to `out`; none mutate nodes.
// ==========================================

use crate::domain::anomaly::{Anomaly, FixAction, NodeRef};
use crate::domain::hierarchy::{HierarchyNode, SourceMapping};
use crate::domain::types::{AnomalyType, Severity};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

/// Names that read like a measure rather than an attribute.
static VALUE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(amount|total|balance|price|cost|revenue|sales|income|expense|value|margin|profit|tax|fee|quantity|qty)",
    )
    .expect("value name pattern")
});

static DIVIDE_BY_ZERO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\s*0+(?:\.0*)?\s*(?:$|[^\d.])").expect("division pattern"));

static EMPTY_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\s*\}").expect("placeholder pattern"));

const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\'];

const NUMERIC_TYPES: &[&str] = &[
    "NUMBER", "NUMERIC", "DECIMAL", "DEC", "INT", "INTEGER", "BIGINT", "SMALLINT", "TINYINT",
    "FLOAT", "DOUBLE", "DOUBLE PRECISION", "REAL", "MONEY", "SMALLMONEY", "CURRENCY", "FIXED",
];

// ==========================================
// Shared helpers
// ==========================================

pub(super) fn node_ref(node: &HierarchyNode) -> NodeRef {
    NodeRef {
        id: node.id.clone(),
        hierarchy_id: node.hierarchy_id.clone(),
        name: node.name.clone(),
    }
}

fn anomaly(
    anomaly_type: AnomalyType,
    severity: Severity,
    node: Option<&HierarchyNode>,
    message: String,
    details: Value,
) -> Anomaly {
    Anomaly {
        anomaly_type,
        severity,
        node_ref: node.map(node_ref),
        message,
        details,
        auto_fixable: false,
        fix_action: None,
    }
}

fn with_fix(mut anomaly: Anomaly, action: &str, params: Value) -> Anomaly {
    anomaly.auto_fixable = true;
    anomaly.fix_action = Some(FixAction {
        action: action.to_string(),
        params,
    });
    anomaly
}

/// `NUMBER(18,2)` → numeric, `VARCHAR(50)` → not.
pub(super) fn is_numeric_type(column_type: &str) -> bool {
    let base = column_type
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_uppercase();
    NUMERIC_TYPES.contains(&base.as_str())
        || ["INT", "NUMBER", "DECIMAL", "FLOAT", "UINT"]
            .iter()
            .any(|prefix| base.starts_with(prefix) && base[prefix.len()..].chars().all(|c| c.is_ascii_digit()))
}

pub(super) fn is_value_like(name: &str) -> bool {
    VALUE_NAME_RE.is_match(name)
}

// ==========================================
// Forest view
// ==========================================
// Parent/child indexes over the node slice, built once per detection call.
pub(super) struct Forest<'a> {
    pub nodes: &'a [HierarchyNode],
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
}

impl<'a> Forest<'a> {
    pub fn new(nodes: &'a [HierarchyNode]) -> Self {
        let by_id: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let parent: Vec<Option<usize>> = nodes
            .iter()
            .map(|n| n.parent_id.as_deref().and_then(|p| by_id.get(p).copied()))
            .collect();
        let mut children = vec![Vec::new(); nodes.len()];
        for (i, p) in parent.iter().enumerate() {
            if let Some(p) = p {
                children[*p].push(i);
            }
        }
        Self {
            nodes,
            parent,
            children,
        }
    }

    pub fn is_leaf(&self, i: usize) -> bool {
        self.children[i].is_empty()
    }

    pub fn children(&self, i: usize) -> &[usize] {
        &self.children[i]
    }
}

// ==========================================
// missing_mapping
// ==========================================
pub(super) fn missing_mappings(forest: &Forest, out: &mut Vec<Anomaly>) {
    for (i, node) in forest.nodes.iter().enumerate() {
        if !forest.is_leaf(i) || node.is_synthesized() {
            continue;
        }
        if node.source_mappings.is_empty() && !node.has_formula() {
            out.push(anomaly(
                AnomalyType::MissingMapping,
                Severity::Warning,
                Some(node),
                format!("leaf '{}' has no source mapping and no formula", node.name),
                json!({ "hierarchyId": node.hierarchy_id }),
            ));
        }
    }
}

// ==========================================
// type_mismatch
// ==========================================
pub(super) fn type_mismatch(node: &HierarchyNode, mapping: &SourceMapping) -> Option<Anomaly> {
    let column_type = mapping.column_type.as_deref()?.trim();
    if column_type.is_empty() || is_numeric_type(column_type) || !is_value_like(&node.name) {
        return None;
    }
    Some(anomaly(
        AnomalyType::TypeMismatch,
        Severity::Warning,
        Some(node),
        format!(
            "'{}' looks like a value but maps to {} column {}.{}",
            node.name, column_type, mapping.table, mapping.column
        ),
        json!({
            "mappingIndex": mapping.mapping_index,
            "table": mapping.table,
            "column": mapping.column,
            "columnType": column_type,
        }),
    ))
}

pub(super) fn type_mismatches(forest: &Forest, out: &mut Vec<Anomaly>) {
    for node in forest.nodes {
        out.extend(node.source_mappings.iter().filter_map(|m| type_mismatch(node, m)));
    }
}

// ==========================================
// pattern_inconsistency
// ==========================================
pub(super) fn pattern_consistency(forest: &Forest, threshold: f64, out: &mut Vec<Anomaly>) {
    for (parent, kids) in forest.children.iter().enumerate() {
        // sibling → distinct tables it maps to
        let mapped: Vec<(usize, BTreeSet<String>)> = kids
            .iter()
            .map(|&k| {
                let tables = forest.nodes[k]
                    .source_mappings
                    .iter()
                    .map(|m| m.table.trim().to_uppercase())
                    .filter(|t| !t.is_empty())
                    .collect::<BTreeSet<_>>();
                (k, tables)
            })
            .filter(|(_, tables)| !tables.is_empty())
            .collect();
        if mapped.len() < 2 {
            continue;
        }

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for (_, tables) in &mapped {
            for table in tables {
                *counts.entry(table.as_str()).or_default() += 1;
            }
        }
        // highest count, alphabetical on ties
        let Some((dominant, count)) = counts
            .iter()
            .fold(None::<(&str, usize)>, |best, (t, c)| match best {
                Some((_, bc)) if bc >= *c => best,
                _ => Some((*t, *c)),
            })
        else {
            continue;
        };
        let share = count as f64 / mapped.len() as f64;
        if share < threshold || count == mapped.len() {
            continue;
        }

        for (k, tables) in &mapped {
            if tables.contains(dominant) {
                continue;
            }
            let node = &forest.nodes[*k];
            out.push(anomaly(
                AnomalyType::PatternInconsistency,
                Severity::Info,
                Some(node),
                format!(
                    "'{}' maps to {} while {:.0}% of its siblings use {}",
                    node.name,
                    tables.iter().cloned().collect::<Vec<_>>().join(", "),
                    share * 100.0,
                    dominant
                ),
                json!({
                    "parentHierarchyId": forest.nodes[parent].hierarchy_id,
                    "dominantTable": dominant,
                    "share": share,
                    "tables": tables,
                }),
            ));
        }
    }
}

// ==========================================
// circular_reference
// ==========================================
#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    OnStack,
    Done,
}

/// Walks parent links; a node met again while on the current path closes a cycle.
/// `state` is shared by every walk, so each node is entered once.
pub(super) fn cycles(forest: &Forest, out: &mut Vec<Anomaly>) {
    let mut state = vec![Visit::Unvisited; forest.nodes.len()];
    for start in 0..forest.nodes.len() {
        if state[start] != Visit::Unvisited {
            continue;
        }
        let mut path: Vec<usize> = Vec::new();
        let mut current = Some(start);
        while let Some(i) = current {
            match state[i] {
                Visit::Unvisited => {
                    state[i] = Visit::OnStack;
                    path.push(i);
                    current = forest.parent[i];
                }
                Visit::OnStack => {
                    let from = path.iter().position(|p| *p == i).unwrap_or(0);
                    out.push(cycle_anomaly(forest, &path[from..]));
                    break;
                }
                Visit::Done => break,
            }
        }
        for i in path {
            state[i] = Visit::Done;
        }
    }
}

fn cycle_anomaly(forest: &Forest, members: &[usize]) -> Anomaly {
    let ids: Vec<&str> = members
        .iter()
        .map(|i| forest.nodes[*i].hierarchy_id.as_str())
        .collect();
    let mut chain = ids.join(" -> ");
    if let Some(first) = ids.first() {
        chain.push_str(" -> ");
        chain.push_str(first);
    }
    anomaly(
        AnomalyType::CircularReference,
        Severity::Error,
        members.first().map(|i| &forest.nodes[*i]),
        format!("circular parent reference: {}", chain),
        json!({ "cycle": ids }),
    )
}

// ==========================================
// duplicate_mapping
// ==========================================
fn duplicate_anomaly(node: &HierarchyNode, key: &(String, String, String), names: Vec<&str>) -> Anomaly {
    anomaly(
        AnomalyType::DuplicateMapping,
        Severity::Warning,
        Some(node),
        format!(
            "{}.{}.{} is mapped from {} nodes: {}",
            key.0,
            key.1,
            key.2,
            names.len(),
            names.join(", ")
        ),
        json!({
            "database": key.0,
            "table": key.1,
            "column": key.2,
            "nodes": names,
        }),
    )
}

fn is_blank_target(mapping: &SourceMapping) -> bool {
    mapping.table.trim().is_empty() && mapping.column.trim().is_empty()
}

pub(super) fn duplicate_mappings(forest: &Forest, out: &mut Vec<Anomaly>) {
    let mut by_target: BTreeMap<(String, String, String), Vec<usize>> = BTreeMap::new();
    for (i, node) in forest.nodes.iter().enumerate() {
        for mapping in node.source_mappings.iter().filter(|m| !is_blank_target(m)) {
            let owners = by_target.entry(mapping.target_key()).or_default();
            if !owners.contains(&i) {
                owners.push(i);
            }
        }
    }
    for (key, owners) in &by_target {
        if owners.len() < 2 {
            continue;
        }
        let names = owners.iter().map(|i| forest.nodes[*i].name.as_str()).collect();
        out.push(duplicate_anomaly(&forest.nodes[owners[0]], key, names));
    }
}

/// Duplicate check for one proposed mapping against every other node.
pub(super) fn duplicate_for_candidate(
    node: &HierarchyNode,
    candidate: &SourceMapping,
    all_nodes: &[HierarchyNode],
) -> Option<Anomaly> {
    if is_blank_target(candidate) {
        return None;
    }
    let key = candidate.target_key();
    let others: Vec<&str> = all_nodes
        .iter()
        .filter(|n| n.hierarchy_id != node.hierarchy_id)
        .filter(|n| n.source_mappings.iter().any(|m| m.target_key() == key))
        .map(|n| n.name.as_str())
        .collect();
    if others.is_empty() {
        return None;
    }
    let mut names = vec![node.name.as_str()];
    names.extend(others);
    Some(duplicate_anomaly(node, &key, names))
}

// ==========================================
// formula_issue
// ==========================================
pub(super) fn expression_problems(expression: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    let mut depth = 0i64;
    let mut balanced = true;
    for ch in expression.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    balanced = false;
                }
            }
            _ => {}
        }
    }
    if !balanced || depth != 0 {
        problems.push("unbalanced parentheses");
    }
    if DIVIDE_BY_ZERO_RE.is_match(expression) {
        problems.push("division by zero");
    }
    if EMPTY_PLACEHOLDER_RE.is_match(expression) {
        problems.push("empty {} placeholder");
    }
    problems
}

pub(super) fn formulas(forest: &Forest, out: &mut Vec<Anomaly>) {
    for (i, node) in forest.nodes.iter().enumerate() {
        if let Some(expression) = node.formula_config.as_ref().and_then(|f| f.expression.as_deref()) {
            for problem in expression_problems(expression) {
                out.push(anomaly(
                    AnomalyType::FormulaIssue,
                    Severity::Error,
                    Some(node),
                    format!("formula of '{}': {}", node.name, problem),
                    json!({ "expression": expression, "problem": problem }),
                ));
            }
        }

        if forest.is_leaf(i) || node.has_formula() {
            continue;
        }
        let contributing: Vec<&HierarchyNode> = forest
            .children(i)
            .iter()
            .map(|c| &forest.nodes[*c])
            .filter(|c| !c.source_mappings.is_empty() || c.has_formula() || c.flags.calculation)
            .collect();
        if contributing.is_empty() {
            continue;
        }
        let operands: Vec<&str> = contributing.iter().map(|c| c.hierarchy_id.as_str()).collect();
        let finding = anomaly(
            AnomalyType::FormulaIssue,
            Severity::Info,
            Some(node),
            format!(
                "'{}' has {} mapped or calculated children but no formula",
                node.name,
                operands.len()
            ),
            json!({ "children": operands }),
        );
        out.push(with_fix(
            finding,
            "create_sum_formula",
            json!({ "operation": "SUM", "operands": operands }),
        ));
    }
}

// ==========================================
// naming_convention
// ==========================================
pub(super) fn naming(forest: &Forest, pattern: Option<&Regex>, out: &mut Vec<Anomaly>) {
    for node in forest.nodes {
        let trimmed = node.name.trim();
        if trimmed != node.name {
            let finding = anomaly(
                AnomalyType::NamingConvention,
                Severity::Info,
                Some(node),
                format!("name '{}' has leading or trailing whitespace", node.name),
                json!({ "name": node.name }),
            );
            out.push(with_fix(finding, "trim_name", json!({ "name": trimmed })));
        }

        let forbidden: BTreeSet<char> = node
            .name
            .chars()
            .filter(|c| FORBIDDEN_NAME_CHARS.contains(c))
            .collect();
        if !forbidden.is_empty() {
            let chars: String = forbidden.into_iter().collect();
            out.push(anomaly(
                AnomalyType::NamingConvention,
                Severity::Warning,
                Some(node),
                format!("name '{}' contains disallowed characters {}", node.name, chars),
                json!({ "characters": chars }),
            ));
        }

        if let Some(re) = pattern {
            if !re.is_match(&node.name) {
                out.push(anomaly(
                    AnomalyType::NamingConvention,
                    Severity::Info,
                    Some(node),
                    format!("name '{}' does not match {}", node.name, re.as_str()),
                    json!({ "pattern": re.as_str() }),
                ));
            }
        }
    }
}
