// ==========================================
// Hierarchy Recon - Formula reference resolver
// ==========================================
// Rewrites name references in formula rules and total-formula children
// to hierarchy ids. Used inside an import (over the arena) and as a
// standalone read-modify-write pass over a persisted project.
// ==========================================

use crate::domain::hierarchy::HierarchyNode;
use crate::domain::import::ResolveReport;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::HierarchyRepository;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, instrument, warn};

/// Outcome of looking up one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    AlreadyId,
    Resolved(String),
    Ambiguous(Vec<String>),
    Unresolved,
}

// ==========================================
// ReferenceIndex
// ==========================================
// Lookup order: existing hierarchy id → exact name → case-insensitive name.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    ids: HashSet<String>,
    by_name: HashMap<String, BTreeSet<String>>,
    by_folded_name: HashMap<String, BTreeSet<String>>,
}

impl ReferenceIndex {
    pub fn new<'a>(nodes: impl IntoIterator<Item = &'a HierarchyNode>) -> Self {
        let mut index = Self::default();
        for node in nodes {
            index.add(&node.hierarchy_id, &node.name);
        }
        index
    }

    pub fn add(&mut self, hierarchy_id: &str, name: &str) {
        self.ids.insert(hierarchy_id.to_string());
        let name = name.trim();
        self.by_name
            .entry(name.to_string())
            .or_default()
            .insert(hierarchy_id.to_string());
        self.by_folded_name
            .entry(name.to_lowercase())
            .or_default()
            .insert(hierarchy_id.to_string());
    }

    pub fn resolve(&self, reference: &str) -> Resolution {
        let reference = reference.trim();
        if self.ids.contains(reference) {
            return Resolution::AlreadyId;
        }
        let candidates = self
            .by_name
            .get(reference)
            .or_else(|| self.by_folded_name.get(&reference.to_lowercase()));
        match candidates {
            Some(ids) if ids.len() == 1 => ids
                .iter()
                .next()
                .map(|id| Resolution::Resolved(id.clone()))
                .unwrap_or(Resolution::Unresolved),
            Some(ids) if ids.len() > 1 => Resolution::Ambiguous(ids.iter().cloned().collect()),
            _ => Resolution::Unresolved,
        }
    }
}

/// Resolve every reference of one node in place.
///
/// # Returns
/// - number of references rewritten; warnings are appended for ambiguous
///   and unresolved references
pub fn resolve_node_references(
    node: &mut HierarchyNode,
    index: &ReferenceIndex,
    warnings: &mut Vec<String>,
) -> usize {
    let mut resolved = 0;
    let owner = node.hierarchy_id.clone();

    if let Some(config) = node.formula_config.as_mut() {
        for rule in config.rules.iter_mut() {
            // constant-only rule
            if rule.hierarchy_name_or_id.trim().is_empty() {
                continue;
            }
            match index.resolve(&rule.hierarchy_name_or_id) {
                Resolution::AlreadyId => {}
                Resolution::Resolved(id) => {
                    rule.hierarchy_name_or_id = id;
                    resolved += 1;
                }
                Resolution::Ambiguous(ids) => warnings.push(format!(
                    "{}: formula operand '{}' matches several hierarchies ({})",
                    owner,
                    rule.hierarchy_name_or_id,
                    ids.join(", ")
                )),
                Resolution::Unresolved => warnings.push(format!(
                    "{}: formula operand '{}' not found",
                    owner, rule.hierarchy_name_or_id
                )),
            }
        }
    }

    if let Some(total) = node
        .filter_config
        .as_mut()
        .and_then(|f| f.total_formula.as_mut())
    {
        for child in total.children.iter_mut() {
            if child
                .hierarchy_id
                .as_deref()
                .is_some_and(|id| index.ids.contains(id))
            {
                continue;
            }
            match index.resolve(&child.hierarchy_name) {
                Resolution::AlreadyId => {
                    child.hierarchy_id = Some(child.hierarchy_name.trim().to_string());
                    resolved += 1;
                }
                Resolution::Resolved(id) => {
                    child.hierarchy_id = Some(id);
                    resolved += 1;
                }
                Resolution::Ambiguous(ids) => warnings.push(format!(
                    "{}: total formula child '{}' matches several hierarchies ({})",
                    owner,
                    child.hierarchy_name,
                    ids.join(", ")
                )),
                Resolution::Unresolved => warnings.push(format!(
                    "{}: total formula child '{}' not found",
                    owner, child.hierarchy_name
                )),
            }
        }
    }

    resolved
}

// ==========================================
// FormulaReferenceResolver
// ==========================================
pub struct FormulaReferenceResolver<R>
where
    R: HierarchyRepository,
{
    repo: R,
}

impl<R> FormulaReferenceResolver<R>
where
    R: HierarchyRepository,
{
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Resolve references of every node in the project and write back changed nodes.
    #[instrument(skip(self))]
    pub fn resolve_project(&self, project_id: &str) -> ImportResult<ResolveReport> {
        if !self.repo.project_exists(project_id)? {
            return Err(ImportError::ProjectNotFound(project_id.to_string()));
        }

        let mut nodes = self.repo.find_all_by_project(project_id)?;
        let index = ReferenceIndex::new(nodes.iter());
        let mut report = ResolveReport::default();

        for node in nodes.iter_mut() {
            let resolved = resolve_node_references(node, &index, &mut report.warnings);
            if resolved == 0 {
                continue;
            }
            match self.repo.update(node) {
                Ok(()) => {
                    report.nodes_updated += 1;
                    report.references_resolved += resolved;
                }
                Err(e) => {
                    warn!(hierarchy_id = %node.hierarchy_id, error = %e, "failed to update node");
                    report
                        .warnings
                        .push(format!("{}: update failed: {}", node.hierarchy_id, e));
                }
            }
        }

        info!(
            project_id,
            nodes_updated = report.nodes_updated,
            references_resolved = report.references_resolved,
            warnings = report.warnings.len(),
            "formula references resolved"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{
        FilterConfig, FormulaConfig, FormulaRule, Project, TotalFormula, TotalFormulaChild,
    };
    use crate::domain::types::FormulaOperation;
    use crate::repository::HierarchyRepositoryImpl;
    use chrono::Utc;

    fn rule(reference: &str) -> FormulaRule {
        FormulaRule {
            operation: FormulaOperation::Sum,
            hierarchy_name_or_id: reference.to_string(),
            precedence: 1,
            constant: None,
        }
    }

    fn with_rules(hid: &str, name: &str, refs: &[&str]) -> HierarchyNode {
        let mut node = HierarchyNode::new("P1", hid, name);
        node.formula_config = Some(FormulaConfig {
            group_name: name.to_string(),
            main_hierarchy_id: hid.to_string(),
            rules: refs.iter().map(|r| rule(r)).collect(),
            expression: None,
        });
        node
    }

    #[test]
    fn test_index_lookup_order() {
        let nodes = vec![
            HierarchyNode::new("P1", "REV", "Revenue"),
            HierarchyNode::new("P1", "SALES_EU", "Sales"),
            HierarchyNode::new("P1", "SALES_US", "Sales"),
        ];
        let index = ReferenceIndex::new(nodes.iter());
        assert_eq!(index.resolve("REV"), Resolution::AlreadyId);
        assert_eq!(index.resolve("Revenue"), Resolution::Resolved("REV".to_string()));
        assert_eq!(index.resolve("revenue "), Resolution::Resolved("REV".to_string()));
        assert!(matches!(index.resolve("Sales"), Resolution::Ambiguous(ids) if ids.len() == 2));
        assert_eq!(index.resolve("Missing"), Resolution::Unresolved);
    }

    #[test]
    fn test_resolve_node_references() {
        let mut node = with_rules("NET", "Net", &["Revenue", "COGS", "", "Nope"]);
        node.filter_config = Some(FilterConfig {
            filter_groups: Default::default(),
            total_formula: Some(TotalFormula {
                group_name: "T".to_string(),
                main_hierarchy_name: "Net".to_string(),
                aggregation: FormulaOperation::Sum,
                children: vec![TotalFormulaChild {
                    hierarchy_id: None,
                    hierarchy_name: "Revenue".to_string(),
                }],
            }),
        });
        let others = vec![
            HierarchyNode::new("P1", "REV", "Revenue"),
            HierarchyNode::new("P1", "COGS", "Cost of goods"),
        ];
        let index = ReferenceIndex::new(others.iter());
        let mut warnings = Vec::new();

        let resolved = resolve_node_references(&mut node, &index, &mut warnings);
        assert_eq!(resolved, 2);
        let rules = &node.formula_config.as_ref().unwrap().rules;
        assert_eq!(rules[0].hierarchy_name_or_id, "REV");
        assert_eq!(rules[1].hierarchy_name_or_id, "COGS");
        assert_eq!(rules[3].hierarchy_name_or_id, "Nope");
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            node.total_formula().unwrap().children[0].hierarchy_id.as_deref(),
            Some("REV")
        );
    }

    #[test]
    fn test_resolve_project_updates_changed_nodes() {
        let repo = HierarchyRepositoryImpl::in_memory().unwrap();
        repo.create_project(&Project {
            project_id: "P1".to_string(),
            name: "Plan".to_string(),
            created_at: Utc::now(),
        })
        .unwrap();
        repo.create(&with_rules("NET", "Net", &["Revenue"])).unwrap();
        repo.create(&HierarchyNode::new("P1", "REV", "Revenue")).unwrap();

        let resolver = FormulaReferenceResolver::new(repo);
        let report = resolver.resolve_project("P1").unwrap();
        assert_eq!(report.nodes_updated, 1);
        assert_eq!(report.references_resolved, 1);

        let again = resolver.resolve_project("P1").unwrap();
        assert_eq!(again.nodes_updated, 0);
    }

    #[test]
    fn test_resolve_project_missing_project() {
        let resolver = FormulaReferenceResolver::new(HierarchyRepositoryImpl::in_memory().unwrap());
        assert!(matches!(
            resolver.resolve_project("NOPE"),
            Err(ImportError::ProjectNotFound(_))
        ));
    }
}
