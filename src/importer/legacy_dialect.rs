// ==========================================
// Hierarchy Recon - Legacy dialect
// ==========================================
// Rows are keyed by their collapsed level path (LEVEL_1 is the project label).
// Ancestors that never appear as rows are synthesized as placeholders.
// Parent: PARENT_XREF_KEY → exact parent path → (depth, name)
// ==========================================

use crate::domain::hierarchy::SYNTHESIZED_ID_PREFIX;
use crate::domain::import::{ImportSummary, RawHierarchyRow};
use crate::domain::types::LevelWindow;
use crate::importer::arena::{NodeArena, NodeIdx};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::dialect::{leadership_order, DialectStrategy, Placeholder, RowGroup};
use crate::importer::level_path::LevelPathResolver;
use std::collections::{HashMap, HashSet};

pub struct LegacyDialect {
    resolver: LevelPathResolver,
}

impl LegacyDialect {
    pub fn new(window: LevelWindow) -> Self {
        Self {
            resolver: LevelPathResolver::new(window),
        }
    }

    fn row_path(&self, row: &RawHierarchyRow) -> Vec<String> {
        let path = self.resolver.resolve(&row.levels);
        if path.is_empty() {
            row.name.iter().cloned().collect()
        } else {
            path
        }
    }
}

impl DialectStrategy for LegacyDialect {
    fn group_rows(&self, rows: Vec<RawHierarchyRow>, summary: &mut ImportSummary) -> Vec<RowGroup> {
        let mut buckets: Vec<(Vec<String>, Vec<RawHierarchyRow>)> = Vec::new();
        let mut by_path: HashMap<Vec<String>, usize> = HashMap::new();

        for row in rows {
            let path = self.row_path(&row);
            if path.is_empty() {
                summary.error(format!("row {}: no LEVEL value or HIERARCHY_NAME", row.row_number));
                continue;
            }
            let bucket = *by_path.entry(path.clone()).or_insert_with(|| {
                buckets.push((path, Vec::new()));
                buckets.len() - 1
            });
            buckets[bucket].1.push(row);
        }

        buckets
            .into_iter()
            .map(|(path, mut rows)| {
                rows.sort_by(leadership_order);
                let leader = &rows[0];
                let name = path
                    .last()
                    .cloned()
                    .or_else(|| leader.name.clone())
                    .unwrap_or_default();
                let hierarchy_id = rows
                    .iter()
                    .find_map(|r| r.hierarchy_id.clone())
                    .unwrap_or_else(|| DataCleaner.slugify_path(&path));
                let path_sorts = if self.resolver.resolve(&leader.levels).is_empty() {
                    vec![leader.sort_order]
                } else {
                    self.resolver.resolve_sorts(&leader.levels, &leader.level_sorts)
                };
                RowGroup {
                    hierarchy_id,
                    name,
                    path,
                    path_sorts,
                    rows,
                }
            })
            .collect()
    }

    fn missing_ancestors(&self, groups: &[RowGroup]) -> Vec<Placeholder> {
        let present: HashSet<&[String]> = groups.iter().map(|g| g.path.as_slice()).collect();
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut missing = Vec::new();

        for group in groups {
            for ancestor in LevelPathResolver::ancestor_paths(&group.path) {
                if present.contains(ancestor.as_slice()) || seen.contains(&ancestor) {
                    continue;
                }
                seen.insert(ancestor.clone());
                let depth = ancestor.len();
                let mut sorts: Vec<Option<i64>> =
                    group.path_sorts.iter().take(depth).copied().collect();
                sorts.resize(depth, None);
                missing.push(Placeholder {
                    hierarchy_id: format!(
                        "{}{}",
                        SYNTHESIZED_ID_PREFIX,
                        DataCleaner.slugify_path(&ancestor)
                    ),
                    name: ancestor.last().cloned().unwrap_or_default(),
                    path: ancestor,
                    sorts,
                });
            }
        }

        // stable: shallowest first, discovery order within a depth
        missing.sort_by_key(|p| p.path.len());
        missing
    }

    fn resolve_parent(
        &self,
        arena: &NodeArena,
        idx: NodeIdx,
        group: Option<&RowGroup>,
        summary: &mut ImportSummary,
    ) -> Option<NodeIdx> {
        let entry = arena.get(idx);
        let not_self = |candidate: Option<NodeIdx>| candidate.filter(|p| *p != idx);

        if let Some(row) = group.map(RowGroup::leader) {
            if let Some(parent_xref) = row.parent_xref_key {
                match not_self(arena.find_by_xref(parent_xref)) {
                    Some(parent) => return Some(parent),
                    None => summary.warning(format!(
                        "row {}: PARENT_XREF_KEY {} of '{}' not found",
                        row.row_number, parent_xref, entry.node.name
                    )),
                }
            }
        }

        let parent_path = LevelPathResolver::parent_path(&entry.path)?;
        let parent_name = parent_path.last()?;
        let found = not_self(arena.find_by_path(parent_path))
            .or_else(|| not_self(arena.find_by_depth_name(parent_path.len(), parent_name)));
        if found.is_none() {
            summary.warning(format!(
                "parent '{}' of '{}' not found",
                parent_path.join(" > "),
                entry.node.name
            ));
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(n: usize, xref: i64, levels: &[&str]) -> RawHierarchyRow {
        RawHierarchyRow {
            row_number: n,
            xref_key: Some(xref),
            levels: levels.iter().map(|s| s.to_string()).collect(),
            level_sorts: (1..=levels.len() as i64).map(Some).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_group_by_path_lowest_xref_leads() {
        let dialect = LegacyDialect::new(LevelWindow::LEGACY);
        let rows = vec![
            row(1, 20, &["FY", "Income", "Sales"]),
            row(2, 10, &["FY", "Income", "Sales"]),
            row(3, 30, &["FY", "Income"]),
        ];
        let mut summary = ImportSummary::default();
        let groups = dialect.group_rows(rows, &mut summary);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].hierarchy_id, "INCOME__SALES");
        assert_eq!(groups[0].name, "Sales");
        assert_eq!(groups[0].leader().row_number, 2);
        assert_eq!(groups[0].path_sorts, vec![Some(2), Some(3)]);
        assert_eq!(groups[1].hierarchy_id, "INCOME");
    }

    #[test]
    fn test_missing_ancestors_shallowest_first() {
        let dialect = LegacyDialect::new(LevelWindow::LEGACY);
        let rows = vec![
            row(1, 1, &["FY", "Income", "Sales", "Net Sales Vol"]),
            row(2, 2, &["FY", "Income"]),
            row(3, 3, &["FY", "Costs", "Labour", "Overtime"]),
        ];
        let mut summary = ImportSummary::default();
        let groups = dialect.group_rows(rows, &mut summary);
        let missing = dialect.missing_ancestors(&groups);

        let ids: Vec<&str> = missing.iter().map(|p| p.hierarchy_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["SYNTH_COSTS", "SYNTH_INCOME__SALES", "SYNTH_COSTS__LABOUR"]
        );
        assert_eq!(missing[1].name, "Sales");
        assert_eq!(missing[1].sorts, vec![Some(2), Some(3)]);
    }
}
