// ==========================================
// Hierarchy Recon - Standard dialect
// ==========================================
// Grouping: by HIERARCHY_ID; id-less rows join the group of their name
// Parent:   PARENT_XREF_KEY → PARENT_ID → level path minus last element
// ==========================================

use crate::domain::import::{ImportSummary, RawHierarchyRow};
use crate::domain::types::LevelWindow;
use crate::importer::arena::{NodeArena, NodeIdx};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::dialect::{leadership_order, DialectStrategy, RowGroup};
use crate::importer::hierarchy_importer_trait::DataCleaner as _;
use crate::importer::level_path::LevelPathResolver;
use std::collections::HashMap;

pub struct StandardDialect {
    resolver: LevelPathResolver,
}

impl StandardDialect {
    pub fn new(window: LevelWindow) -> Self {
        Self {
            resolver: LevelPathResolver::new(window),
        }
    }

    // Name a row contributes to grouping: HIERARCHY_NAME, else its deepest level.
    fn row_name(&self, row: &RawHierarchyRow) -> Option<String> {
        row.name
            .clone()
            .or_else(|| self.resolver.resolve(&row.levels).pop())
    }
}

impl DialectStrategy for StandardDialect {
    fn group_rows(&self, rows: Vec<RawHierarchyRow>, summary: &mut ImportSummary) -> Vec<RowGroup> {
        let mut buckets: Vec<(Option<String>, Vec<RawHierarchyRow>)> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut id_less = Vec::new();

        // Rows with an id first, so id-less rule rows find their node regardless of file order
        for row in rows {
            let Some(hid) = row.hierarchy_id.clone() else {
                id_less.push(row);
                continue;
            };
            let bucket = *by_id.entry(hid.clone()).or_insert_with(|| {
                buckets.push((Some(hid), Vec::new()));
                buckets.len() - 1
            });
            if let Some(name) = self.row_name(&row) {
                by_name.entry(name).or_insert(bucket);
            }
            buckets[bucket].1.push(row);
        }

        for row in id_less {
            let Some(name) = self.row_name(&row) else {
                summary.error(format!(
                    "row {}: no HIERARCHY_ID, HIERARCHY_NAME or LEVEL value",
                    row.row_number
                ));
                continue;
            };
            let bucket = *by_name.entry(name).or_insert_with(|| {
                buckets.push((None, Vec::new()));
                buckets.len() - 1
            });
            buckets[bucket].1.push(row);
        }

        let mut groups = Vec::with_capacity(buckets.len());
        for (hierarchy_id, mut rows) in buckets {
            rows.sort_by(leadership_order);
            let leader = &rows[0];
            let name = rows
                .iter()
                .find_map(|r| r.name.clone())
                .or_else(|| self.row_name(leader))
                .or_else(|| hierarchy_id.clone());
            let Some(name) = name else {
                summary.error(format!("row {}: node has no name", leader.row_number));
                continue;
            };
            let hierarchy_id = hierarchy_id.unwrap_or_else(|| DataCleaner.slugify(&name));
            if hierarchy_id.is_empty() {
                summary.error(format!(
                    "row {}: cannot derive a HIERARCHY_ID from name '{}'",
                    leader.row_number, name
                ));
                continue;
            }
            let path = self.resolver.resolve(&leader.levels);
            let path_sorts = self.resolver.resolve_sorts(&leader.levels, &leader.level_sorts);
            groups.push(RowGroup {
                hierarchy_id,
                name,
                path,
                path_sorts,
                rows,
            });
        }

        groups.sort_by_key(|g| g.rows.iter().map(|r| r.row_number).min().unwrap_or(usize::MAX));
        groups
    }

    fn resolve_parent(
        &self,
        arena: &NodeArena,
        idx: NodeIdx,
        group: Option<&RowGroup>,
        summary: &mut ImportSummary,
    ) -> Option<NodeIdx> {
        let entry = arena.get(idx);
        let leader = group.map(RowGroup::leader);
        let not_self = |candidate: Option<NodeIdx>| candidate.filter(|p| *p != idx);

        if let Some(row) = leader {
            if let Some(parent_xref) = row.parent_xref_key {
                match not_self(arena.find_by_xref(parent_xref)) {
                    Some(parent) => return Some(parent),
                    None => summary.warning(format!(
                        "row {}: PARENT_XREF_KEY {} of '{}' not found",
                        row.row_number, parent_xref, entry.node.name
                    )),
                }
            }
            if let Some(parent_id) = &row.parent_hierarchy_id {
                match not_self(arena.find_by_hierarchy_id(parent_id)) {
                    Some(parent) => return Some(parent),
                    None => summary.warning(format!(
                        "row {}: PARENT_ID '{}' of '{}' not found",
                        row.row_number, parent_id, entry.node.name
                    )),
                }
            }
            if row.is_root == Some(true) {
                return None;
            }
        }

        LevelPathResolver::parent_path(&entry.path)
            .and_then(|parent_path| not_self(arena.find_by_path(parent_path)))
    }
}
