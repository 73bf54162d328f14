// ==========================================
// Hierarchy Recon - Mapping CSV importer
// ==========================================
// One row = one SourceMapping keyed by HIERARCHY_ID + MAPPING_INDEX.
// Same index + identical mapping → skipped; otherwise replaced or inserted.
// Missing MAPPING_INDEX appends after the node's highest index.
// ==========================================

use crate::domain::hierarchy::{HierarchyNode, SourceMapping};
use crate::domain::import::ImportSummary;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper as FieldMapperImpl;
use crate::importer::file_parser::ParsedTable;
use crate::importer::hierarchy_importer_trait::FieldMapper;
use crate::repository::HierarchyRepository;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument, warn};

/// What applying one mapping did to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingChange {
    Inserted,
    Replaced,
    Unchanged,
}

/// Apply a mapping at `index` (or after the highest index), keeping the list ordered.
pub fn apply_mapping(node: &mut HierarchyNode, index: Option<i64>, mut mapping: SourceMapping) -> MappingChange {
    let index = index.unwrap_or_else(|| {
        node.source_mappings
            .iter()
            .map(|m| m.mapping_index)
            .max()
            .map_or(1, |max| max + 1)
    });
    mapping.mapping_index = index;

    let position = node
        .source_mappings
        .iter()
        .position(|m| m.mapping_index == index);
    let change = match position {
        Some(pos) if node.source_mappings[pos] == mapping => MappingChange::Unchanged,
        Some(pos) => {
            node.source_mappings[pos] = mapping;
            MappingChange::Replaced
        }
        None => {
            node.source_mappings.push(mapping);
            MappingChange::Inserted
        }
    };
    node.source_mappings.sort_by_key(|m| m.mapping_index);
    change
}

pub struct MappingImporter<R>
where
    R: HierarchyRepository,
{
    repo: R,
    field_mapper: Box<dyn FieldMapper>,
}

impl<R> MappingImporter<R>
where
    R: HierarchyRepository,
{
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            field_mapper: Box::new(FieldMapperImpl),
        }
    }

    #[instrument(skip(self, table), fields(rows = table.rows.len()))]
    pub fn import_table(&self, project_id: &str, table: &ParsedTable) -> ImportResult<ImportSummary> {
        if !self.repo.project_exists(project_id)? {
            return Err(ImportError::ProjectNotFound(project_id.to_string()));
        }

        let mut summary = ImportSummary::default();
        for message in &table.parse_errors {
            summary.error(message.clone());
        }

        let mut nodes = self.repo.find_all_by_project(project_id)?;
        let by_hid: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.hierarchy_id.clone(), i))
            .collect();
        let mut dirty: BTreeSet<usize> = BTreeSet::new();

        for raw in &table.rows {
            let row = match self.field_mapper.map_mapping_row(table, raw) {
                Ok(row) => row,
                Err(e) => {
                    summary.error(e.to_string());
                    continue;
                }
            };
            let Some(hierarchy_id) = row.hierarchy_id.as_deref() else {
                summary.error(format!("row {}: HIERARCHY_ID is empty", row.row_number));
                continue;
            };
            let Some(&ni) = by_hid.get(hierarchy_id) else {
                summary.error(format!(
                    "row {}: hierarchy '{}' not found",
                    row.row_number, hierarchy_id
                ));
                continue;
            };

            match apply_mapping(&mut nodes[ni], row.mapping_index, row.mapping) {
                MappingChange::Unchanged => summary.skipped += 1,
                MappingChange::Inserted | MappingChange::Replaced => {
                    summary.imported += 1;
                    dirty.insert(ni);
                }
            }
        }

        for ni in dirty {
            let node = &mut nodes[ni];
            node.updated_at = Utc::now();
            if let Err(e) = self.repo.update(node) {
                warn!(hierarchy_id = %node.hierarchy_id, error = %e, "failed to store mappings");
                summary.error(format!("{}: storing mappings failed: {}", node.hierarchy_id, e));
            }
        }

        info!(
            project_id,
            imported = summary.imported,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            "mapping import finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{MappingFlags, Project};
    use crate::importer::file_parser::CsvParser;
    use crate::repository::HierarchyRepositoryImpl;
    use std::sync::Arc;

    fn mapping(table: &str) -> SourceMapping {
        SourceMapping {
            mapping_index: 0,
            database: "DW".to_string(),
            schema: "GL".to_string(),
            table: table.to_string(),
            column: "AMOUNT".to_string(),
            column_type: None,
            source_filter_value: None,
            precedence_group: None,
            flags: MappingFlags::default(),
        }
    }

    #[test]
    fn test_apply_mapping() {
        let mut node = HierarchyNode::new("P1", "REV", "Revenue");
        assert_eq!(apply_mapping(&mut node, Some(5), mapping("A")), MappingChange::Inserted);
        assert_eq!(apply_mapping(&mut node, Some(2), mapping("B")), MappingChange::Inserted);
        assert_eq!(apply_mapping(&mut node, None, mapping("C")), MappingChange::Inserted);
        assert_eq!(apply_mapping(&mut node, Some(5), mapping("A")), MappingChange::Unchanged);
        assert_eq!(apply_mapping(&mut node, Some(2), mapping("D")), MappingChange::Replaced);

        let summary: Vec<(i64, &str)> = node
            .source_mappings
            .iter()
            .map(|m| (m.mapping_index, m.table.as_str()))
            .collect();
        assert_eq!(summary, vec![(2, "D"), (5, "A"), (6, "C")]);
    }

    #[test]
    fn test_import_mapping_csv() {
        let repo = Arc::new(HierarchyRepositoryImpl::in_memory().unwrap());
        repo.create_project(&Project {
            project_id: "P1".to_string(),
            name: "Plan".to_string(),
            created_at: Utc::now(),
        })
        .unwrap();
        repo.create(&HierarchyNode::new("P1", "REV", "Revenue")).unwrap();

        let importer = MappingImporter::new(repo.clone());
        let csv = "HIERARCHY_ID,MAPPING_INDEX,SOURCE_DATABASE,SOURCE_SCHEMA,SOURCE_TABLE,SOURCE_COLUMN\n\
                   REV,1,DW,GL,FACT_GL,AMOUNT\n\
                   NOPE,1,DW,GL,FACT_GL,AMOUNT\n\
                   REV,,DW,GL,FACT_GL,QTY\n";
        let table = CsvParser.parse_str(csv).unwrap();

        let summary = importer.import_table("P1", &table).unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("NOPE"));

        let node = repo.find_by_hierarchy_id("P1", "REV").unwrap().unwrap();
        assert_eq!(node.source_mappings.len(), 2);
        assert_eq!(node.source_mappings[1].mapping_index, 2);
        assert_eq!(node.source_mappings[1].column, "QTY");

        // re-import: index 1 unchanged, index-less row appends again
        let again = importer
            .import_table("P1", &CsvParser.parse_str("HIERARCHY_ID,MAPPING_INDEX,SOURCE_TABLE,SOURCE_COLUMN,SOURCE_DATABASE,SOURCE_SCHEMA\nREV,1,FACT_GL,AMOUNT,DW,GL\n").unwrap())
            .unwrap();
        assert_eq!((again.imported, again.skipped), (0, 1));
    }
}
