// ==========================================
// Hierarchy Recon - Mapping exporter
// ==========================================
// One row per SourceMapping, nodes in hierarchy export order,
// mappings by MAPPING_INDEX. Placeholders carry no mappings and are skipped.
// ==========================================

use crate::domain::columns as col;
use crate::domain::hierarchy::HierarchyNode;
use crate::exporter::error::{ExportError, ExportResult};
use crate::exporter::hierarchy_exporter::export_order;
use crate::exporter::layout::CsvLayout;
use crate::importer::data_cleaner::DataCleaner;
use crate::repository::HierarchyRepository;
use tracing::{info, instrument};

pub fn render_mappings(nodes: &[HierarchyNode]) -> ExportResult<String> {
    let layout = CsvLayout::new(col::MAPPING_COLUMNS.iter().map(|c| c.to_string()).collect());
    let mut records = Vec::new();

    for i in export_order(nodes) {
        let node = &nodes[i];
        if node.is_synthesized() {
            continue;
        }
        let mut mappings: Vec<_> = node.source_mappings.iter().collect();
        mappings.sort_by_key(|m| m.mapping_index);

        for mapping in mappings {
            let mut record = layout.blank();
            layout.set(&mut record, col::HIERARCHY_ID, node.hierarchy_id.as_str());
            layout.set(&mut record, col::MAPPING_INDEX, mapping.mapping_index.to_string());
            layout.set(&mut record, col::SOURCE_DATABASE, mapping.database.as_str());
            layout.set(&mut record, col::SOURCE_SCHEMA, mapping.schema.as_str());
            layout.set(&mut record, col::SOURCE_TABLE, mapping.table.as_str());
            layout.set(&mut record, col::SOURCE_COLUMN, mapping.column.as_str());
            layout.set(&mut record, col::SOURCE_COLUMN_TYPE, mapping.column_type.clone().unwrap_or_default());
            layout.set(&mut record, col::SOURCE_UID, mapping.source_filter_value.clone().unwrap_or_default());
            layout.set(&mut record, col::PRECEDENCE_GROUP, mapping.precedence_group.clone().unwrap_or_default());
            layout.set(&mut record, col::INCLUDE_FLAG, DataCleaner::format_bool(mapping.flags.include));
            layout.set(&mut record, col::EXCLUDE_FLAG, DataCleaner::format_bool(mapping.flags.exclude));
            layout.set(&mut record, col::TRANSFORM_FLAG, DataCleaner::format_bool(mapping.flags.transform));
            layout.set(&mut record, col::ACTIVE_FLAG, DataCleaner::format_bool(mapping.flags.active));
            records.push(record);
        }
    }

    info!(rows = records.len(), "mappings rendered");
    layout.write(&records)
}

pub struct MappingExporter<R>
where
    R: HierarchyRepository,
{
    repo: R,
}

impl<R> MappingExporter<R>
where
    R: HierarchyRepository,
{
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub fn export(&self, project_id: &str) -> ExportResult<String> {
        if !self.repo.project_exists(project_id)? {
            return Err(ExportError::ProjectNotFound(project_id.to_string()));
        }
        let nodes = self.repo.find_all_by_project(project_id)?;
        render_mappings(&nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{MappingFlags, SourceMapping};
    use crate::importer::file_parser::CsvParser;

    fn mapping(index: i64, table: &str) -> SourceMapping {
        SourceMapping {
            mapping_index: index,
            database: "DW".to_string(),
            schema: "GL".to_string(),
            table: table.to_string(),
            column: "AMOUNT".to_string(),
            column_type: Some("NUMBER".to_string()),
            source_filter_value: None,
            precedence_group: None,
            flags: MappingFlags::default(),
        }
    }

    #[test]
    fn test_render_mappings_order_and_placeholders() {
        let mut root = HierarchyNode::new("P1", "SYNTH_INCOME", "Income");
        root.id = "1".to_string();
        root.source_mappings = vec![mapping(1, "IGNORED")];
        let mut rev = HierarchyNode::new("P1", "REV", "Revenue");
        rev.id = "2".to_string();
        rev.set_parent(Some("1".to_string()));
        rev.source_mappings = vec![mapping(3, "FACT_B"), mapping(1, "FACT_A")];

        let text = render_mappings(&[root, rev]).unwrap();
        let table = CsvParser.parse_str(&text).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.get(&table.rows[0], "SOURCE_TABLE"), Some("FACT_A"));
        assert_eq!(table.get(&table.rows[1], "MAPPING_INDEX"), Some("3"));
        assert_eq!(table.get(&table.rows[1], "SOURCE_COLUMN_TYPE"), Some("NUMBER"));
        assert_eq!(table.get(&table.rows[0], "SOURCE_UID"), None);
    }

    #[test]
    fn test_empty_project_writes_header_only() {
        let text = render_mappings(&[]).unwrap();
        assert!(text.starts_with("HIERARCHY_ID,MAPPING_INDEX,"));
        assert_eq!(text.lines().count(), 1);
    }
}
