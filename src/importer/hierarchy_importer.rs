// ==========================================
// Hierarchy Recon - Hierarchy importer implementation
// ==========================================
// Flow: map rows → group → total-formula plan → build nodes → conflicts
//       → placeholders → resolve references → link parents → persist
// Every pass works over arena indices; the repository is written once per
// node (create) plus once more for linked nodes (update parent).
// ==========================================

use crate::domain::columns as col;
use crate::domain::hierarchy::{HierarchyNode, META_SYNTHESIZED};
use crate::domain::import::{ImportSummary, RawHierarchyRow};
use crate::domain::types::{ImportDialect, LevelWindow};
use crate::importer::arena::{ArenaNode, NodeArena, NodeIdx, NodeOrigin};
use crate::importer::conflict_handler::ConflictHandler as ConflictHandlerImpl;
use crate::importer::dialect::{DialectStrategy, Placeholder, RowGroup};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper as FieldMapperImpl;
use crate::importer::file_parser::ParsedTable;
use crate::importer::formula_resolver::{resolve_node_references, ReferenceIndex};
use crate::importer::hierarchy_importer_trait::{ConflictHandler, FieldMapper, HierarchyImporter};
use crate::importer::total_formula::plan_total_formulas;
use crate::repository::HierarchyRepository;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

// ==========================================
// ImportOptions
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    pub standard_window: LevelWindow,
    pub legacy_window: LevelWindow,
    pub resolve_after_import: bool, // run the project-wide reference resolver afterwards
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            standard_window: LevelWindow::STANDARD,
            legacy_window: LevelWindow::LEGACY,
            resolve_after_import: true,
        }
    }
}

// ==========================================
// HierarchyImporterImpl
// ==========================================
pub struct HierarchyImporterImpl<R>
where
    R: HierarchyRepository,
{
    repo: R,
    options: ImportOptions,

    // pipeline components
    field_mapper: Box<dyn FieldMapper>,
    conflict_handler: Box<dyn ConflictHandler>,
}

impl<R> HierarchyImporterImpl<R>
where
    R: HierarchyRepository,
{
    pub fn new(
        repo: R,
        options: ImportOptions,
        field_mapper: Box<dyn FieldMapper>,
        conflict_handler: Box<dyn ConflictHandler>,
    ) -> Self {
        Self {
            repo,
            options,
            field_mapper,
            conflict_handler,
        }
    }

    /// Importer with the default field mapper and conflict handler.
    pub fn with_defaults(repo: R, options: ImportOptions) -> Self {
        Self::new(
            repo,
            options,
            Box::new(FieldMapperImpl),
            Box::new(ConflictHandlerImpl),
        )
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    fn ensure_project(&self, project_id: &str) -> ImportResult<()> {
        if self.repo.project_exists(project_id)? {
            Ok(())
        } else {
            Err(ImportError::ProjectNotFound(project_id.to_string()))
        }
    }

    /// Group indexes to skip: intra-batch duplicates and ids already persisted.
    fn detect_conflicts(
        &self,
        groups: &[RowGroup],
        arena: &NodeArena,
        summary: &mut ImportSummary,
    ) -> (HashSet<usize>, HashMap<usize, NodeIdx>) {
        let keys: Vec<(usize, String)> = groups
            .iter()
            .map(|g| (g.row_number(), g.hierarchy_id.clone()))
            .collect();
        let by_row: HashMap<usize, usize> = groups
            .iter()
            .enumerate()
            .map(|(gi, g)| (g.row_number(), gi))
            .collect();

        let mut duplicates = HashSet::new();
        for (row_number, hierarchy_id) in self.conflict_handler.detect_duplicates(&keys) {
            summary.warning(format!(
                "row {}: duplicate HIERARCHY_ID '{}' in file, row skipped",
                row_number, hierarchy_id
            ));
            summary.skipped += 1;
            if let Some(gi) = by_row.get(&row_number) {
                duplicates.insert(*gi);
            }
        }

        let persisted_ids: HashSet<String> = arena
            .iter()
            .filter(|(_, n)| n.origin == NodeOrigin::Persisted)
            .map(|(_, n)| n.node.hierarchy_id.clone())
            .collect();
        let mut existing = HashMap::new();
        for (row_number, hierarchy_id) in self.conflict_handler.detect_existing(&keys, &persisted_ids) {
            let Some(gi) = by_row.get(&row_number) else {
                continue;
            };
            if duplicates.contains(gi) {
                continue;
            }
            debug!(row = row_number, hierarchy_id = %hierarchy_id, "hierarchy already exists, skipped");
            summary.skipped += 1;
            if let Some(idx) = arena.persisted.hierarchy_id(&hierarchy_id) {
                existing.insert(*gi, idx);
            }
        }
        (duplicates, existing)
    }

    fn register_group(arena: &mut NodeArena, group: &RowGroup, idx: NodeIdx) {
        arena.batch.register_hierarchy_id(&group.hierarchy_id, idx);
        arena.batch.register_name(&group.name, idx);
        for xref in group.xrefs() {
            arena.batch.register_xref(xref, idx);
        }
        arena.batch.register_path(&group.path, idx);
    }

    fn placeholder_node(project_id: &str, placeholder: &Placeholder) -> HierarchyNode {
        let mut node = HierarchyNode::new(project_id, &placeholder.hierarchy_id, &placeholder.name);
        node.level_path = placeholder.path.clone();
        node.level_sort_orders = placeholder.sorts.clone();
        node.sort_order = placeholder.sorts.last().copied().flatten().unwrap_or(0);
        node.metadata
            .insert(META_SYNTHESIZED.to_string(), Value::Bool(true));
        node
    }

    fn describe(arena: &NodeArena, groups: &[RowGroup], idx: NodeIdx) -> String {
        let entry = arena.get(idx);
        match entry.group {
            Some(gi) => format!("row {}: '{}'", groups[gi].row_number(), entry.node.hierarchy_id),
            None => format!("placeholder '{}'", entry.node.hierarchy_id),
        }
    }

    /// Create every new node unlinked, then link parents. Returns the created indexes.
    fn persist(
        &self,
        arena: &mut NodeArena,
        groups: &[RowGroup],
        new_nodes: &[NodeIdx],
        summary: &mut ImportSummary,
    ) -> Vec<NodeIdx> {
        let mut created = Vec::with_capacity(new_nodes.len());
        for &idx in new_nodes {
            let entry = arena.get_mut(idx);
            entry.node.set_parent(None);
            match self.repo.create(&entry.node) {
                Ok(id) => {
                    entry.node.id = id;
                    created.push(idx);
                }
                Err(e) => {
                    let label = Self::describe(arena, groups, idx);
                    warn!(node = %label, error = %e, "failed to create node");
                    summary.error(format!("{}: create failed: {}", label, e));
                }
            }
        }

        for &idx in &created {
            let Some(parent) = arena.get(idx).parent else {
                continue;
            };
            let parent_id = arena.get(parent).node.id.clone();
            if parent_id.is_empty() {
                summary.warning(format!(
                    "{}: parent '{}' was not stored, kept as root",
                    Self::describe(arena, groups, idx),
                    arena.get(parent).node.hierarchy_id
                ));
                continue;
            }
            let entry = arena.get_mut(idx);
            entry.node.set_parent(Some(parent_id));
            if let Err(e) = self.repo.update(&entry.node) {
                let label = Self::describe(arena, groups, idx);
                warn!(node = %label, error = %e, "failed to link parent");
                summary.error(format!("{}: linking parent failed: {}", label, e));
            }
        }
        created
    }
}

impl<R> HierarchyImporter for HierarchyImporterImpl<R>
where
    R: HierarchyRepository,
{
    #[instrument(skip(self, table), fields(rows = table.rows.len()))]
    fn import_table(
        &self,
        project_id: &str,
        table: &ParsedTable,
        dialect: ImportDialect,
    ) -> ImportResult<ImportSummary> {
        self.ensure_project(project_id)?;

        let mut summary = ImportSummary::default();
        for message in &table.parse_errors {
            summary.error(message.clone());
        }

        let custom_flag_columns = self.field_mapper.custom_flag_columns(table, dialect);
        debug!(columns = ?custom_flag_columns, "custom flag columns");

        let mut rows: Vec<RawHierarchyRow> = Vec::with_capacity(table.rows.len());
        for raw in &table.rows {
            let mapped = match dialect {
                ImportDialect::Standard => {
                    self.field_mapper
                        .map_standard_row(table, raw, &custom_flag_columns)
                }
                ImportDialect::Legacy => {
                    self.field_mapper
                        .map_legacy_row(table, raw, &custom_flag_columns)
                }
            };
            match mapped {
                Ok(row) => rows.push(row),
                Err(e) => summary.error(e.to_string()),
            }
        }

        let has_leaf_column = table.has_column(col::IS_LEAF_NODE);
        let batch = self.import_rows(project_id, rows, dialect, has_leaf_column)?;
        summary.merge(batch);
        Ok(summary)
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    fn import_rows(
        &self,
        project_id: &str,
        rows: Vec<RawHierarchyRow>,
        dialect: ImportDialect,
        has_leaf_column: bool,
    ) -> ImportResult<ImportSummary> {
        let start = Instant::now();
        self.ensure_project(project_id)?;

        let mut summary = ImportSummary::default();
        let mut arena = NodeArena::with_persisted(self.repo.find_all_by_project(project_id)?);
        let strategy: Box<dyn DialectStrategy> = dialect.strategy(&self.options);

        // === Grouping and pre-passes ===
        let groups = strategy.group_rows(rows, &mut summary);
        let plans = plan_total_formulas(&groups, &mut summary);
        let placeholders = strategy.missing_ancestors(&groups);
        let (duplicates, existing) = self.detect_conflicts(&groups, &arena, &mut summary);
        debug!(
            groups = groups.len(),
            total_formulas = plans.len(),
            placeholders = placeholders.len(),
            "rows grouped"
        );

        // === Pass 1: build nodes ===
        let mut group_idx: Vec<Option<NodeIdx>> = vec![None; groups.len()];
        let mut new_nodes: Vec<NodeIdx> = Vec::new();
        for (gi, group) in groups.iter().enumerate() {
            if duplicates.contains(&gi) {
                continue;
            }
            if let Some(&persisted) = existing.get(&gi) {
                // children in this file may still hang below the existing node
                Self::register_group(&mut arena, group, persisted);
                continue;
            }
            let node = strategy.build_node(project_id, group, &mut summary);
            let idx = arena.push(ArenaNode {
                node,
                origin: NodeOrigin::Imported,
                path: group.path.clone(),
                parent: None,
                group: Some(gi),
            });
            Self::register_group(&mut arena, group, idx);
            group_idx[gi] = Some(idx);
            new_nodes.push(idx);
        }

        for placeholder in &placeholders {
            if arena.batch.path(&placeholder.path).is_some() {
                continue;
            }
            if let Some(reused) = arena
                .batch
                .hierarchy_id(&placeholder.hierarchy_id)
                .or_else(|| {
                    arena.find_persisted_match(&placeholder.hierarchy_id, &placeholder.path, &placeholder.name)
                })
            {
                debug!(hierarchy_id = %placeholder.hierarchy_id, "placeholder matched an existing node");
                arena.batch.register_path(&placeholder.path, reused);
                continue;
            }
            let idx = arena.push(ArenaNode {
                node: Self::placeholder_node(project_id, placeholder),
                origin: NodeOrigin::Synthesized,
                path: placeholder.path.clone(),
                parent: None,
                group: None,
            });
            arena.batch.register_hierarchy_id(&placeholder.hierarchy_id, idx);
            arena.batch.register_path(&placeholder.path, idx);
            new_nodes.push(idx);
        }

        // === Total formulas ===
        for plan in &plans {
            let Some(parent) = group_idx[plan.parent] else {
                summary.warning(format!(
                    "formula group '{}': aggregating node was skipped, total formula not created",
                    plan.label
                ));
                continue;
            };
            plan.apply(&groups, &mut arena.get_mut(parent).node);
            for gi in plan.participants() {
                if let Some(idx) = group_idx[gi] {
                    plan.strip_label(&mut arena.get_mut(idx).node);
                }
            }
        }

        // === Pass 1.5: formula references ===
        let index = ReferenceIndex::new(arena.iter().map(|(_, n)| &n.node));
        for &idx in &new_nodes {
            resolve_node_references(&mut arena.get_mut(idx).node, &index, &mut summary.warnings);
        }

        // === Pass 2: parents ===
        for &idx in &new_nodes {
            let group = arena.get(idx).group.map(|gi| &groups[gi]);
            let mut parent = strategy.resolve_parent(&arena, idx, group, &mut summary);
            if let Some(p) = parent {
                if arena.would_cycle(idx, p) {
                    summary.warning(format!(
                        "{}: linking to '{}' would create a cycle, kept as root",
                        Self::describe(&arena, &groups, idx),
                        arena.get(p).node.hierarchy_id
                    ));
                    parent = None;
                }
            }
            arena.get_mut(idx).parent = parent;
        }

        if !has_leaf_column {
            let parents: HashSet<NodeIdx> = new_nodes
                .iter()
                .filter_map(|idx| arena.get(*idx).parent)
                .collect();
            for &idx in &new_nodes {
                arena.get_mut(idx).node.flags.is_leaf = !parents.contains(&idx);
            }
        }

        // === Persist ===
        let created = self.persist(&mut arena, &groups, &new_nodes, &mut summary);
        for idx in &created {
            match arena.get(*idx).origin {
                NodeOrigin::Imported => summary.imported += 1,
                NodeOrigin::Synthesized => summary.synthesized += 1,
                NodeOrigin::Persisted => {}
            }
        }

        info!(
            project_id,
            dialect = %dialect,
            imported = summary.imported,
            skipped = summary.skipped,
            synthesized = summary.synthesized,
            errors = summary.errors.len(),
            warnings = summary.warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "hierarchy import finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::Project;
    use crate::domain::types::FormulaOperation;
    use crate::importer::file_parser::CsvParser;
    use crate::repository::HierarchyRepositoryImpl;
    use chrono::Utc;
    use std::sync::Arc;

    fn setup() -> (Arc<HierarchyRepositoryImpl>, HierarchyImporterImpl<Arc<HierarchyRepositoryImpl>>) {
        let repo = Arc::new(HierarchyRepositoryImpl::in_memory().unwrap());
        repo.create_project(&Project {
            project_id: "P1".to_string(),
            name: "Plan".to_string(),
            created_at: Utc::now(),
        })
        .unwrap();
        let importer = HierarchyImporterImpl::with_defaults(repo.clone(), ImportOptions::default());
        (repo, importer)
    }

    fn import(importer: &HierarchyImporterImpl<Arc<HierarchyRepositoryImpl>>, csv: &str, dialect: ImportDialect) -> ImportSummary {
        let table = CsvParser.parse_str(csv).unwrap();
        importer.import_table("P1", &table, dialect).unwrap()
    }

    fn by_hid(repo: &HierarchyRepositoryImpl, hid: &str) -> HierarchyNode {
        repo.find_by_hierarchy_id("P1", hid).unwrap().unwrap()
    }

    #[test]
    fn test_revenue_example() {
        let (repo, importer) = setup();
        let summary = import(
            &importer,
            "HIERARCHY_NAME,LEVEL_1,LEVEL_2,XREF_KEY,PARENT_XREF_KEY\n\
             Revenue,Income,,1,\n\
             Product Sales,Income,Product Sales,2,1\n",
            ImportDialect::Standard,
        );
        assert_eq!(summary.imported, 2);
        assert!(summary.errors.is_empty(), "{:?}", summary.errors);

        let revenue = by_hid(&repo, "REVENUE");
        let sales = by_hid(&repo, "PRODUCT_SALES");
        assert!(revenue.is_root);
        assert!(!sales.is_root);
        assert_eq!(sales.parent_id.as_deref(), Some(revenue.id.as_str()));
        assert!(!revenue.flags.is_leaf);
        assert!(sales.flags.is_leaf);
    }

    #[test]
    fn test_reimport_is_skipped() {
        let (_repo, importer) = setup();
        let csv = "HIERARCHY_ID,HIERARCHY_NAME,PARENT_ID\nA,Alpha,\nB,Beta,A\n";
        let first = import(&importer, csv, ImportDialect::Standard);
        assert_eq!((first.imported, first.skipped), (2, 0));
        let second = import(&importer, csv, ImportDialect::Standard);
        assert_eq!((second.imported, second.skipped), (0, 2));
    }

    #[test]
    fn test_parent_from_previous_batch() {
        let (repo, importer) = setup();
        import(&importer, "HIERARCHY_ID,HIERARCHY_NAME\nA,Alpha\n", ImportDialect::Standard);
        let summary = import(
            &importer,
            "HIERARCHY_ID,HIERARCHY_NAME,PARENT_ID\nB,Beta,A\n",
            ImportDialect::Standard,
        );
        assert_eq!(summary.imported, 1);
        let a = by_hid(&repo, "A");
        assert_eq!(by_hid(&repo, "B").parent_id, Some(a.id));
    }

    #[test]
    fn test_bad_row_does_not_abort_batch() {
        let (_repo, importer) = setup();
        let summary = import(
            &importer,
            "HIERARCHY_ID,HIERARCHY_NAME,SORT_ORDER\nA,Alpha,1\nB,Beta,x\nC,Gamma,3\n",
            ImportDialect::Standard,
        );
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("row 2:"));
    }

    #[test]
    fn test_duplicate_id_in_file_is_skipped() {
        let (_repo, importer) = setup();
        let summary = import(
            &importer,
            "HIERARCHY_NAME\nNet Sales\nnet-sales\n",
            ImportDialect::Standard,
        );
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.warnings.len(), 1);
    }

    #[test]
    fn test_missing_project_aborts() {
        let (_repo, importer) = setup();
        let table = CsvParser.parse_str("HIERARCHY_NAME\nA\n").unwrap();
        let result = importer.import_table("NOPE", &table, ImportDialect::Standard);
        assert!(matches!(result, Err(ImportError::ProjectNotFound(_))));
    }

    #[test]
    fn test_formula_rows_collapse_into_rules() {
        let (repo, importer) = setup();
        let summary = import(
            &importer,
            "HIERARCHY_ID,HIERARCHY_NAME,XREF_KEY,FORMULA_GROUP_NAME,FORMULA_OPERATION,FORMULA_OPERAND\n\
             GROSS,Gross,1,,,\n\
             RET,Returns,2,,,\n\
             NET,Net,3,NET_CALC,SUM,Gross\n\
             NET,Net,1000,NET_CALC,SUBTRACT,Returns\n",
            ImportDialect::Standard,
        );
        assert_eq!(summary.imported, 3);
        assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);

        let net = by_hid(&repo, "NET");
        let config = net.formula_config.unwrap();
        assert_eq!(config.group_name, "NET_CALC");
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].hierarchy_name_or_id, "GROSS");
        assert_eq!(config.rules[1].operation, FormulaOperation::Subtract);
        assert_eq!(config.rules[1].hierarchy_name_or_id, "RET");
        assert_eq!(net.xref_key, Some(3));
    }

    #[test]
    fn test_total_formula_import() {
        let (repo, importer) = setup();
        let summary = import(
            &importer,
            "HIERARCHY_ID,HIERARCHY_NAME,FORMULA_GROUP_NAME,AGGREGATION\n\
             TOTAL,Total,T1,SUM\n\
             A,Alpha,T1,\n\
             B,Beta,T1,\n",
            ImportDialect::Standard,
        );
        assert_eq!(summary.imported, 3);
        let total = by_hid(&repo, "TOTAL");
        assert!(total.formula_config.is_none());
        let tf = total.total_formula().unwrap();
        assert_eq!(tf.aggregation, FormulaOperation::Sum);
        let children: Vec<_> = tf.children.iter().map(|c| c.hierarchy_id.clone()).collect();
        assert_eq!(children, vec![Some("A".to_string()), Some("B".to_string())]);
        assert!(by_hid(&repo, "A").formula_config.is_none());
    }

    #[test]
    fn test_legacy_gap_filling() {
        let (repo, importer) = setup();
        let summary = import(
            &importer,
            "XREF_HIERARCHY_KEY,LEVEL_1,LEVEL_2,LEVEL_2_SORT,LEVEL_3,LEVEL_3_SORT,LEVEL_4,LEVEL_4_SORT\n\
             1,FY Plan,Income,1,,,,\n\
             2,FY Plan,Income,1,Sales,2,Net Sales Vol,3\n",
            ImportDialect::Legacy,
        );
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.synthesized, 1);

        let income = by_hid(&repo, "INCOME");
        let gap = by_hid(&repo, "SYNTH_INCOME__SALES");
        let leaf = by_hid(&repo, "INCOME__SALES__NET_SALES_VOL");
        assert!(gap.is_synthesized());
        assert_eq!(gap.level_sort_orders, vec![Some(1), Some(2)]);
        assert_eq!(gap.parent_id.as_deref(), Some(income.id.as_str()));
        assert_eq!(leaf.parent_id.as_deref(), Some(gap.id.as_str()));
        assert_eq!(
            leaf.metadata.get("project_label"),
            Some(&Value::String("FY Plan".to_string()))
        );

        // second import reuses the stored placeholder
        let again = import(
            &importer,
            "XREF_HIERARCHY_KEY,LEVEL_1,LEVEL_2,LEVEL_3,LEVEL_4\n\
             3,FY Plan,Income,Sales,Gross Sales Vol\n",
            ImportDialect::Legacy,
        );
        assert_eq!((again.imported, again.synthesized), (1, 0));
        let gross = by_hid(&repo, "INCOME__SALES__GROSS_SALES_VOL");
        assert_eq!(gross.parent_id.as_deref(), Some(gap.id.as_str()));
    }
}
