// ==========================================
// Hierarchy Recon - Hierarchy API
// ==========================================
// Responsibility: one entry point wiring parser → detector → importer →
// resolver, exporters, anomaly engine and configuration
// Shared state: one SQLite connection behind Arc<Mutex<_>>
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{config_keys, ConfigManager, ConfigScope, EngineConfigReader};
use crate::db::{configure_sqlite_connection, init_schema, open_sqlite_connection};
use crate::domain::anomaly::Anomaly;
use crate::domain::hierarchy::{Project, SourceMapping};
use crate::domain::import::{FormatDetection, ImportSummary, ResolveReport};
use crate::domain::types::{CsvFormat, ImportDialect};
use crate::engine::{AnomalyDetector, AnomalyReport};
use crate::exporter::{HierarchyExporter, MappingExporter};
use crate::importer::{
    CsvAnalysis, CsvAnalyzer, CsvParser, FileParser, FormatDetector, FormulaReferenceResolver,
    HierarchyImporter, HierarchyImporterImpl, ImportError, MappingImporter, ParsedTable,
    UniversalFileParser,
};
use crate::repository::{HierarchyRepository, HierarchyRepositoryImpl};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// Result of one hierarchy import call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub detection: FormatDetection,
    pub dialect: ImportDialect,
    pub summary: ImportSummary,
    /// Present when the project-wide resolver ran after the import.
    pub resolution: Option<ResolveReport>,
}

// ==========================================
// HierarchyApi
// ==========================================
pub struct HierarchyApi {
    repo: Arc<HierarchyRepositoryImpl>,
    config: Arc<ConfigManager>,
    parser: Box<dyn FileParser>,
    detector: FormatDetector,
    analyzer: CsvAnalyzer,
    anomaly_detector: AnomalyDetector,
}

impl HierarchyApi {
    /// Open (and initialize) the database at `db_path`.
    pub fn new(db_path: &str) -> ApiResult<Self> {
        info!(db_path, "opening hierarchy database");
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("{}: {}", db_path, e)))?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, for tests and one-shot conversions.
    pub fn in_memory() -> ApiResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        configure_sqlite_connection(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> ApiResult<Self> {
        init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            repo: Arc::new(HierarchyRepositoryImpl::from_connection(conn.clone())?),
            config: Arc::new(ConfigManager::from_connection(conn)?),
            parser: Box::new(UniversalFileParser),
            detector: FormatDetector,
            analyzer: CsvAnalyzer,
            anomaly_detector: AnomalyDetector::new(),
        })
    }

    // ==========================================
    // Projects
    // ==========================================

    /// Create a project; an existing project is returned unchanged.
    #[instrument(skip(self))]
    pub fn init_project(&self, project_id: &str, name: &str) -> ApiResult<Project> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Err(ApiError::InvalidInput("project id is empty".to_string()));
        }
        if let Some(existing) = self.repo.find_project(project_id)? {
            return Ok(existing);
        }
        let project = Project {
            project_id: project_id.to_string(),
            name: if name.trim().is_empty() { project_id } else { name.trim() }.to_string(),
            created_at: Utc::now(),
        };
        self.repo.create_project(&project)?;
        info!(project_id, "project created");
        Ok(project)
    }

    fn ensure_project(&self, project_id: &str) -> ApiResult<()> {
        if self.repo.project_exists(project_id)? {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("project {}", project_id)))
        }
    }

    // ==========================================
    // Inspection
    // ==========================================

    pub fn parse_file(&self, path: &Path) -> ApiResult<ParsedTable> {
        Ok(self.parser.parse_file(path)?)
    }

    pub fn detect(&self, path: &Path) -> ApiResult<FormatDetection> {
        let table = self.parse_file(path)?;
        Ok(self.detector.detect(&table.headers))
    }

    pub fn analyze_csv(&self, path: &Path) -> ApiResult<CsvAnalysis> {
        let table = self.parse_file(path)?;
        Ok(self.analyzer.analyze(&table))
    }

    // ==========================================
    // Hierarchy import
    // ==========================================

    /// Import a hierarchy file; the dialect is detected unless given.
    pub fn import_file(
        &self,
        project_id: &str,
        path: &Path,
        dialect: Option<ImportDialect>,
    ) -> ApiResult<ImportReport> {
        let table = self.parse_file(path)?;
        self.import_table(project_id, &table, dialect)
    }

    pub fn import_csv_text(
        &self,
        project_id: &str,
        text: &str,
        dialect: Option<ImportDialect>,
    ) -> ApiResult<ImportReport> {
        let table = CsvParser.parse_str(text)?;
        self.import_table(project_id, &table, dialect)
    }

    #[instrument(skip(self, table), fields(rows = table.rows.len()))]
    pub fn import_table(
        &self,
        project_id: &str,
        table: &ParsedTable,
        dialect: Option<ImportDialect>,
    ) -> ApiResult<ImportReport> {
        self.ensure_project(project_id)?;

        let detection = self.detector.detect(&table.headers);
        let dialect = match dialect.or_else(|| ImportDialect::from_format(detection.format)) {
            Some(dialect) => dialect,
            None => return Err(ImportError::NotAHierarchyFile(detection.format).into()),
        };

        let options = self.config.import_options(Some(project_id))?;
        let importer = HierarchyImporterImpl::with_defaults(self.repo.clone(), options);
        let summary = importer.import_table(project_id, table, dialect)?;

        let resolution = if options.resolve_after_import {
            Some(self.resolve(project_id)?)
        } else {
            None
        };

        info!(
            project_id,
            %dialect,
            imported = summary.imported,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            "hierarchy import finished"
        );
        Ok(ImportReport {
            detection,
            dialect,
            summary,
            resolution,
        })
    }

    /// Rewrite name references to hierarchy ids across the project.
    pub fn resolve(&self, project_id: &str) -> ApiResult<ResolveReport> {
        Ok(FormulaReferenceResolver::new(self.repo.clone()).resolve_project(project_id)?)
    }

    // ==========================================
    // Mapping import
    // ==========================================

    pub fn import_mappings_file(&self, project_id: &str, path: &Path) -> ApiResult<ImportSummary> {
        let table = self.parse_file(path)?;
        self.import_mappings_table(project_id, &table)
    }

    pub fn import_mappings_text(&self, project_id: &str, text: &str) -> ApiResult<ImportSummary> {
        let table = CsvParser.parse_str(text)?;
        self.import_mappings_table(project_id, &table)
    }

    fn import_mappings_table(&self, project_id: &str, table: &ParsedTable) -> ApiResult<ImportSummary> {
        let detection = self.detector.detect(&table.headers);
        if detection.format != CsvFormat::Mapping {
            return Err(ApiError::UnrecognizedFormat(format!(
                "expected a mapping file, detected {}",
                detection.format
            )));
        }
        Ok(MappingImporter::new(self.repo.clone()).import_table(project_id, table)?)
    }

    // ==========================================
    // Export
    // ==========================================

    #[instrument(skip(self))]
    pub fn export(&self, project_id: &str) -> ApiResult<String> {
        let options = self.config.export_options(Some(project_id))?;
        Ok(HierarchyExporter::new(self.repo.clone()).export(project_id, &options)?)
    }

    #[instrument(skip(self))]
    pub fn export_mappings(&self, project_id: &str) -> ApiResult<String> {
        Ok(MappingExporter::new(self.repo.clone()).export(project_id)?)
    }

    // ==========================================
    // Analysis
    // ==========================================

    #[instrument(skip(self))]
    pub fn analyze(&self, project_id: &str) -> ApiResult<AnomalyReport> {
        self.ensure_project(project_id)?;
        let config = self.config.detection_config(Some(project_id))?;
        let nodes = self.repo.find_all_by_project(project_id)?;
        let anomalies = self.anomaly_detector.detect(&nodes, &config);
        Ok(AnomalyReport::new(project_id, anomalies))
    }

    /// Duplicate / type feedback for a mapping before it is stored.
    pub fn check_mapping_change(
        &self,
        project_id: &str,
        hierarchy_id: &str,
        candidate: &SourceMapping,
    ) -> ApiResult<Vec<Anomaly>> {
        let node = self
            .repo
            .find_by_hierarchy_id(project_id, hierarchy_id)?
            .ok_or_else(|| ApiError::NotFound(format!("hierarchy {} in project {}", hierarchy_id, project_id)))?;
        let nodes = self.repo.find_all_by_project(project_id)?;
        Ok(self.anomaly_detector.check_mapping_change(&node, candidate, &nodes))
    }

    // ==========================================
    // Configuration
    // ==========================================

    /// Store a setting globally (`project_id = None`) or for one project.
    pub fn set_config(&self, project_id: Option<&str>, key: &str, value: &str) -> ApiResult<()> {
        if !config_keys::ALL.contains(&key) {
            return Err(ApiError::InvalidInput(format!(
                "unknown config key '{}' (known: {})",
                key,
                config_keys::ALL.join(", ")
            )));
        }
        if let Some(id) = project_id {
            self.ensure_project(id)?;
        }
        self.config
            .set_config_value(&ConfigScope::for_project(project_id), key, value)?;
        Ok(())
    }

    /// Effective settings for a project: global values overlaid with project ones.
    pub fn list_config(&self, project_id: Option<&str>) -> ApiResult<BTreeMap<String, String>> {
        let mut values = self.config.list_config(&ConfigScope::Global)?;
        if project_id.is_some() {
            values.extend(self.config.list_config(&ConfigScope::for_project(project_id))?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::MappingFlags;

    const REVENUE_CSV: &str = "HIERARCHY_ID,HIERARCHY_NAME,PARENT_ID,IS_ROOT,SORT_ORDER,LEVEL_1,LEVEL_2\n\
                               REV,Revenue,,TRUE,1,Revenue,\n\
                               PROD_SALES,Product Sales,REV,FALSE,1,Revenue,Product Sales\n";

    fn api_with_project() -> HierarchyApi {
        let api = HierarchyApi::in_memory().unwrap();
        api.init_project("P1", "Plan").unwrap();
        api
    }

    #[test]
    fn test_init_project_is_idempotent() {
        let api = HierarchyApi::in_memory().unwrap();
        let first = api.init_project("P1", "Plan").unwrap();
        let second = api.init_project("P1", "Other name").unwrap();
        assert_eq!(second.name, first.name);
        assert!(matches!(api.init_project("  ", "x"), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_import_detects_dialect_and_resolves() {
        let api = api_with_project();
        let report = api.import_csv_text("P1", REVENUE_CSV, None).unwrap();
        assert_eq!(report.detection.format, CsvFormat::Hierarchy);
        assert_eq!(report.dialect, ImportDialect::Standard);
        assert_eq!(report.summary.imported, 2);
        assert!(report.resolution.is_some());
    }

    #[test]
    fn test_import_rejects_mapping_file_as_hierarchy() {
        let api = api_with_project();
        let csv = "HIERARCHY_ID,MAPPING_INDEX,SOURCE_DATABASE,SOURCE_TABLE,SOURCE_COLUMN\nREV,1,DW,T,C\n";
        let err = api.import_csv_text("P1", csv, None).unwrap_err();
        assert!(matches!(err, ApiError::UnrecognizedFormat(_)));
    }

    #[test]
    fn test_import_into_missing_project() {
        let api = HierarchyApi::in_memory().unwrap();
        let err = api.import_csv_text("NOPE", REVENUE_CSV, None).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_resolve_after_import_can_be_disabled() {
        let api = api_with_project();
        api.set_config(Some("P1"), config_keys::RESOLVE_AFTER_IMPORT, "false").unwrap();
        let report = api.import_csv_text("P1", REVENUE_CSV, None).unwrap();
        assert!(report.resolution.is_none());
    }

    #[test]
    fn test_set_config_validation() {
        let api = api_with_project();
        assert!(matches!(
            api.set_config(None, "no_such_key", "1"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.set_config(Some("P9"), config_keys::EXPORT_LEVELS, "9"),
            Err(ApiError::NotFound(_))
        ));

        api.set_config(None, config_keys::EXPORT_LEVELS, "9").unwrap();
        api.set_config(Some("P1"), config_keys::EXPORT_LEVELS, "12").unwrap();
        assert_eq!(api.list_config(None).unwrap()[config_keys::EXPORT_LEVELS], "9");
        assert_eq!(api.list_config(Some("P1")).unwrap()[config_keys::EXPORT_LEVELS], "12");
    }

    #[test]
    fn test_analyze_and_mapping_check() {
        let api = api_with_project();
        api.import_csv_text("P1", REVENUE_CSV, None).unwrap();

        let report = api.analyze("P1").unwrap();
        assert_eq!(report.summary.total, report.anomalies.len());
        // Product Sales is an unmapped leaf
        assert!(report
            .anomalies
            .iter()
            .any(|a| a.node_ref.as_ref().map(|n| n.hierarchy_id.as_str()) == Some("PROD_SALES")));

        let candidate = SourceMapping {
            mapping_index: 1,
            database: "DW".to_string(),
            schema: "GL".to_string(),
            table: "FACT".to_string(),
            column: "AMOUNT".to_string(),
            column_type: Some("VARCHAR".to_string()),
            source_filter_value: None,
            precedence_group: None,
            flags: MappingFlags::default(),
        };
        let findings = api.check_mapping_change("P1", "PROD_SALES", &candidate).unwrap();
        assert_eq!(findings.len(), 1);
        assert!(matches!(
            api.check_mapping_change("P1", "MISSING", &candidate),
            Err(ApiError::NotFound(_))
        ));
    }
}
