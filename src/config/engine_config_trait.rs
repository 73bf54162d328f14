// ==========================================
// Hierarchy Recon - Engine config reader Trait
// ==========================================
// Responsibility: read-only configuration the importer, exporter
// and anomaly engine need (no writes, no business logic)
// ==========================================

use crate::domain::anomaly::DetectionConfig;
use crate::exporter::ExportOptions;
use crate::importer::ImportOptions;
use crate::repository::RepositoryResult;

// ==========================================
// EngineConfigReader Trait
// ==========================================
// Implementor: ConfigManager (config_kv table)
// Every method takes the project so project-scoped values can override global ones.
pub trait EngineConfigReader: Send + Sync {
    /// Anomaly check toggles, threshold and naming pattern.
    ///
    /// # Defaults
    /// - every check enabled
    /// - pattern_consistency_threshold = 0.7
    /// - no naming pattern
    fn detection_config(&self, project_id: Option<&str>) -> RepositoryResult<DetectionConfig>;

    /// Importer level windows and post-import resolution.
    ///
    /// # Defaults
    /// - standard window LEVEL_1..LEVEL_9
    /// - legacy window LEVEL_2..LEVEL_9
    /// - resolve_after_import = true
    fn import_options(&self, project_id: Option<&str>) -> RepositoryResult<ImportOptions>;

    /// Exporter synthetic key start and level count.
    ///
    /// # Defaults
    /// - synthetic_xref_start = 1000
    /// - max_levels = 15
    fn export_options(&self, project_id: Option<&str>) -> RepositoryResult<ExportOptions>;
}
