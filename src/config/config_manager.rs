// ==========================================
// Hierarchy Recon - Configuration manager
// ==========================================
// Responsibility: load, query and override configuration
// Storage: config_kv table (scope_id + key → value)
// Scopes: 'global' and 'project/<project_id>' (project wins)
// ==========================================

use crate::config::engine_config_trait::EngineConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::anomaly::DetectionConfig;
use crate::domain::hierarchy::MAX_LEVELS;
use crate::domain::types::{AnomalyType, LevelWindow};
use crate::exporter::ExportOptions;
use crate::importer::ImportOptions;
use crate::repository::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

// ==========================================
// ConfigScope
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    Project { project_id: String },
}

impl ConfigScope {
    pub fn for_project(project_id: Option<&str>) -> Self {
        match project_id {
            Some(id) => ConfigScope::Project {
                project_id: id.to_string(),
            },
            None => ConfigScope::Global,
        }
    }

    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => "global".to_string(),
            ConfigScope::Project { project_id } => format!("project/{}", project_id),
        }
    }
}

// ==========================================
// ConfigManager
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// Open the config store at `db_path`.
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Share an existing connection (PRAGMAs are re-applied, idempotent).
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// Value stored in exactly this scope.
    pub fn get_config_value(&self, scope: &ConfigScope, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![scope.scope_id(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Project value, falling back to the global one.
    pub fn get_effective_value(
        &self,
        project_id: Option<&str>,
        key: &str,
    ) -> RepositoryResult<Option<String>> {
        if let Some(id) = project_id {
            let scope = ConfigScope::for_project(Some(id));
            if let Some(value) = self.get_config_value(&scope, key)? {
                return Ok(Some(value));
            }
        }
        self.get_config_value(&ConfigScope::Global, key)
    }

    /// Insert or overwrite a value.
    pub fn set_config_value(&self, scope: &ConfigScope, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// All values of one scope, ordered by key.
    pub fn list_config(&self, scope: &ConfigScope) -> RepositoryResult<BTreeMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![scope.scope_id()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            out.insert(key, value);
        }
        Ok(out)
    }

    fn get_config_or_default(
        &self,
        project_id: Option<&str>,
        key: &str,
        default: &str,
    ) -> RepositoryResult<String> {
        Ok(self
            .get_effective_value(project_id, key)?
            .unwrap_or_else(|| default.to_string()))
    }

    // Unparsable values fall back to the default with a warning.
    fn get_parsed_or_default<T: FromStr>(
        &self,
        project_id: Option<&str>,
        key: &str,
        default: T,
    ) -> RepositoryResult<T> {
        match self.get_effective_value(project_id, key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    warn!(key = key, value = %raw, "invalid config value, using default");
                    Ok(default)
                }
            },
        }
    }

    fn get_window_or_default(
        &self,
        project_id: Option<&str>,
        key: &str,
        default: LevelWindow,
    ) -> RepositoryResult<LevelWindow> {
        let raw = match self.get_effective_value(project_id, key)? {
            None => return Ok(default),
            Some(raw) => raw,
        };
        match parse_level_window(&raw) {
            Some(window) => Ok(window),
            None => {
                warn!(key = key, value = %raw, "invalid level window, using default");
                Ok(default)
            }
        }
    }
}

/// Parse "first-last" (e.g. "2-9") into a level window within 1..=MAX_LEVELS.
pub fn parse_level_window(raw: &str) -> Option<LevelWindow> {
    let (first, last) = raw.trim().split_once('-')?;
    let first: usize = first.trim().parse().ok()?;
    let last: usize = last.trim().parse().ok()?;
    if first == 0 || first > last || last > MAX_LEVELS {
        return None;
    }
    Some(LevelWindow { first, last })
}

fn parse_disabled_checks(raw: &str) -> Vec<AnomalyType> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| match serde_json::from_value(serde_json::Value::String(s.to_lowercase())) {
            Ok(t) => Some(t),
            Err(_) => {
                warn!(check = s, "unknown anomaly check in disabled_checks");
                None
            }
        })
        .collect()
}

impl EngineConfigReader for ConfigManager {
    fn detection_config(&self, project_id: Option<&str>) -> RepositoryResult<DetectionConfig> {
        let defaults = DetectionConfig::default();
        let mut config = DetectionConfig {
            pattern_consistency_threshold: self.get_parsed_or_default(
                project_id,
                config_keys::PATTERN_CONSISTENCY_THRESHOLD,
                defaults.pattern_consistency_threshold,
            )?,
            naming_pattern: self
                .get_effective_value(project_id, config_keys::NAMING_PATTERN)?
                .filter(|p| !p.trim().is_empty()),
            ..defaults
        };

        let disabled = self.get_config_or_default(project_id, config_keys::DISABLED_CHECKS, "")?;
        for check in parse_disabled_checks(&disabled) {
            match check {
                AnomalyType::MissingMapping => config.check_missing_mappings = false,
                AnomalyType::TypeMismatch => config.check_type_mismatches = false,
                AnomalyType::PatternInconsistency => config.check_pattern_consistency = false,
                AnomalyType::CircularReference => config.check_cycles = false,
                AnomalyType::DuplicateMapping => config.check_duplicate_mappings = false,
                AnomalyType::FormulaIssue => config.check_formulas = false,
                AnomalyType::NamingConvention => config.check_naming = false,
            }
        }

        if !(0.0..=1.0).contains(&config.pattern_consistency_threshold) {
            warn!(
                threshold = config.pattern_consistency_threshold,
                "pattern_consistency_threshold outside [0, 1], using default"
            );
            config.pattern_consistency_threshold = defaults.pattern_consistency_threshold;
        }
        Ok(config)
    }

    fn import_options(&self, project_id: Option<&str>) -> RepositoryResult<ImportOptions> {
        let defaults = ImportOptions::default();
        Ok(ImportOptions {
            standard_window: self.get_window_or_default(
                project_id,
                config_keys::STANDARD_LEVEL_WINDOW,
                defaults.standard_window,
            )?,
            legacy_window: self.get_window_or_default(
                project_id,
                config_keys::LEGACY_LEVEL_WINDOW,
                defaults.legacy_window,
            )?,
            resolve_after_import: self.get_parsed_or_default(
                project_id,
                config_keys::RESOLVE_AFTER_IMPORT,
                defaults.resolve_after_import,
            )?,
        })
    }

    fn export_options(&self, project_id: Option<&str>) -> RepositoryResult<ExportOptions> {
        let defaults = ExportOptions::default();
        let max_levels: usize =
            self.get_parsed_or_default(project_id, config_keys::EXPORT_LEVELS, defaults.max_levels)?;
        Ok(ExportOptions {
            synthetic_xref_start: self.get_parsed_or_default(
                project_id,
                config_keys::SYNTHETIC_XREF_START,
                defaults.synthetic_xref_start,
            )?,
            max_levels: max_levels.clamp(1, MAX_LEVELS),
        })
    }
}

// ==========================================
// Config keys
// ==========================================
pub mod config_keys {
    // Anomaly detection
    pub const PATTERN_CONSISTENCY_THRESHOLD: &str = "pattern_consistency_threshold";
    pub const NAMING_PATTERN: &str = "naming_pattern";
    pub const DISABLED_CHECKS: &str = "disabled_checks"; // comma separated anomaly types

    // Import
    pub const STANDARD_LEVEL_WINDOW: &str = "standard_level_window"; // "1-9"
    pub const LEGACY_LEVEL_WINDOW: &str = "legacy_level_window"; // "2-9"
    pub const RESOLVE_AFTER_IMPORT: &str = "resolve_after_import";

    // Export
    pub const SYNTHETIC_XREF_START: &str = "synthetic_xref_start";
    pub const EXPORT_LEVELS: &str = "export_levels";

    pub const ALL: &[&str] = &[
        PATTERN_CONSISTENCY_THRESHOLD,
        NAMING_PATTERN,
        DISABLED_CHECKS,
        STANDARD_LEVEL_WINDOW,
        LEGACY_LEVEL_WINDOW,
        RESOLVE_AFTER_IMPORT,
        SYNTHETIC_XREF_START,
        EXPORT_LEVELS,
    ];
}
