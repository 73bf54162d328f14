// ==========================================
// Hierarchy Recon - Configuration layer
// ==========================================
// Responsibility: engine settings with global / project override
// Storage: config_kv table
// ==========================================

pub mod config_manager;
pub mod engine_config_trait;

pub use config_manager::{config_keys, parse_level_window, ConfigManager, ConfigScope};
pub use engine_config_trait::EngineConfigReader;
