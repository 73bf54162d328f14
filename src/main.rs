// ==========================================
// Hierarchy Recon - CLI entry point
// ==========================================
// Subcommands map 1:1 onto HierarchyApi calls.
// Results go to stdout as JSON (CSV for exports); logs go to stderr.
// ==========================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hierarchy_recon::{logging, HierarchyApi, ImportDialect};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Environment override for the database location.
const DB_PATH_ENV: &str = "HIERARCHY_RECON_DB_PATH";

#[derive(Parser)]
#[command(name = "hierarchy-recon")]
#[command(version, about = "Hierarchy reconstruction & reconciliation for flat CSV exports", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Database path (default: $HIERARCHY_RECON_DB_PATH, then the user data dir)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project (no-op when it exists)
    InitProject {
        project_id: String,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Detect the format of a CSV / Excel file
    Detect { file: PathBuf },
    /// Profile the columns of a CSV / Excel file
    AnalyzeCsv { file: PathBuf },
    /// Import a hierarchy file
    Import {
        project_id: String,
        file: PathBuf,
        /// Force a dialect instead of detecting it
        #[arg(long, value_enum)]
        dialect: Option<DialectArg>,
    },
    /// Import a source-mapping file
    ImportMappings { project_id: String, file: PathBuf },
    /// Export the hierarchy as standard CSV
    Export {
        project_id: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Export source mappings as CSV
    ExportMappings {
        project_id: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Rewrite formula name references to hierarchy ids
    Resolve { project_id: String },
    /// Run the anomaly checks
    Analyze { project_id: String },
    /// Store a setting (globally, or for one project with --project)
    SetConfig {
        key: String,
        value: String,
        #[arg(long)]
        project: Option<String>,
    },
    /// Show effective settings
    ShowConfig {
        #[arg(long)]
        project: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Standard,
    Legacy,
}

impl From<DialectArg> for ImportDialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Standard => ImportDialect::Standard,
            DialectArg::Legacy => ImportDialect::Legacy,
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db.unwrap_or_else(default_db_path);
    tracing::debug!(db_path = %db_path, "using database");
    let api = HierarchyApi::new(&db_path)?;

    match cli.command {
        Commands::InitProject { project_id, name } => print_json(&api.init_project(&project_id, &name)?),
        Commands::Detect { file } => print_json(&api.detect(&file)?),
        Commands::AnalyzeCsv { file } => print_json(&api.analyze_csv(&file)?),
        Commands::Import {
            project_id,
            file,
            dialect,
        } => print_json(&api.import_file(&project_id, &file, dialect.map(Into::into))?),
        Commands::ImportMappings { project_id, file } => {
            print_json(&api.import_mappings_file(&project_id, &file)?)
        }
        Commands::Export { project_id, output } => write_output(&api.export(&project_id)?, output.as_deref()),
        Commands::ExportMappings { project_id, output } => {
            write_output(&api.export_mappings(&project_id)?, output.as_deref())
        }
        Commands::Resolve { project_id } => print_json(&api.resolve(&project_id)?),
        Commands::Analyze { project_id } => print_json(&api.analyze(&project_id)?),
        Commands::SetConfig {
            key,
            value,
            project,
        } => {
            api.set_config(project.as_deref(), &key, &value)?;
            print_json(&api.list_config(project.as_deref())?)
        }
        Commands::ShowConfig { project } => print_json(&api.list_config(project.as_deref())?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = text.len(), "export written");
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// --db is not given: env var, then `<data dir>/hierarchy-recon/hierarchy_recon.db`.
fn default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./hierarchy_recon.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("hierarchy-recon");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("hierarchy_recon.db");
        }
    }
    path.to_string_lossy().to_string()
}
