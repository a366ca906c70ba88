//! `dexter` maintenance CLI.
//!
//! # Responsibility
//! - Bootstrap, validate and inspect a Dexter store from the shell.
//! - Move rule documents between the store and rule files on disk.
//!
//! # Invariants
//! - `validate` and `health` exit non-zero on failure so scripts can gate
//!   on them.
//! - `init` refuses to replace an existing store without `--force`.

use clap::{Args, Parser, Subcommand};
use dexter_core::model::workspace::WorkspaceId;
use dexter_core::{
    health_check, init_database_with_extra, init_logging, system_stats, validate_data,
    validate_schema, AgentBrain, ContextService, HealthStatus, RuleService, Store, StoreConfig,
    WorkspaceService, BUNDLED_SCHEMA,
};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliResult = Result<ExitCode, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "dexter", version, about = "Dexter workspace store tools")]
struct Cli {
    /// Store file; falls back to `./dexter.db`.
    #[arg(long, env = "DB_PATH", global = true)]
    db: Option<PathBuf>,
    /// Directory for rolling log files; defaults to `logs/` next to the store.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a fresh store from the schema file
    Init(InitArgs),
    /// Check schema completeness and referential integrity
    Validate,
    /// Print a health report (JSON)
    Health,
    /// Print action, entity and context counts (JSON)
    Stats,
    /// Remove expired context/agent state and old completed actions
    Cleanup(CleanupArgs),
    /// Sync rule documents between the store and rule files
    SyncRules(SyncRulesArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Schema file to apply; the bundled schema is used when omitted
    #[arg(long)]
    schema: Option<PathBuf>,
    /// Additional schema applied after the core one; skipped when missing
    #[arg(long)]
    extra_schema: Option<PathBuf>,
    /// Replace an existing store
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct CleanupArgs {
    /// Age in days after which completed actions are removed
    #[arg(long, default_value_t = 30)]
    days: u32,
}

#[derive(Args)]
#[command(group(clap::ArgGroup::new("direction").required(true).args(["to_files", "to_db"])))]
struct SyncRulesArgs {
    /// Write rule documents from the store into `--dir`
    #[arg(long)]
    to_files: bool,
    /// Import rule files from `--dir` into the store
    #[arg(long)]
    to_db: bool,
    /// Report what would change without writing
    #[arg(long)]
    dry_run: bool,
    /// Workspace name; global rules when omitted
    #[arg(long)]
    workspace: Option<String>,
    /// Rule file directory
    #[arg(long, default_value = ".cursor/rules")]
    dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match &cli.db {
        Some(path) => StoreConfig::new(path.clone()),
        None => StoreConfig::from_env("."),
    };
    start_logging(&cli, &config.path);

    match run(cli.command, Store::new(config)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn start_logging(cli: &Cli, db_path: &Path) {
    let log_dir = cli.log_dir.clone().unwrap_or_else(|| {
        db_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .join("logs")
    });
    let log_dir = std::path::absolute(&log_dir).unwrap_or(log_dir);
    if let Err(err) = init_logging(&cli.log_level, &log_dir) {
        eprintln!("warning: logging disabled: {err}");
    }
}

fn run(command: Commands, store: Store) -> CliResult {
    match command {
        Commands::Init(args) => init(&store, args),
        Commands::Validate => validate(&store),
        Commands::Health => health(&store),
        Commands::Stats => stats(&store),
        Commands::Cleanup(args) => cleanup(&store, args),
        Commands::SyncRules(args) => sync_rules(&store, args),
    }
}

fn init(store: &Store, args: InitArgs) -> CliResult {
    if store.path().exists() && !args.force {
        eprintln!(
            "refusing to replace existing store {}; pass --force",
            store.path().display()
        );
        return Ok(ExitCode::FAILURE);
    }

    let extra = args.extra_schema.as_deref();
    match args.schema {
        Some(schema) => init_database_with_extra(store.config(), &schema, extra)?,
        None => {
            let schema = std::env::temp_dir().join(format!("dexter-schema-{}.sql", std::process::id()));
            std::fs::write(&schema, BUNDLED_SCHEMA)?;
            let result = init_database_with_extra(store.config(), &schema, extra);
            let _ = std::fs::remove_file(&schema);
            result?;
        }
    }
    println!("Initialized {}", store.path().display());
    Ok(ExitCode::SUCCESS)
}

fn validate(store: &Store) -> CliResult {
    println!("Validating database: {}", store.path().display());
    println!("{}", "-".repeat(60));

    let schema = validate_schema(store);
    if schema.is_valid() {
        println!("Schema validation passed");
    } else {
        println!("Schema validation failed:");
        for issue in &schema.issues {
            println!("  - {issue}");
        }
    }

    let data = validate_data(store);
    if data.is_valid() {
        println!("Data validation passed");
    } else {
        println!("Data validation warnings:");
        for issue in &data.issues {
            println!("  - {issue}");
        }
    }

    println!("{}", "-".repeat(60));
    let ok = schema.is_valid() && data.is_valid();
    info!("event=cli_validate module=cli status={}", if ok { "ok" } else { "error" });
    if ok {
        println!("Database validation successful!");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Database validation found issues.");
        Ok(ExitCode::FAILURE)
    }
}

fn health(store: &Store) -> CliResult {
    let report = health_check(store);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.status == HealthStatus::Unhealthy {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn stats(store: &Store) -> CliResult {
    let system = system_stats(store)?;
    let context = ContextService::new(store.clone()).context_stats()?;
    let out = serde_json::json!({
        "system": system,
        "context": context,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(ExitCode::SUCCESS)
}

fn cleanup(store: &Store, args: CleanupArgs) -> CliResult {
    let context = ContextService::new(store.clone());
    let expired_context = context.cleanup_expired_contexts()?;
    let old_actions = context.cleanup_old_actions(args.days)?;
    let expired_state = AgentBrain::new(store.clone()).cleanup_expired_agent_state()?;

    println!("Removed {expired_context} expired context entries");
    println!("Removed {old_actions} completed actions older than {} days", args.days);
    println!("Removed {expired_state} expired agent state entries");
    Ok(ExitCode::SUCCESS)
}

fn sync_rules(store: &Store, args: SyncRulesArgs) -> CliResult {
    let workspace_id = resolve_workspace(store, args.workspace.as_deref())?;
    let rules = RuleService::new(store.clone());

    if args.to_files {
        let report = rules.sync_rules_to_dir(workspace_id, &args.dir, args.dry_run)?;
        let verb = if report.dry_run { "Would write" } else { "Wrote" };
        for file in &report.files {
            println!("{verb} {}", args.dir.join(file).display());
        }
        println!("{verb} {} rule file(s)", report.files.len());
    } else if args.dry_run {
        println!(
            "Dry run: would import rule files from {}",
            args.dir.display()
        );
    } else {
        let imported = rules.import_rules_from_dir(workspace_id, &args.dir)?;
        println!("Imported {imported} rule file(s) from {}", args.dir.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn resolve_workspace(store: &Store, name: Option<&str>) -> Result<Option<WorkspaceId>, Box<dyn Error>> {
    let Some(name) = name else {
        return Ok(None);
    };
    match WorkspaceService::new(store.clone()).get_workspace_by_name(name)? {
        Some(workspace) => Ok(Some(workspace.id)),
        None => Err(format!("workspace not found: {name}").into()),
    }
}
