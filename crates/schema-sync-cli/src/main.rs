//! schema-sync CLI - Plan and apply schema synchronization.

use clap::{Parser, Subcommand};
use schema_sync::{
    CatalogReader, Config, DocumentCatalog, EntityRegistry, Orchestrator, Schema, SchemaApplier,
    SchemaDocument, SyncError, SyncMode, SyncResult,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-sync")]
#[command(about = "Synchronize database schemas with entity definitions")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report pending changes without applying them
    Check {
        /// Entity descriptor file (YAML or JSON)
        #[arg(long)]
        entities: PathBuf,

        /// Schema document describing the actual database
        #[arg(long)]
        actual: PathBuf,

        /// Restrict the run to these entities
        #[arg(long = "entity")]
        only: Vec<String>,
    },

    /// Apply pending changes to the actual schema document
    Update {
        /// Entity descriptor file (YAML or JSON)
        #[arg(long)]
        entities: PathBuf,

        /// Schema document describing the actual database
        #[arg(long)]
        actual: PathBuf,

        /// Restrict the run to these entities
        #[arg(long = "entity")]
        only: Vec<String>,

        /// Save the updated schema back to the actual document
        #[arg(long)]
        write: bool,
    },

    /// Plan a new database from the entity definitions
    Create {
        /// Entity descriptor file (YAML or JSON)
        #[arg(long)]
        entities: PathBuf,

        /// Write the created schema document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Normalize a schema document (deduplicate names, assign ordinals)
    Fixup {
        /// Schema document to normalize
        document: PathBuf,

        /// Rewrite the document in place instead of printing it
        #[arg(long)]
        write: bool,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(SyncError::Config)?;

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    match cli.command {
        Commands::Check {
            entities,
            actual,
            only,
        } => {
            config.sync.mode = SyncMode::Check;
            apply_entity_filter(&mut config, only)?;

            let catalog = DocumentCatalog::from_path(&actual)?;
            let mut executor = SchemaApplier::new(Schema::new());
            let result = run_sync(config, &entities, &catalog, &mut executor)?;
            print_result(&result, cli.output_json)?;
        }

        Commands::Update {
            entities,
            actual,
            only,
            write,
        } => {
            config.sync.mode = SyncMode::Update;
            apply_entity_filter(&mut config, only)?;

            let catalog = DocumentCatalog::from_path(&actual)?;
            let mut executor = SchemaApplier::new(catalog.document().to_schema()?);
            let result = run_sync(config, &entities, &catalog, &mut executor)?;
            print_result(&result, cli.output_json)?;

            if write && result.units_applied > 0 {
                SchemaDocument::from_schema(&executor.into_schema()).save(&actual)?;
                info!("Updated schema document {:?}", actual);
            }
        }

        Commands::Create { entities, output } => {
            config.sync.mode = SyncMode::Create;

            let catalog = schema_sync::EmptyCatalog;
            let mut executor = SchemaApplier::new(Schema::new());
            let result = run_sync(config, &entities, &catalog, &mut executor)?;

            let document = SchemaDocument::from_schema(&executor.into_schema());
            match output {
                Some(path) => {
                    document.save(&path)?;
                    info!("Wrote schema document {:?}", path);
                    print_result(&result, cli.output_json)?;
                }
                None if cli.output_json => print_result(&result, true)?,
                None => print!("{}", document.to_yaml()?),
            }
        }

        Commands::Fixup { document, write } => {
            let schema = SchemaDocument::load(&document)?.to_schema()?;
            let normalized = SchemaDocument::from_schema(&schema);
            if write {
                normalized.save(&document)?;
                info!("Rewrote {:?} ({} tables)", document, schema.tables().len());
            } else if cli.output_json {
                println!("{}", normalized.to_json()?);
            } else {
                print!("{}", normalized.to_yaml()?);
            }
        }
    }

    Ok(())
}

fn apply_entity_filter(config: &mut Config, only: Vec<String>) -> Result<(), SyncError> {
    if !only.is_empty() {
        config.sync.entities = only;
        config.validate()?;
    }
    Ok(())
}

fn run_sync(
    config: Config,
    entities: &Path,
    catalog: &dyn CatalogReader,
    executor: &mut SchemaApplier,
) -> Result<SyncResult, SyncError> {
    let registry = EntityRegistry::load(entities)?;
    info!("Loaded {} entities from {:?}", registry.len(), entities);

    let mut orchestrator = Orchestrator::new(config, registry);
    orchestrator.run(catalog, executor)
}

fn print_result(result: &SyncResult, as_json: bool) -> Result<(), SyncError> {
    if as_json {
        println!("{}", result.to_json()?);
        return Ok(());
    }

    for step in &result.steps {
        if step.up_to_date {
            println!("{}: up to date", step.name);
            continue;
        }
        println!("{}:", step.name);
        for message in &step.messages {
            println!("  - {}", message);
        }
    }

    if result.is_up_to_date {
        println!("Schema is up to date");
    } else if result.mode == SyncMode::Check {
        println!("{} work units pending", result.units_planned);
    } else {
        println!("{} work units applied", result.units_applied);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for documents and JSON results.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().try_init().map_err(|e| e.to_string())?;
    } else {
        subscriber.try_init().map_err(|e| e.to_string())?;
    }

    Ok(())
}
