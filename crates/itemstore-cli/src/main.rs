//! Itemstore CLI - Command line access to an item store

mod json;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use itemstore_engine::{
    PersistenceConfig, PersistenceError, PersistenceService, QueryRequest, Tuple,
};
use itemstore_model::{ItemRef, TypeDescriptor, TypeRegistry, Value};
use itemstore_query::{ParseError, SelectList, Statement};

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG: &str = "itemstore.toml";

#[derive(Parser)]
#[command(name = "itemstore")]
#[command(about = "Store, load and query items", long_about = None)]
struct Cli {
    /// Storage configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Type descriptors (TOML or JSON with a `types` list)
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop all stored items and recreate storage structures
    Init,
    /// Save a new item from a JSON object
    Put {
        /// Type name or code
        type_name: String,
        /// Property values, e.g. '{"name": "Ada", "age": 36}'
        document: String,
    },
    /// Print one item
    Get { type_name: String, id: u64 },
    /// Print every item whose properties match all filters
    Find {
        type_name: String,
        /// Filters of the form key=value
        filters: Vec<String>,
    },
    /// Run a query statement
    Query {
        /// e.g. "SELECT * FROM user WHERE age > 30 ORDER BY name"
        statement: String,
        #[arg(long, default_value_t = 0)]
        page: usize,
        /// Items per page; 0 returns everything
        #[arg(long, default_value_t = 0)]
        page_size: usize,
        /// Load every related item along with the results
        #[arg(long)]
        eager_all: bool,
    },
    /// Remove one item
    Remove { type_name: String, id: u64 },
    /// Show record counts per type
    Stats,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("{0}")]
    Usage(String),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid schema file {path}: {reason}")]
    Schema { path: PathBuf, reason: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Already reported to stderr
    #[error("query could not be parsed")]
    Reported,
}

#[derive(Deserialize)]
struct SchemaFile {
    #[serde(default)]
    types: Vec<TypeDescriptor>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Reported) => ExitCode::FAILURE,
        Err(CliError::Persistence(e)) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;
    let registry = load_schema(cli.schema.as_deref())?;
    let service = PersistenceService::open(&config, registry)?;

    match cli.command {
        Commands::Init => cmd_init(&service),
        Commands::Put {
            type_name,
            document,
        } => cmd_put(&service, &type_name, &document),
        Commands::Get { type_name, id } => {
            let def = service.registry().lookup(&type_name).map_err(PersistenceError::from)?;
            let item = service.get(def.type_code(), id)?;
            print_json(&json::item_to_json(&item))
        }
        Commands::Find { type_name, filters } => cmd_find(&service, &type_name, &filters),
        Commands::Query {
            statement,
            page,
            page_size,
            eager_all,
        } => cmd_query(&service, &statement, page, page_size, eager_all),
        Commands::Remove { type_name, id } => {
            let def = service.registry().lookup(&type_name).map_err(PersistenceError::from)?;
            service.remove_by_pk(def.type_code(), id)?;
            println!("Removed {}:{}", def.type_code(), id);
            Ok(())
        }
        Commands::Stats => {
            print!("{}", service.stats()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PersistenceConfig, CliError> {
    match path {
        Some(path) => Ok(PersistenceConfig::load(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(PersistenceConfig::load(DEFAULT_CONFIG)?),
        None => {
            tracing::warn!("No configuration given; items are kept in memory only");
            Ok(PersistenceConfig::memory())
        }
    }
}

fn load_schema(path: Option<&Path>) -> Result<TypeRegistry, CliError> {
    let Some(path) = path else {
        return Ok(TypeRegistry::new());
    };
    let contents = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let invalid = |reason: String| CliError::Schema {
        path: path.to_path_buf(),
        reason,
    };
    let file: SchemaFile = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?,
        _ => toml::from_str(&contents).map_err(|e| invalid(e.to_string()))?,
    };
    tracing::debug!("Loaded {} type descriptors from {}", file.types.len(), path.display());
    Ok(TypeRegistry::from_descriptors(file.types).map_err(PersistenceError::from)?)
}

fn cmd_init(service: &PersistenceService) -> Result<(), CliError> {
    service.initialize_schema()?;
    println!(
        "Initialized {} type(s) on {}",
        service.registry().len(),
        service.backend()
    );
    Ok(())
}

fn cmd_put(service: &PersistenceService, type_name: &str, document: &str) -> Result<(), CliError> {
    let def = service.registry().lookup(type_name).map_err(PersistenceError::from)?;
    let document: serde_json::Value = serde_json::from_str(document)?;
    let item = service.create(def.type_code())?;
    for (name, value) in json::properties_from_json(def, &document)? {
        item.set(&name, value).map_err(PersistenceError::from)?;
    }
    service.save(&item)?;
    print_json(&json::item_to_json(&item))
}

fn cmd_find(service: &PersistenceService, type_name: &str, filters: &[String]) -> Result<(), CliError> {
    let def = service.registry().lookup(type_name).map_err(PersistenceError::from)?;
    let filter: BTreeMap<String, Value> = filters
        .iter()
        .map(|f| json::filter_entry(def, f))
        .collect::<Result<_, _>>()?;
    let items = service.find(def.type_code(), &filter)?;
    print_json(&items.iter().map(json::item_to_json).collect())
}

fn cmd_query(
    service: &PersistenceService,
    statement: &str,
    page: usize,
    page_size: usize,
    eager_all: bool,
) -> Result<(), CliError> {
    let parsed = match itemstore_query::parse(statement) {
        Ok(parsed) => parsed,
        Err(e) => {
            report_parse_error(statement, &e);
            return Err(CliError::Reported);
        }
    };

    let mut request = QueryRequest::statement(statement).page(page, page_size);
    if eager_all {
        request = request.eager_all();
    }

    let output = match parsed {
        Statement::Select(select) if select.projection == SelectList::Star => {
            let result = service.query::<ItemRef>(&request)?;
            serde_json::json!({
                "page": result.page,
                "pageSize": result.page_size,
                "totalCount": result.total_count,
                "results": result.results.iter().map(json::item_to_json).collect::<Vec<_>>(),
            })
        }
        Statement::Select(_) => {
            let result = service.query::<Tuple>(&request)?;
            serde_json::json!({
                "page": result.page,
                "pageSize": result.page_size,
                "totalCount": result.total_count,
                "results": result.results.iter().map(json::tuple_to_json).collect::<Vec<_>>(),
            })
        }
        Statement::Update(_) | Statement::Delete(_) => {
            let result = service.query::<Tuple>(&request)?;
            serde_json::json!({ "affected": result.total_count })
        }
    };
    print_json(&output)
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_parse_error(source: &str, error: &ParseError) {
    let span = error.span();
    let printed = Report::build(ReportKind::Error, "query", span.start)
        .with_message(error.to_string())
        .with_label(
            Label::new(("query", span.start..span.end))
                .with_message(error.to_string())
                .with_color(Color::Red),
        )
        .finish()
        .eprint(("query", Source::from(source)));
    if printed.is_err() {
        eprintln!("Parse error: {}", error);
    }
}
