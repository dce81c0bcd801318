//! docstore operator CLI
//!
//! Works directly on a JSON file store:
//! - Record operations (insert, get, find, update, delete)
//! - Maintenance (sweep archived records, rebuild indexes)
//! - Effective configuration dump
//!
//! # Examples
//!
//! ```bash
//! # Insert a note, keeping a unique index on its slug
//! docstore insert --table notes --index slug_idx:slug:unique '{"slug": "groceries", "title": "Groceries"}'
//!
//! # Adults, oldest first
//! docstore find --table users --query '{"where": {"age": {"$gte": 18}}, "orderBy": {"column": "age", "direction": "DESC"}}'
//!
//! # Drop notes archived for more than 30 days
//! docstore sweep --table notes --days 30
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use docstore::query::{Filter, Operator};
use docstore::{
    Datum, DocumentModel, IndexDefinition, JsonFileBackend, ModelRegistry, QueryOptions, Record,
    RecordId, StoreConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// docstore - embedded document store
#[derive(Parser, Debug)]
#[command(name = "docstore")]
#[command(version = docstore::VERSION)]
#[command(about = "Embedded document store with secondary indexes", long_about = None)]
#[command(author = "Anton Feldmann <afeldman@lynqtech.com>")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON data file
    #[arg(
        long,
        global = true,
        default_value = "data/docstore.json",
        env = "DOCSTORE_DATA"
    )]
    data_file: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true, env = "DOCSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "DOCSTORE_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a record from a JSON object
    Insert {
        #[command(flatten)]
        table: TableArgs,
        /// Record as JSON
        record: String,
    },

    /// Fetch one record by id
    Get {
        #[command(flatten)]
        table: TableArgs,
        id: String,
    },

    /// Query records
    Find {
        #[command(flatten)]
        table: TableArgs,
        /// Query as JSON (`where`, `orderBy`, `limit`, `offset`)
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Merge a JSON patch into a record
    Update {
        #[command(flatten)]
        table: TableArgs,
        id: String,
        /// Patch as JSON
        patch: String,
    },

    /// Delete one record by id
    Delete {
        #[command(flatten)]
        table: TableArgs,
        id: String,
    },

    /// Delete archived records not modified for `days` days
    Sweep {
        #[command(flatten)]
        table: TableArgs,
        #[arg(long, default_value = "30")]
        days: u32,
    },

    /// Rebuild every index of a table from its records
    Reindex {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Print the effective configuration
    Config,
}

/// Table selection shared by record commands
#[derive(Args, Debug)]
struct TableArgs {
    /// Table name
    #[arg(short, long)]
    table: String,

    /// Index declaration, `name:field1,field2[:unique]` (repeatable)
    #[arg(long = "index", value_parser = parse_index)]
    indexes: Vec<IndexDefinition>,
}

fn parse_index(s: &str) -> Result<IndexDefinition, String> {
    let mut parts = s.split(':');
    let name = parts.next().filter(|n| !n.is_empty());
    let fields = parts.next().filter(|f| !f.is_empty());
    let (Some(name), Some(fields)) = (name, fields) else {
        return Err(format!("expected name:field1,field2[:unique], got '{}'", s));
    };

    let mut index = IndexDefinition::new(name, fields.split(',').map(str::trim));
    match parts.next() {
        None => {}
        Some("unique") => index = index.unique(),
        Some(other) => return Err(format!("unknown index flag '{}'", other)),
    }
    if parts.next().is_some() {
        return Err(format!("too many ':' in index declaration '{}'", s));
    }
    index.validate().map_err(|e| e.to_string())?;
    Ok(index)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let config = StoreConfig::load(cli.config.as_deref())?;
    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if let Some(parent) = cli.data_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let backend = Arc::new(JsonFileBackend::open(&cli.data_file).await?);
    let registry = ModelRegistry::new(backend, config);

    match cli.command {
        Commands::Insert { table, record } => {
            let model = open_model(&registry, table)?;
            let record = model.create(parse_record(&record)?).await?;
            print_record(&record)
        }
        Commands::Get { table, id } => {
            let model = open_model(&registry, table)?;
            match model.find_by_id(RecordId::from(id.clone())).await? {
                Some(record) => print_record(&record),
                None => Err(docstore::error::Error::NotFound(format!("{}:{}", model.table(), id)).into()),
            }
        }
        Commands::Find { table, query } => {
            let model = open_model(&registry, table)?;
            let options = match query {
                Some(query) => QueryOptions::from_json(&serde_json::from_str(&query)?)?,
                None => QueryOptions::default(),
            };
            let records = model.find_all(&options).await?;
            let json: Vec<serde_json::Value> = records.iter().map(Record::to_json).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Commands::Update { table, id, patch } => {
            let model = open_model(&registry, table)?;
            match model.update(RecordId::from(id.clone()), parse_record(&patch)?).await? {
                Some(record) => print_record(&record),
                None => Err(docstore::error::Error::NotFound(format!("{}:{}", model.table(), id)).into()),
            }
        }
        Commands::Delete { table, id } => {
            let model = open_model(&registry, table)?;
            let deleted = model.delete(RecordId::from(id)).await?;
            println!("{}", serde_json::json!({ "deleted": deleted }));
            Ok(())
        }
        Commands::Sweep { table, days } => {
            let model = open_model(&registry, table)?;
            let cutoff = chrono::Utc::now().timestamp_millis() - i64::from(days) * DAY_MILLIS;
            let filter = Filter::new()
                .eq("archived", true)
                .op("modified", Operator::Lt(Datum::from(cutoff)));
            let deleted = model.delete_where(&filter).await?;
            info!(table = %model.table(), deleted, days, "Swept archived records");
            println!("{}", serde_json::json!({ "deleted": deleted }));
            Ok(())
        }
        Commands::Reindex { table } => {
            let model = open_model(&registry, table)?;
            let records = model.rebuild_indexes().await?;
            println!("{}", serde_json::json!({ "reindexed": records }));
            Ok(())
        }
        Commands::Config => Ok(()),
    }
}

fn open_model(registry: &ModelRegistry, args: TableArgs) -> anyhow::Result<Arc<DocumentModel>> {
    Ok(registry.define_model(&args.table, args.indexes)?)
}

fn parse_record(json: &str) -> anyhow::Result<Record> {
    let value: serde_json::Value = serde_json::from_str(json).context("parsing JSON argument")?;
    Ok(Record::from_json(value)?)
}

fn print_record(record: &Record) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&record.to_json())?);
    Ok(())
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "docstore.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color)
                .pretty(),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index() {
        let index = parse_index("slug_idx:slug").unwrap();
        assert_eq!(index.fields, vec!["slug"]);
        assert!(!index.unique);

        let index = parse_index("pair_idx:a, b:unique").unwrap();
        assert_eq!(index.fields, vec!["a", "b"]);
        assert!(index.unique);

        assert!(parse_index("slug_idx").is_err());
        assert!(parse_index("slug_idx:slug:primary").is_err());
        assert!(parse_index("counter:n").is_err());
    }
}
