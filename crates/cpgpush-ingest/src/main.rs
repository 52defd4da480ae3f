//! CLI entry point for the cpgpush-ingest loader.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use cpgpush_core::SaveDepth;
use cpgpush_graph::{MemoryConnector, MemoryStore, Neo4jConnector};

use cpgpush_ingest::input::{read_translation_result, resolve_inputs};
use cpgpush_ingest::{ingest, IngestConfig};

#[derive(Parser)]
#[command(name = "cpgpush-ingest")]
#[command(about = "Load code property graph exports into Neo4j")]
struct Cli {
    /// Graph export files or directories of `*.json` exports.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Neo4j user.
    #[arg(long)]
    user: Option<String>,

    /// Neo4j password.
    #[arg(long)]
    password: Option<String>,

    /// Bolt URI, e.g. bolt://localhost:7687.
    #[arg(long)]
    uri: Option<String>,

    /// Target database (server default when unset).
    #[arg(long)]
    database: Option<String>,

    /// Relationship hops saved per node, -1 for unlimited.
    #[arg(long, allow_hyphen_values = true)]
    save_depth: Option<i64>,

    /// Keep existing database content.
    #[arg(long)]
    no_purge: bool,

    /// Purge inside the write transaction.
    #[arg(long)]
    atomic_purge: bool,

    /// Connection attempts before giving up.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Pause between connection attempts, in milliseconds.
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Config file prefix (default: cpgpush).
    #[arg(short, long, default_value = "cpgpush")]
    config: String,

    /// Load into an in-memory graph instead of Neo4j.
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let mut config = IngestConfig::load(&cli.config)?;
    apply_overrides(&cli, &mut config)?;

    let files = resolve_inputs(&cli.paths)?;
    let input = read_translation_result(&files)?;
    tracing::info!(
        files = files.len(),
        nodes = input.graph.len(),
        translation_units = input.translation_units.len(),
        "Read graph exports"
    );

    let options = config.load.clone();
    let report = if cli.dry_run {
        let connector = MemoryConnector::new(MemoryStore::new());
        ingest(&connector, &config.retry, &input, &options).await?
    } else {
        let connector = Neo4jConnector::new(config.neo4j.clone());
        ingest(&connector, &config.retry, &input, &options).await?
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn apply_overrides(cli: &Cli, config: &mut IngestConfig) -> anyhow::Result<()> {
    if let Some(user) = &cli.user {
        config.neo4j.user = user.clone();
    }
    if let Some(password) = &cli.password {
        config.neo4j.password = password.clone();
    }
    if let Some(uri) = &cli.uri {
        config.neo4j.uri = uri.clone();
    }
    if let Some(database) = &cli.database {
        config.neo4j.database = Some(database.clone());
    }
    if let Some(depth) = cli.save_depth {
        config.load.save_depth = SaveDepth::from_i64(depth)?;
    }
    if cli.no_purge {
        config.load.purge_before_load = false;
    }
    if cli.atomic_purge {
        config.load.purge_in_transaction = true;
    }
    if let Some(attempts) = cli.max_attempts {
        config.retry.max_attempts = attempts;
    }
    if let Some(ms) = cli.backoff_ms {
        config.retry.backoff = Duration::from_millis(ms);
    }
    Ok(())
}
