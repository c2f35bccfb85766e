//! Thin CLI wrapper around the Core API (spec §10.5), mirroring the
//! teacher's `src/bin/query.rs` argv-driven shape (one connection, a small
//! set of subcommands) but built on `clap` for real subcommand parsing
//! rather than hand-rolled `env::args()` matching.
//!
//! This binary is the out-of-scope-but-interface-adjacent CLI spec.md §1
//! names as an external collaborator; it demonstrates the Core API from §6
//! and is not a rebuild of the teacher's ActivityPub object-store commands.

use std::fs;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use quadstore::{Config, Engine, QueryOptions, QueryResult};

#[derive(Parser)]
#[command(name = "quadstore-cli", about = "RDF quad store / SPARQL CLI")]
struct Cli {
    /// Path to a TOML config file (spec §6 configuration table). Falls back
    /// to `QUADSTORE_*` environment overrides applied on top.
    #[arg(long, default_value = "quadstore.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a space (spec §4.4 `create_space`).
    CreateSpace { space_id: String },
    /// Drop a space and all its tables (spec §4.4 `drop_space`).
    DropSpace { space_id: String },
    /// List existing spaces.
    ListSpaces,
    /// Run a SPARQL SELECT/ASK/CONSTRUCT/DESCRIBE query read from a file.
    Query { space_id: String, file: String },
    /// Run a SPARQL Update request read from a file.
    Update { space_id: String, file: String },
}

fn load_config(path: &str) -> quadstore::EngineResult<Config> {
    let text = fs::read_to_string(path).map_err(|e| {
        quadstore::EngineError::StorageError(format!("reading config {path}: {e}"))
    })?;
    let mut config = Config::from_toml_str(&text)
        .map_err(|e| quadstore::EngineError::StorageError(format!("parsing config: {e}")))?;
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> quadstore::EngineResult<()> {
    let config = load_config(&cli.config)?;
    let engine = Engine::connect(config).await?;

    match cli.command {
        Command::CreateSpace { space_id } => {
            engine.create_space(&space_id).await?;
            println!("created space {space_id}");
        }
        Command::DropSpace { space_id } => {
            engine.drop_space(&space_id).await?;
            println!("dropped space {space_id}");
        }
        Command::ListSpaces => {
            for space in engine.list_spaces().await? {
                println!("{space}");
            }
        }
        Command::Query { space_id, file } => {
            let text = fs::read_to_string(&file).map_err(|e| {
                quadstore::EngineError::StorageError(format!("reading {file}: {e}"))
            })?;
            let result = engine
                .execute_query(&space_id, &text, &QueryOptions::default())
                .await?;
            print_result(result);
        }
        Command::Update { space_id, file } => {
            let text = fs::read_to_string(&file).map_err(|e| {
                quadstore::EngineError::StorageError(format!("reading {file}: {e}"))
            })?;
            let outcome = engine.execute_update(&space_id, &text).await?;
            println!(
                "inserted {} deleted {}",
                outcome.inserted, outcome.deleted
            );
        }
    }
    Ok(())
}

fn print_result(result: QueryResult) {
    match result {
        QueryResult::Bindings { vars, rows, truncated } => {
            println!("{}", vars.join("\t"));
            for row in rows {
                let cells: Vec<String> = row
                    .into_iter()
                    .map(|t| t.map(|t| t.to_string()).unwrap_or_default())
                    .collect();
                println!("{}", cells.join("\t"));
            }
            if truncated {
                eprintln!("(results truncated at max_rows)");
            }
        }
        QueryResult::Triples { triples } => {
            for quad in triples {
                println!("{} {} {} {}", quad.subject, quad.predicate, quad.object, quad.context);
            }
        }
        QueryResult::Boolean { value } => {
            println!("{value}");
        }
    }
}
