use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use vitaledge_common::{logger, AppConfig, VectorId};
use vitaledge_vector::{StoredIndex, VectorIndex};

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "vitaledge")]
#[command(about = "VitalEdge - synchronized vector index and metadata store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Vector index file path
        #[arg(long)]
        index_path: Option<PathBuf>,

        /// SQLite metadata database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Print the contents of an index file without modifying it
    Dump {
        /// Index file (defaults to VECTOR_DB_PATH)
        #[arg(long)]
        index_path: Option<PathBuf>,

        /// Number of vectors to print
        #[arg(long, default_value = "5")]
        sample: usize,

        /// Comma-separated query; prints its nearest stored vector
        #[arg(long, value_delimiter = ',')]
        query: Option<Vec<f32>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // CLI overrides are applied as env vars, so .env must be loaded first
    load_dotenv_from_project_root();

    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            index_path,
            db_path,
        }) => {
            if let Some(host) = &host {
                std::env::set_var("SERVER_HOST", host);
            }
            if let Some(port) = port {
                std::env::set_var("SERVER_PORT", port.to_string());
            }
            if let Some(path) = &index_path {
                std::env::set_var("VECTOR_DB_PATH", path);
            }
            if let Some(path) = &db_path {
                std::env::set_var("SQLITE_DB_PATH", path);
            }

            serve(AppConfig::from_env()?).await
        }
        Some(Commands::Dump {
            index_path,
            sample,
            query,
        }) => {
            let path = match index_path {
                Some(path) => path,
                None => AppConfig::from_env()?.index_path,
            };
            dump(&path, sample, query.as_deref())
        }
        None => serve(AppConfig::from_env()?).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    logger::setup_logging(&config.log_dir, &config.log_level)?;

    tracing::info!("VitalEdge starting...");
    tracing::info!("Configuration loaded:");
    tracing::info!("  Bind: {}", config.server_bind_address());
    tracing::info!("  Embedding dimension: {}", config.embedding_dim);
    tracing::info!("  Index: {}", config.index_path.display());
    tracing::info!("  Metadata: {}", config.metadata_path.display());
    tracing::info!("  Rebuild delete: {}", config.allow_rebuild_delete);

    println!("Server listening on http://{}", config.server_bind_address());

    vitaledge_server::start_server(config).await?;
    Ok(())
}

fn dump(path: &Path, sample: usize, query: Option<&[f32]>) -> Result<()> {
    let stored = vitaledge_vector::restore(path)
        .with_context(|| format!("Failed to read index {}", path.display()))?;

    println!("Index: {}", path.display());
    println!("  Kind: {:?}", stored.kind());
    println!("  Dimension: {}", stored.dimension());
    println!("  Vectors: {}", stored.len());

    // A bare index is addressed by slot
    let index = match stored {
        StoredIndex::Mapped(index) => index,
        StoredIndex::Flat(flat) => {
            let dimension = flat.dimension();
            let vectors: Vec<Vec<f32>> = flat
                .as_array()
                .outer_iter()
                .map(|row| row.to_vec())
                .collect();
            let slots: Vec<VectorId> = (0..vectors.len() as VectorId).collect();

            let mut index = VectorIndex::new(dimension)?;
            index.add_with_ids(&vectors, &slots)?;
            index
        }
    };

    let snapshot = index.snapshot();
    for (id, vector) in snapshot.iter().take(sample) {
        let head: Vec<String> = vector.iter().take(4).map(|v| format!("{:.4}", v)).collect();
        let more = if vector.len() > 4 { ", ..." } else { "" };
        println!("  [{}] {}{}", id, head.join(", "), more);
    }

    if let Some(query) = query {
        let neighbor = index.nearest(query)?;
        println!("Nearest to query: id={} distance={:.6}", neighbor.id, neighbor.distance);
    }

    Ok(())
}
