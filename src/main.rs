use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use workshop_screening::storage::FileFormat;
use workshop_screening::{build_router, config, db, state, storage};

#[derive(Parser)]
#[command(name = "workshop-screening", version, about = "Workshop submission peer review screening")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reviewer and admin web panels (default)
    Serve,
    /// Create the database tables and exit
    Migrate,
    /// Append submissions from a CSV or Parquet file
    ImportSources { path: PathBuf },
    /// Append reviewers from a CSV or Parquet file
    ImportReviewers { path: PathBuf },
    /// Write every review response to a file
    ExportResponses {
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = FileFormat::Csv)]
        format: FileFormat,
    },
}

/// Reads an import file as CSV, converting `.parquet` files.
fn read_import(path: &Path) -> anyhow::Result<Vec<u8>> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let format = FileFormat::from_file_name(&path.to_string_lossy());
    Ok(storage::import_csv(data, format)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workshop_screening=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::Config::from_env()?;

    storage::ensure_dirs(&config.database_url)
        .with_context(|| format!("creating directory for {}", config.database_url))?;

    let pool = db::create_pool(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("opening database {}", config.database_url))?;
    db::run_migrations(pool.as_ref()).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await?,
        Command::Migrate => tracing::info!("Database is up to date"),
        Command::ImportSources { path } => {
            let data = read_import(&path)?;
            let count = storage::transfer::import_sources(pool.as_ref(), data.as_slice()).await?;
            println!("Imported {} sources from {}", count, path.display());
        }
        Command::ImportReviewers { path } => {
            let data = read_import(&path)?;
            let count = storage::transfer::import_reviewers(pool.as_ref(), data.as_slice()).await?;
            println!("Imported {} reviewers from {}", count, path.display());
        }
        Command::ExportResponses { path, format } => {
            let responses = db::all_responses(pool.as_ref()).await?;
            let body = storage::transfer::responses_bytes(&responses, format)?;
            std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
            println!(
                "Wrote {} responses to {} as {}",
                responses.len(),
                path.display(),
                format.extension()
            );
        }
    }

    Ok(())
}

async fn serve(pool: db::DbPool, config: config::Config) -> anyhow::Result<()> {
    if config.reviewer_password.is_none() {
        tracing::warn!("WORKSHOP_LEVEL_1 is not set; the reviewer panel cannot be opened");
    }
    if config.admin_password.is_none() {
        tracing::warn!("WORKSHOP_LEVEL_0 is not set; the admin panel cannot be opened");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(state::AppState::new(pool, config));
    let app = build_router(state);

    tracing::info!("Workshop screening listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
