use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod client;
mod config;
mod db;
mod error;
mod ingest;
mod memory;
mod models;
mod query;
mod report;
mod server;
mod store;

use crate::client::api::ApiClient;
use crate::client::export::{self, ExportFormat};
use crate::client::prompt::{self, UserProfile};
use crate::config::{ClientConfig, ServerConfig};
use crate::db::PgStore;
use crate::error::AppError;
use crate::memory::MemoryStore;
use crate::server::AppState;
use crate::store::ScholarStore;

#[derive(Parser)]
#[command(name = "scholar-browser")]
#[command(about = "Browse, filter and shortlist research faculty for outreach", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scholar API
    Serve,
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import scholars from a JSON array
    Import {
        #[arg(long)]
        json: PathBuf,
        /// Clear the collection before importing
        #[arg(long)]
        replace: bool,
    },
    /// Generate a markdown relevance report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Interactive filter and paginate loop against a running API
    Browse,
    /// Print the distinct departments and positions
    Filters,
    /// Show one scholar in full
    Show { id: String },
    /// Add a scholar to the saved list
    Save { id: String },
    /// Remove a scholar from the saved list
    Unsave { id: String },
    /// List saved scholar ids
    Saved,
    /// Export the saved list
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Print an outreach prompt for a scholar
    Prompt {
        id: String,
        /// Use the text in this file verbatim from now on
        #[arg(long, conflicts_with = "stock")]
        custom: Option<PathBuf>,
        /// Switch back to the built-in template
        #[arg(long)]
        stock: bool,
    },
    /// Show or update the profile used in prompts
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        university: Option<String>,
        #[arg(long)]
        skills: Option<String>,
        #[arg(long)]
        interests: Option<String>,
        #[arg(long)]
        links: Option<String>,
    },
    /// Record that a scholar has been emailed
    MarkMailed { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = ServerConfig::from_env();
            let store = open_scholar_store(&config).await?;
            server::serve(AppState { store }, &config.address()).await?;
        }
        Commands::InitDb => {
            let store = connect(&ServerConfig::from_env()).await?;
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = connect(&ServerConfig::from_env()).await?;
            let inserted = db::import_records(store.pool(), &ingest::seed_records(), false).await?;
            println!("Seeded {inserted} scholars.");
        }
        Commands::Import { json, replace } => {
            let store = connect(&ServerConfig::from_env()).await?;
            let records = ingest::read_json(&json)?;
            let upserted = db::import_records(store.pool(), &records, replace).await?;
            println!("Imported {upserted} scholars from {}.", json.display());
        }
        Commands::Report { out } => {
            let store = open_scholar_store(&ServerConfig::from_env()).await?;
            let records = store.all().await?;
            let report = report::build_report(chrono::Local::now().date_naive(), &records);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Browse => {
            let config = ClientConfig::from_env();
            let api = ApiClient::new(&config.api_url)?;
            let store = client::open_store(&config)?;
            client::browse::run(&config, api, store).await?;
        }
        Commands::Filters => {
            let config = ClientConfig::from_env();
            let options = ApiClient::new(&config.api_url)?.filter_options().await?;
            println!("Departments:");
            for department in &options.departments {
                println!("- {department}");
            }
            println!("Positions:");
            for position in &options.positions {
                println!("- {position}");
            }
        }
        Commands::Show { id } => {
            let config = ClientConfig::from_env();
            let record = ApiClient::new(&config.api_url)?.get(&id).await?;
            let mut store = client::open_store(&config)?;
            client::browse::print_detail(&record);
            store.mark_copied(&record.id)?;
        }
        Commands::Save { id } => {
            let mut store = client::open_store(&ClientConfig::from_env())?;
            if !store.is_saved(&id) {
                store.toggle_saved(&id)?;
            }
            println!("{} saved scholars.", store.saved_ids().len());
        }
        Commands::Unsave { id } => {
            let mut store = client::open_store(&ClientConfig::from_env())?;
            if store.is_saved(&id) {
                store.toggle_saved(&id)?;
            }
            println!("{} saved scholars.", store.saved_ids().len());
        }
        Commands::Saved => {
            let store = client::open_store(&ClientConfig::from_env())?;
            let ids = store.saved_ids();
            if ids.is_empty() {
                println!("No saved scholars.");
            }
            for id in ids {
                let marks = [
                    (store.is_copied(&id), "copied"),
                    (store.is_prompt_copied(&id), "prompted"),
                    (store.is_mailed(&id), "mailed"),
                ]
                .into_iter()
                .filter_map(|(set, label)| set.then_some(label))
                .collect::<Vec<_>>();
                println!("- {id} {}", marks.join(" "));
            }
        }
        Commands::Export { format, dir } => {
            let config = ClientConfig::from_env();
            let store = client::open_store(&config)?;
            let records = ApiClient::new(&config.api_url)?
                .batch(&store.saved_ids())
                .await?;
            let path = export::write_export(
                &dir,
                format,
                &records,
                chrono::Local::now().date_naive(),
            )?;
            println!("Exported {} scholars to {}.", records.len(), path.display());
        }
        Commands::Prompt { id, custom, stock } => {
            let config = ClientConfig::from_env();
            let mut store = client::open_store(&config)?;
            if let Some(path) = custom {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                store.set_custom_prompt(text)?;
                store.set_use_custom_prompt(true)?;
            } else if stock {
                store.set_use_custom_prompt(false)?;
            }

            let record = ApiClient::new(&config.api_url)?.get(&id).await?;
            let text = prompt::full_prompt(&store.prompt_source(), store.profile(), &record)?;
            println!("{text}");
            store.mark_prompt_copied(&record.id)?;
        }
        Commands::Profile {
            name,
            major,
            year,
            university,
            skills,
            interests,
            links,
        } => {
            let mut store = client::open_store(&ClientConfig::from_env())?;
            let current = store.profile().clone();
            let updated = UserProfile {
                name: name.unwrap_or(current.name),
                major: major.unwrap_or(current.major),
                year: year.unwrap_or(current.year),
                university: university.unwrap_or(current.university),
                skills: skills.unwrap_or(current.skills),
                interests: interests.unwrap_or(current.interests),
                links: links.unwrap_or(current.links),
            };
            if &updated != store.profile() {
                store.set_profile(updated)?;
            }
            println!("{}", serde_json::to_string_pretty(store.profile())?);
        }
        Commands::MarkMailed { id } => {
            let mut store = client::open_store(&ClientConfig::from_env())?;
            store.mark_mailed(&id)?;
            println!("Marked {id} as mailed.");
        }
    }

    Ok(())
}

async fn connect(config: &ServerConfig) -> anyhow::Result<PgStore> {
    let database_url = config.require_database_url()?;
    PgStore::connect(database_url, config.max_connections).await
}

/// Postgres when `DATABASE_URL` is set, otherwise the static data file.
async fn open_scholar_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn ScholarStore>> {
    if let Some(database_url) = config.database_url.as_deref() {
        let store = PgStore::connect(database_url, config.max_connections).await?;
        info!("serving scholars from Postgres");
        return Ok(Arc::new(store));
    }

    match config.data_file.as_deref() {
        Some(path) => Ok(Arc::new(MemoryStore::from_file(path)?)),
        None => Err(AppError::Config(
            "set DATABASE_URL or SCHOLARS_DATA_FILE to serve scholars".to_string(),
        )
        .into()),
    }
}
