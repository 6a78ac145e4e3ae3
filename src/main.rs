use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use student_performance_ai::ai::GeminiConfig;
use student_performance_ai::store::bootstrap;
use student_performance_ai::{
    build_router, AppConfig, AppState, DisabledGenerator, GeminiClient, MemoryStore, PgStore,
    Store, TextGenerator, TokenSigner,
};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "student-performance-ai")]
#[command(about = "Student performance tracking API with AI grade prediction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo students and performance records
    Seed,
    /// Import performance records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Run the HTTP API
    Serve {
        /// Keep everything in process memory instead of Postgres
        #[arg(long)]
        memory: bool,
        /// Seed demo data before serving
        #[arg(long)]
        seed: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_generator(config: &AppConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let Some(api_key) = config.google_api_key.clone() else {
        warn!("GOOGLE_API_KEY not set; predictions and study plans use fallback rules");
        return Ok(Arc::new(DisabledGenerator));
    };
    let client = GeminiClient::new(GeminiConfig {
        endpoint: config.gemini_endpoint.clone(),
        model: config.gemini_model.clone(),
        api_key,
        timeout: config.ai_timeout,
    })
    .context("failed to build Gemini client")?;
    Ok(Arc::new(client))
}

async fn postgres_store(config: &AppConfig) -> anyhow::Result<PgStore> {
    let url = config.require_database_url()?;
    PgStore::connect(url, config.database_max_connections).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    init_tracing(config.log_json);

    match cli.command {
        Commands::InitDb => {
            postgres_store(&config).await?.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = postgres_store(&config).await?;
            let summary = bootstrap::seed(&store).await?;
            println!(
                "Seeded {} students and {} performance records.",
                summary.students, summary.records
            );
        }
        Commands::Import { csv } => {
            let store = postgres_store(&config).await?;
            let summary = bootstrap::import_csv(&store, &csv).await?;
            println!(
                "Inserted {} records from {} ({} rows skipped for unknown students).",
                summary.inserted,
                csv.display(),
                summary.unknown_students
            );
        }
        Commands::Serve { memory, seed } => {
            let store: Arc<dyn Store> = if memory {
                info!("using in-memory store");
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(postgres_store(&config).await?)
            };
            if seed {
                let summary = bootstrap::seed(store.as_ref()).await?;
                info!(
                    students = summary.students,
                    records = summary.records,
                    "seed data loaded"
                );
            }
            if !config.token_secret_configured {
                warn!("TOKEN_SECRET not set; using the development signing secret");
            }

            let state = AppState::new(
                store,
                build_generator(&config)?,
                TokenSigner::new(&config.token_secret, config.token_ttl_days),
                config.ai_timeout,
            )
            .with_cors_origins(config.cors_allowed_origins.clone());

            let addr = config.socket_addr()?;
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!(%addr, "server listening");
            axum::serve(listener, build_router(state))
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
                .context("server error")?;
        }
    }

    Ok(())
}
