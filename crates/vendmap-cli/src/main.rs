mod machines;
mod photos;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vendmap_core::{AppConfig, Category, OperatingStatus};
use vendmap_db::PgStore;
use vendmap_media::{HttpBlobStore, ImagePipeline, RasterCodec};
use vendmap_sync::WriteGateway;

#[derive(Debug, Parser)]
#[command(name = "vendmap")]
#[command(about = "Vending machine map registry")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Follow the registry and print the filtered view on every change
    Watch {
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        status: Option<OperatingStatus>,
    },
    /// Print the current registry once
    List {
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        status: Option<OperatingStatus>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List machines nearest to a point
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Maximum number of machines to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Register a machine, optionally with a photo
    Add {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long)]
        description: String,
        /// beverage, food, ice, tobacco, multi-purpose or other
        #[arg(long)]
        category: String,
        /// operating, under-maintenance or out-of-order
        #[arg(long, default_value = "operating")]
        status: String,
        /// cash, card, electronic-money or qr-code; repeat for several
        #[arg(long = "payment", required = true)]
        payment_methods: Vec<String>,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Upload a photo and attach it to an existing machine
    AttachPhoto { id: String, photo: PathBuf },
    /// Delete a machine record
    Delete { id: String },
    /// Delete a stored image by public URL or storage path
    DeleteImage { url: String },
    /// Print the GPS location embedded in an image file
    Geotag { photo: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Watch { category, status } => {
            let store = connect_store(&config).await?;
            registry::run_watch(store, &config.collection, category, status).await?;
        }
        Commands::List {
            category,
            status,
            json,
        } => {
            let store = connect_store(&config).await?;
            registry::run_list(store.as_ref(), &config.collection, category, status, json)
                .await?;
        }
        Commands::Nearby { lat, lon, limit } => {
            let store = connect_store(&config).await?;
            registry::run_nearby(store.as_ref(), &config.collection, lat, lon, limit).await?;
        }
        Commands::Add {
            lat,
            lon,
            description,
            category,
            status,
            payment_methods,
            photo,
        } => {
            let store = connect_store(&config).await?;
            let gateway = WriteGateway::new(store, config.collection.clone());
            let pipeline = match photo {
                Some(_) => Some(build_pipeline(&config)?),
                None => None,
            };
            let draft = vendmap_core::MachineDraft {
                latitude: lat,
                longitude: lon,
                description,
                category,
                status,
                payment_methods,
            };
            machines::run_add(&gateway, pipeline.as_ref(), draft, photo.as_deref()).await?;
        }
        Commands::AttachPhoto { id, photo } => {
            let store = connect_store(&config).await?;
            let gateway = WriteGateway::new(store, config.collection.clone());
            let pipeline = build_pipeline(&config)?;
            photos::run_attach_photo(&gateway, &pipeline, &id, &photo).await?;
        }
        Commands::Delete { id } => {
            let store = connect_store(&config).await?;
            let gateway = WriteGateway::new(store, config.collection.clone());
            machines::run_delete(&gateway, &id).await?;
        }
        Commands::DeleteImage { url } => {
            let pipeline = build_pipeline(&config)?;
            photos::run_delete_image(&pipeline, &url).await?;
        }
        Commands::Geotag { photo } => photos::run_geotag(&photo).await?,
    }

    Ok(())
}

/// Read `.env` once, then build the configuration from the process
/// environment. Variables already set take precedence over the file.
fn load_config() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();
    Ok(vendmap_core::load_app_config_from_env()?)
}

/// Connect to Postgres, apply pending migrations and wrap the pool as a store.
async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<PgStore>> {
    let database_url = config.require_database_url()?;
    let pool_config = vendmap_db::PoolConfig::from_app_config(config);
    let pool = vendmap_db::connect_pool(database_url, pool_config)
        .await
        .context("failed to connect to database")?;
    let applied = vendmap_db::run_migrations(&pool).await?;
    tracing::debug!(applied, "migrations checked");
    Ok(Arc::new(PgStore::new(pool)))
}

fn build_pipeline(config: &AppConfig) -> anyhow::Result<ImagePipeline> {
    let bucket = config.require_storage_bucket()?;
    let blobs = HttpBlobStore::with_base_url(
        &config.storage_base_url,
        bucket,
        config.storage_token.clone(),
        config.storage_timeout_secs,
    )?;
    Ok(ImagePipeline::from_app_config(
        Arc::new(blobs),
        Arc::new(RasterCodec),
        config,
    ))
}

#[cfg(test)]
mod tests;
