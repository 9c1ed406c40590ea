use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cms_backend::{CmsBuilder, ContentStore, SqlMirror};

/// Content-management backend for the page editor.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "CMS_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Directory holding `uploads/` and `snapshots/`.
    #[arg(long, env = "CMS_STORAGE_ROOT", default_value = "storage")]
    storage_root: PathBuf,

    /// Store media and pages in this S3 bucket instead of the local disk.
    #[cfg(feature = "s3")]
    #[arg(long, env = "CMS_S3_BUCKET")]
    s3_bucket: Option<String>,

    /// Database for the page mirror, e.g. `mysql://root@localhost/cms`.
    #[arg(long, env = "CMS_DATABASE_URL")]
    database_url: Option<String>,

    /// Time allowed for opening a database connection.
    #[arg(long, env = "CMS_DB_CONNECT_TIMEOUT", default_value = "3s", value_parser = humantime::parse_duration)]
    db_connect_timeout: Duration,

    /// Largest accepted media file, in bytes.
    #[arg(long, env = "CMS_MAX_UPLOAD_SIZE", default_value_t = 5 * 1024 * 1024)]
    max_upload_size: u64,

    /// Directory for staging uploads. Defaults to the system temp directory.
    #[arg(long, env = "CMS_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// File extensions refused at upload time.
    #[arg(long = "block-extension", env = "CMS_BLOCK_EXTENSIONS", value_delimiter = ',')]
    block_extensions: Vec<String>,
}

fn finish<S: ContentStore>(mut builder: CmsBuilder<S>, args: &Args) -> Router {
    builder = builder.max_upload_size(args.max_upload_size);
    if let Some(dir) = &args.staging_dir {
        builder = builder.staging_dir(dir);
    }
    for ext in &args.block_extensions {
        builder = builder.block_extension(ext);
    }

    match &args.database_url {
        Some(url) => builder
            .mirror(SqlMirror::new(url).connect_timeout(args.db_connect_timeout))
            .build(),
        None => {
            tracing::warn!("No database configured; pages are stored on disk only");
            builder.build()
        }
    }
}

async fn app(args: &Args) -> Router {
    #[cfg(feature = "s3")]
    if let Some(bucket) = &args.s3_bucket {
        use cms_backend::S3Store;

        tracing::info!("Using S3 bucket {bucket}");
        let uploads = S3Store::from_env(bucket.as_str(), "storage/uploads").await;
        let snapshots = S3Store::from_env(bucket.as_str(), "storage/snapshots").await;
        return finish(CmsBuilder::new(uploads, snapshots), args);
    }

    tracing::info!("Using storage root {}", args.storage_root.display());
    finish(CmsBuilder::with_storage_root(&args.storage_root), args)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let app = app(&args).await.layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!("Listening on {}", args.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}
