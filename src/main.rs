use anyhow::{Context, Result};
use media_gate::{
    AppState,
    config::{AppConfig, Mode},
    services::{
        access_gate::SqliteAccessGate,
        media_lookup::SqliteMediaLookup,
        signing::{Expiration, LinkSigner},
        urls::MediaUrls,
    },
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    // Signing needs neither the database nor the listener.
    if let Mode::Sign {
        access,
        id,
        minutes,
    } = mode
    {
        let signer = Arc::new(LinkSigner::new(
            cfg.signing_secret.as_bytes(),
            cfg.default_ttl_minutes,
        ));
        let expiration = minutes.map_or(Expiration::Default, Expiration::Minutes);
        let url = MediaUrls::new(&cfg, signer).signed_url(access, id, expiration)?;
        println!("{}", url);
        return Ok(());
    }

    tracing::info!(
        addr = %cfg.addr(),
        storage_dir = %cfg.storage_dir,
        require_auth = cfg.require_auth,
        strict = cfg.strict,
        signed_enabled = cfg.signed_enabled,
        "starting media-gate"
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // Create parent directory if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("{}?mode=rwc", db_url.split('?').next().unwrap_or(db_url)))
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );

    // --- Handle migration mode ---
    if mode == Mode::Migrate {
        run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize collaborators + pipeline ---
    let lookup = Arc::new(SqliteMediaLookup::new(db.clone(), cfg.storage_dir.clone()));
    let gate = Arc::new(SqliteAccessGate::new(db));
    let port = cfg.port;
    let host = cfg.host.clone();
    let addr = cfg.addr();
    let state = AppState::new(cfg, lookup, gate)?;

    // --- Build router ---
    let app = media_gate::app(state);

    // --- Start server ---
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run SQLite migrations manually from the embedded SQL file.
async fn run_migrations(db: &Arc<sqlx::Pool<sqlx::Sqlite>>) -> Result<()> {
    let sql = include_str!("../migrations/0001_init.sql");
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(&**db).await?;
    }

    Ok(())
}
