use std::path::Path;

use anyhow::Context;
use ideabridge_auth::Authenticator;
use ideabridge_chats::ConversationStore;
use ideabridge_config::load as load_config;
use ideabridge_gateway::{build_router, AppState};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::{fs, net::TcpListener, signal};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod migrations {
    pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../migrations");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("starting IdeaBridge backend");

    let config = load_config().context("failed to load configuration")?;

    if let Some(sqlite_path) = config.database.url.strip_prefix("sqlite://") {
        if sqlite_path != ":memory:" {
            let path = Path::new(sqlite_path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).await.with_context(|| {
                        format!("failed to create sqlite directory {}", parent.display())
                    })?;
                }
            }

            if !path.exists() {
                fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .open(path)
                    .await
                    .with_context(|| {
                        format!("failed to create sqlite database file {}", path.display())
                    })?;
            }
        }
    }

    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .with_context(|| format!("failed to connect to database {}", config.database.url))?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&db_pool)
        .await
        .context("failed to enable foreign keys for sqlite")?;

    migrations::MIGRATOR
        .run(&db_pool)
        .await
        .context("database migrations failed")?;

    let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());
    let store = ConversationStore::new(db_pool.clone());
    let state = AppState::new(authenticator, store);

    let app = build_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    info!("backend shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install terminate handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
