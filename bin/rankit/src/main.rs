//! # RankIt Binary
//!
//! The entry point that assembles the application based on compile-time features.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use rk_api::{configure_routes, middleware, AppState};
use rk_config::Settings;
use rk_core::{AccountService, RankService};
use secrecy::ExposeSecret;

// Feature-gated imports: each port needs exactly one adapter compiled in
#[cfg(feature = "db-sqlite")]
use rk_db_sqlite::SqliteRankRepo;

#[cfg(feature = "storage-local")]
use rk_storage_local::LocalMediaStore;

#[cfg(feature = "auth-simple")]
use rk_auth_simple::SimpleAuthProvider;

#[cfg(not(feature = "db-sqlite"))]
compile_error!("no database adapter selected; enable the `db-sqlite` feature");

#[cfg(not(feature = "storage-local"))]
compile_error!("no media adapter selected; enable the `storage-local` feature");

#[cfg(not(feature = "auth-simple"))]
compile_error!("no auth adapter selected; enable the `auth-simple` feature");

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let settings = Settings::load().context("failed to load settings")?;

    // 1. Initialize Database Implementation
    let repo = Arc::new(
        SqliteRankRepo::new(settings.database.url.expose_secret(), settings.database.max_connections)
            .await
            .context("failed to open the database")?,
    );

    // 2. Initialize Storage Implementation
    tokio::fs::create_dir_all(&settings.media.root)
        .await
        .with_context(|| format!("failed to create {}", settings.media.root.display()))?;
    let media = Arc::new(LocalMediaStore::new(
        settings.media.root.clone(),
        settings.media.url_prefix.clone(),
    ));

    // 3. Initialize Auth Implementation
    let auth = Arc::new(SimpleAuthProvider::new());

    // 4. Wrap in AppState; adapters are built once and shared by every worker
    let state = web::Data::new(AppState {
        ranking: RankService::new(repo.clone()),
        accounts: AccountService::new(repo, auth),
        media: media.clone(),
        max_upload_bytes: settings.media.max_upload_bytes,
    });

    let (host, port) = settings.bind_address();
    let allowed_origin = settings.cors.allowed_origin.clone();
    let url_prefix = settings.media.url_prefix.clone();
    let media_root = media.root().to_path_buf();

    log::info!("RankIt starting on http://{host}:{port}");

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::security_headers())
            .wrap(middleware::cors_policy(allowed_origin.as_deref()))
            .wrap(middleware::standard_middleware())
            .service(actix_files::Files::new(&url_prefix, &media_root))
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("failed to bind {host}:{port}"))?;

    if let Some(workers) = settings.server.workers {
        server = server.workers(workers);
    }

    server.run().await?;
    Ok(())
}
