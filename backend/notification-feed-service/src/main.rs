use actix_web::{web, App, HttpServer};
use anyhow::Context;
use nova_firebase_shared::{materialize_service_account, FirestoreClient, IdTokenVerifier};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use notification_feed_service::{
    handlers, logging, metrics,
    services::{ChangeRelay, FirebaseIdentityVerifier},
    store::FirestoreSnapshotSource,
    AppState, Config,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    logging::init_tracing(config.app.log_format);

    tracing::info!("Starting notification feed service");

    // Credentials must be on disk before any Firebase client exists
    let credentials = materialize_service_account(
        &config.firebase.credentials_b64,
        &config.firebase.credentials_path,
    )
    .await
    .context("failed to materialize Firebase credentials")?;

    let project_id = config
        .firebase
        .project_id
        .clone()
        .unwrap_or_else(|| credentials.project_id.clone());

    let firestore = FirestoreClient::new(credentials).with_project_id(project_id.clone());
    let source = Arc::new(FirestoreSnapshotSource::new(
        Arc::new(firestore),
        config.firebase.poll_interval,
    ));
    let verifier = Arc::new(FirebaseIdentityVerifier::new(IdTokenVerifier::new(
        project_id.clone(),
    )));
    tracing::info!(
        project_id = %project_id,
        collection = %config.firebase.collection,
        realtime_require_auth = config.auth.realtime_require_auth,
        snapshot_require_auth = config.auth.snapshot_require_auth,
        "Firebase clients initialized"
    );

    let state = AppState::new(
        source.clone(),
        verifier,
        config.firebase.collection.clone(),
        config.feed.clone(),
        config.auth,
    );

    let relay = ChangeRelay::new(
        source,
        state.broadcaster.clone(),
        config.firebase.collection.clone(),
        config.relay.clone(),
    )
    .spawn();

    let addr = config.bind_addr();
    tracing::info!("Starting HTTP server on {}", addr);

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(TracingLogger::default())
            .wrap(metrics::MetricsMiddleware)
            .configure(handlers::configure)
    })
    .disable_signals()
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run();

    let handle = server.handle();
    let registry = state.registry.clone();
    actix_rt::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");

        relay.stop().await;
        let closed = registry.close_all();
        tracing::info!("Closed {} feed connections", closed);

        handle.stop(true).await;
    });

    server.await.context("HTTP server error")?;
    tracing::info!("Notification feed service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
