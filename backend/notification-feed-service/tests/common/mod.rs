use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use actix_web::{dev::ServerHandle, web, App, HttpServer};
use async_trait::async_trait;
use notification_feed_service::config::{AuthPolicy, FeedConfig};
use notification_feed_service::error::AuthError;
use notification_feed_service::handlers;
use notification_feed_service::models::VerifiedIdentity;
use notification_feed_service::services::IdentityVerifier;
use notification_feed_service::store::SnapshotSource;
use notification_feed_service::AppState;

pub const VALID_TOKEN: &str = "valid-token";
pub const VALID_UID: &str = "user-123";

/// Accepts exactly one token
pub struct StaticVerifier;

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        match token {
            VALID_TOKEN => Ok(VerifiedIdentity {
                uid: VALID_UID.to_string(),
            }),
            "expired-token" => Err(AuthError::Expired),
            _ => Err(AuthError::Rejected("invalid signature".to_string())),
        }
    }
}

pub fn app_state(source: Arc<dyn SnapshotSource>, policy: AuthPolicy) -> AppState {
    AppState::new(
        source,
        Arc::new(StaticVerifier),
        "notifications",
        FeedConfig::default(),
        policy,
    )
}

#[allow(dead_code)]
pub async fn start_feed_server(state: AppState) -> std::io::Result<(SocketAddr, ServerHandle)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::configure)
    })
    .workers(1)
    .disable_signals()
    .listen(listener)?
    .run();

    let handle = server.handle();
    actix_rt::spawn(server);
    Ok((addr, handle))
}

/// Poll `condition` until it holds or two seconds pass
#[allow(dead_code)]
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
