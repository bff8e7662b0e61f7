use actix_web::{error::InternalError, web, HttpResponse};

use crate::models::{AuthRequest, AuthResponse};
use crate::state::AppState;

/// Verify a client's ID token
///
/// Endpoint: POST /auth
pub async fn authenticate(
    state: web::Data<AppState>,
    body: web::Json<AuthRequest>,
) -> HttpResponse {
    match state.gate.verify_token(&body.token).await {
        Ok(identity) => HttpResponse::Ok().json(AuthResponse::verified(identity)),
        Err(e) => HttpResponse::Unauthorized().json(AuthResponse::rejected(e.to_string())),
    }
}

/// Malformed bodies get the same `{success, error}` shape as rejections
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        tracing::debug!(error = %message, "Malformed auth request");
        InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(AuthResponse::rejected(message)),
        )
        .into()
    })
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/auth")
            .app_data(json_config())
            .route(web::post().to(authenticate)),
    );
}
