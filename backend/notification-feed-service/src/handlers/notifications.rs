use actix_web::{web, HttpRequest, HttpResponse};

use crate::error::Result;
use crate::state::AppState;

/// Current contents of the notifications collection
///
/// Endpoint: GET /pack/notifs/submission-checker
pub async fn get_notifications(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if state.policy.snapshot_require_auth {
        state.gate.verify_request(&req).await?;
    }

    let snapshot = state.source.query(&state.collection).await.map_err(|e| {
        tracing::error!(collection = %state.collection, error = %e, "Snapshot query failed");
        e
    })?;

    Ok(HttpResponse::Ok().json(snapshot))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/pack/notifs/submission-checker",
        web::get().to(get_notifications),
    );
}
