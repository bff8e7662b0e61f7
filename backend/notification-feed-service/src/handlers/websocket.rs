use actix_web::guard::{self, GuardContext};
use actix_web::http::header::UPGRADE;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use crate::models::ErrorResponse;
use crate::state::AppState;
use crate::websocket::FeedSession;

/// Matches requests asking for a WebSocket upgrade, whatever the path
pub fn is_websocket_upgrade(ctx: &GuardContext<'_>) -> bool {
    ctx.head()
        .headers()
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Open a realtime feed connection
///
/// Endpoint: GET /{any path} with `Upgrade: websocket`
pub async fn feed_upgrade(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let uid = if state.policy.realtime_require_auth {
        match state.gate.verify_request(&req).await {
            Ok(identity) => Some(identity.uid),
            Err(e) => {
                tracing::debug!(error = %e, "Feed upgrade refused");
                return Ok(HttpResponse::Unauthorized().json(ErrorResponse {
                    error: e.to_string(),
                }));
            }
        }
    } else {
        None
    };

    let session = FeedSession::new(state.broadcaster.clone(), &state.feed, uid);
    ws::start(session, &req, stream)
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/{tail:.*}")
            .guard(guard::Get())
            .guard(guard::fn_guard(is_websocket_upgrade))
            .route(web::get().to(feed_upgrade)),
    );
}
