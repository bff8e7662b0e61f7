/// HTTP and WebSocket routes
pub mod auth;
pub mod notifications;
pub mod websocket;

use actix_web::web;

use crate::metrics;

/// Register every route. The upgrade route goes first because it matches
/// any path carrying `Upgrade: websocket`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    websocket::register_routes(cfg);
    cfg.route("/health", web::get().to(|| async { "OK" }))
        .route("/metrics", web::get().to(metrics::serve_metrics));
    auth::register_routes(cfg);
    notifications::register_routes(cfg);
}
