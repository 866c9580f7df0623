//! Admin HTTP API.
//!
//! Served on its own listener behind a bearer token. Per-tenant routes
//! live under `/admin/tenants/{id}`; network-wide views aggregate every
//! tenant in id order.

pub mod auth;
pub mod error;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub use error::AdminError;

pub fn setup_admin_router(state: AppState) -> Router {
    let tenant = Router::new()
        .route("/mappings", get(list_mappings).post(create_mapping))
        .route(
            "/mappings/{mid}",
            get(get_mapping).put(update_mapping).delete(delete_mapping),
        )
        .route("/mappings/{mid}/active", post(set_mapping_active))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/settings/redirect-domains", post(add_redirect_domain))
        .route("/settings/redirect-domains/{idx}", delete(remove_redirect_domain))
        .route("/statistics", get(list_statistics).delete(reset_statistics))
        .route("/statistics/summary", get(statistics_summary))
        .route("/statistics/{key}", delete(reset_statistic))
        .route("/logs", get(list_logs).delete(clear_logs))
        .route("/logs/prune", post(prune_logs))
        .route("/logs/{lid}", get(get_log));

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/network", get(get_network))
        .route("/admin/network/mappings", get(get_network_mappings))
        .route("/admin/network/statistics", get(get_network_statistics))
        .nest("/admin/tenants/{id}", tenant)
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
