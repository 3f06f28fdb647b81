pub mod task_routes;
pub mod tenant_routes;

use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn app(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any) // Restrict to specific origins in production
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    let api = Router::new()
        // Tenants
        .route(
            "/tenants",
            get(tenant_routes::list_tenants).post(tenant_routes::create_tenant),
        )
        .route("/tenants/resolve", get(tenant_routes::resolve_tenant))
        .route(
            "/tenants/{id}",
            get(tenant_routes::get_tenant).patch(tenant_routes::update_tenant),
        )
        .route(
            "/tenants/{id}/deactivate",
            post(tenant_routes::deactivate_tenant),
        )
        // Task creation
        .route("/bulk-content", post(task_routes::bulk_content))
        .route("/generate", post(task_routes::generate_content))
        .route("/clone", post(task_routes::clone_site))
        // Task / batch reads
        .route("/tasks/{id}", get(task_routes::get_task))
        .route("/batch/{id}/progress", get(task_routes::batch_progress))
        .route("/batch/{id}/cancel", post(task_routes::cancel_batch))
        .with_state(state);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "siteforge"
    }))
}
