use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::state::AppState;
use crate::tenant::registry::{NewTenant, TenantUpdate};
use crate::tenant::Tenant;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateTenant {
    pub domain: String,
    pub display_name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateTenant {
    pub domain: Option<String>,
    pub display_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Deserialize)]
pub struct ResolveQuery {
    pub domain: String,
}

/// Registry failures carry their class in the message; translate to the
/// matching status instead of a blanket 500.
fn map_registry_error(e: anyhow::Error) -> AppError {
    let msg = e.to_string();
    if msg.contains("already registered") {
        AppError::Conflict(msg)
    } else if msg.contains("invalid domain") || msg.contains("must not be empty") {
        AppError::BadRequest(msg)
    } else if msg.contains("not found") {
        AppError::NotFound(msg)
    } else {
        AppError::Internal(e)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /tenants
pub async fn list_tenants(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Tenant>>, AppError> {
    let tenants = state.registry.list(&state.db)?;
    Ok(Json(tenants))
}

/// POST /tenants: onboard and physically provision a tenant.
pub async fn create_tenant(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTenant>,
) -> Result<Json<Tenant>, AppError> {
    let tenant = state
        .registry
        .create(
            &state.db,
            NewTenant {
                domain: body.domain,
                display_name: body.display_name,
                logo_url: body.logo_url,
                primary_color: body.primary_color,
                contact_email: body.contact_email,
            },
        )
        .map_err(map_registry_error)?;
    tracing::info!("tenant onboarded: {} ({})", tenant.domain, tenant.id);
    Ok(Json(tenant))
}

/// GET /tenants/resolve?domain=x, the routing lookup used by the serving edge.
pub async fn resolve_tenant(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<Tenant>, AppError> {
    state
        .registry
        .resolve(&state.db, &query.domain)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no active tenant for '{}'", query.domain)))
}

/// GET /tenants/{id}
pub async fn get_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Tenant>, AppError> {
    state
        .registry
        .get(&state.db, &id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("tenant {id} not found")))
}

/// PATCH /tenants/{id}
pub async fn update_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTenant>,
) -> Result<Json<Tenant>, AppError> {
    let tenant = state
        .registry
        .update(
            &state.db,
            &id,
            TenantUpdate {
                domain: body.domain,
                display_name: body.display_name,
                logo_url: body.logo_url,
                primary_color: body.primary_color,
                contact_email: body.contact_email,
            },
        )
        .map_err(map_registry_error)?;
    Ok(Json(tenant))
}

/// POST /tenants/{id}/deactivate: soft delete; the domain stops resolving.
pub async fn deactivate_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .registry
        .deactivate(&state.db, &id)
        .map_err(map_registry_error)?;
    tracing::info!("tenant deactivated: {}", id);
    Ok(Json(serde_json::json!({ "id": id, "is_active": false })))
}
