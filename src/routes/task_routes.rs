use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppError;
use crate::generate::{self, ContentKind};
use crate::state::AppState;
use crate::tasks::{batch, ledger, ContentScope, Task, TaskPayload, TaskResult};
use crate::tenant::Tenant;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct BulkContentRequest {
    pub provider: String,
    /// `pages`, `posts`, `daily` or `all`.
    pub content_type: String,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_daily_count")]
    pub daily_count: u32,
    /// Defaults to every active tenant.
    #[serde(default)]
    pub tenant_ids: Option<Vec<String>>,
}

fn default_daily_count() -> u32 {
    5
}

#[derive(Serialize)]
pub struct BulkContentResponse {
    pub batch_id: String,
    pub tasks: Vec<BatchMember>,
}

#[derive(Serialize)]
pub struct BatchMember {
    pub task_id: i64,
    pub tenant_id: String,
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub tenant_id: String,
    pub provider: String,
    pub kind: ContentKind,
    pub topic: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Deserialize)]
pub struct CloneRequest {
    pub source_tenant_id: String,
    pub new_domain: String,
}

#[derive(Serialize)]
pub struct TaskView {
    pub id: i64,
    #[serde(rename = "type")]
    pub task_type: &'static str,
    pub status: &'static str,
    pub progress: u8,
    pub source_tenant_id: Option<String>,
    pub target_tenant_id: Option<String>,
    pub batch_id: Option<String>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Task> for TaskView {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            task_type: t.task_type.as_str(),
            status: t.status.as_str(),
            progress: t.progress,
            source_tenant_id: t.source_tenant_id,
            target_tenant_id: t.target_tenant_id,
            batch_id: t.batch_id,
            result: t.result,
            error: t.error_message,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct BatchTaskView {
    pub id: i64,
    /// Target tenant's domain when it still resolves, raw id otherwise.
    pub tenant: String,
    pub status: &'static str,
    pub progress: u8,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct BatchProgressResponse {
    #[serde(flatten)]
    pub summary: batch::BatchSummary,
    pub tasks: Vec<BatchTaskView>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn fetch_active_tenant(state: &AppState, id: &str) -> Result<Tenant, AppError> {
    let tenant = state
        .registry
        .get(&state.db, id)?
        .ok_or_else(|| AppError::NotFound(format!("tenant {id} not found")))?;
    if !tenant.is_active {
        return Err(AppError::BadRequest(format!(
            "tenant '{}' is deactivated",
            tenant.domain
        )));
    }
    Ok(tenant)
}

/// POST /bulk-content: one task per tenant, correlated by a shared batch id.
pub async fn bulk_content(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkContentRequest>,
) -> Result<Json<BulkContentResponse>, AppError> {
    generate::validate_provider(&body.provider)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let scope = ContentScope::from_str(&body.content_type).ok_or_else(|| {
        AppError::BadRequest(format!(
            "invalid content_type '{}': expected pages, posts, daily or all",
            body.content_type
        ))
    })?;

    let tenants = match &body.tenant_ids {
        Some(ids) => {
            let mut tenants = Vec::with_capacity(ids.len());
            for id in ids {
                tenants.push(fetch_active_tenant(&state, id)?);
            }
            tenants
        }
        None => state.registry.list_active(&state.db)?,
    };
    if tenants.is_empty() {
        return Err(AppError::BadRequest("no active tenants to target".into()));
    }

    let batch_id = uuid::Uuid::new_v4().to_string();
    let payload_for = |_: &Tenant| TaskPayload::BulkContent {
        provider: body.provider.clone(),
        scope,
        overwrite: body.overwrite,
        daily_count: body.daily_count,
    };

    let mut members = Vec::with_capacity(tenants.len());
    for tenant in &tenants {
        let task = ledger::create(
            &state.db,
            &payload_for(tenant),
            None,
            Some(&tenant.id),
            Some(&batch_id),
        )?;
        state.dispatcher.enqueue(task.id)?;
        members.push(BatchMember {
            task_id: task.id,
            tenant_id: tenant.id.clone(),
        });
    }

    tracing::info!(
        "batch {}: {} bulk-content tasks enqueued ({})",
        batch_id,
        members.len(),
        body.content_type
    );
    Ok(Json(BulkContentResponse {
        batch_id,
        tasks: members,
    }))
}

/// POST /generate: single content item for one tenant.
pub async fn generate_content(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<TaskView>, AppError> {
    generate::validate_provider(&body.provider)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    if body.topic.trim().is_empty() {
        return Err(AppError::BadRequest("topic must not be empty".into()));
    }
    let tenant = fetch_active_tenant(&state, &body.tenant_id)?;

    let payload = TaskPayload::ContentGenerate {
        provider: body.provider,
        kind: body.kind,
        topic: body.topic,
        overwrite: body.overwrite,
    };
    let task = ledger::create(&state.db, &payload, None, Some(&tenant.id), None)?;
    state.dispatcher.enqueue(task.id)?;
    Ok(Json(task.into()))
}

/// POST /clone: duplicate a site onto a new domain.
pub async fn clone_site(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CloneRequest>,
) -> Result<Json<TaskView>, AppError> {
    let source = fetch_active_tenant(&state, &body.source_tenant_id)?;

    // Collisions are resolution errors: reject now, don't queue a doomed task.
    if state.registry.domain_registered(&state.db, &body.new_domain)? {
        return Err(AppError::Conflict(format!(
            "domain '{}' is already registered",
            body.new_domain
        )));
    }

    let payload = TaskPayload::CloneSite {
        new_domain: body.new_domain,
    };
    let task = ledger::create(&state.db, &payload, Some(&source.id), None, None)?;
    state.dispatcher.enqueue(task.id)?;
    Ok(Json(task.into()))
}

/// GET /tasks/{id}
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TaskView>, AppError> {
    ledger::get(&state.db, id)?
        .map(|t| Json(t.into()))
        .ok_or_else(|| AppError::NotFound(format!("task {id} not found")))
}

/// GET /batch/{id}/progress, polled by operator tooling; derived on demand,
/// never stored.
pub async fn batch_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchProgressResponse>, AppError> {
    let summary = batch::summarize(&state.db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("batch {id} not found")))?;

    let tasks = ledger::list_by_batch(&state.db, &id)?
        .into_iter()
        .map(|t| {
            let tenant_ref = t
                .target_tenant_id
                .clone()
                .or_else(|| t.source_tenant_id.clone())
                .unwrap_or_default();
            let tenant = state
                .registry
                .get(&state.db, &tenant_ref)
                .ok()
                .flatten()
                .map(|t| t.domain)
                .unwrap_or(tenant_ref);
            BatchTaskView {
                id: t.id,
                tenant,
                status: t.status.as_str(),
                progress: t.progress,
                result: t.result,
                error: t.error_message,
            }
        })
        .collect();

    Ok(Json(BatchProgressResponse { summary, tasks }))
}

/// POST /batch/{id}/cancel: pre-dispatch, cooperative. Members already
/// running finish normally; members not yet claimed stay pending.
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if batch::summarize(&state.db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("batch {id} not found")));
    }
    state.dispatcher.cancel_batch(&id);
    tracing::info!("batch {}: cancellation requested", id);
    Ok(Json(serde_json::json!({ "batch_id": id, "cancelled": true })))
}
