//! Background task execution.
//!
//! Each worker owns its own control-plane pool and tenant router, pulls one
//! task at a time from the shared queue, and is the only writer of the tasks
//! it claims. Collaborator failures are translated into the ledger's `failed`
//! status at this boundary; nothing escapes to take the worker loop down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::GenerationConfig;
use crate::db::pool::ControlPool;
use crate::generate;
use crate::tasks::dispatcher::{Dispatcher, TaskQueue};
use crate::tasks::{clone_job, content_job, ledger, Task, TaskPayload, TaskResult, TaskStatus, TaskType};
use crate::tenant::registry::TenantRegistry;
use crate::tenant::store::TenantRouter;

/// Everything one worker needs. Built once per worker at serve time.
pub struct WorkerContext {
    pub db: ControlPool,
    pub registry: Arc<TenantRegistry>,
    pub router: TenantRouter,
    pub generation: GenerationConfig,
    pub content_timeout: Duration,
    pub clone_timeout: Duration,
    pub dispatcher: Arc<Dispatcher>,
}

pub async fn run(
    worker_id: usize,
    ctx: WorkerContext,
    queue: TaskQueue,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("worker {}: started", worker_id);
    loop {
        let task_id = tokio::select! {
            next = async { queue.lock().await.recv().await } => {
                match next {
                    Some(id) => id,
                    None => break, // queue closed
                }
            }
            _ = shutdown_rx.recv() => {
                info!("worker {}: shutdown signal received", worker_id);
                break;
            }
        };

        if let Err(e) = execute(&ctx, task_id).await {
            error!("worker {}: task {} bookkeeping failed: {:#}", worker_id, task_id, e);
        }
    }
    info!("worker {}: stopped", worker_id);
}

/// Claim and run one task. Ledger bookkeeping errors bubble up; pipeline
/// errors are recorded on the task and never returned.
pub async fn execute(ctx: &WorkerContext, task_id: i64) -> Result<()> {
    let Some(task) = ledger::get(&ctx.db, task_id)? else {
        warn!("task {}: not in ledger, dropping", task_id);
        return Ok(());
    };

    // Cancellation observed before starting: skip entirely, leave pending.
    if let Some(batch_id) = &task.batch_id {
        if ctx.dispatcher.is_cancelled(batch_id) {
            info!("task {}: batch {} cancelled, skipping", task.id, batch_id);
            return Ok(());
        }
    }

    if task.status != TaskStatus::Pending {
        warn!(
            "task {}: status '{}' at pickup, skipping",
            task.id,
            task.status.as_str()
        );
        return Ok(());
    }

    ledger::mark_processing(&ctx.db, task.id, 5)?;

    let budget = match task.task_type {
        TaskType::CloneSite => ctx.clone_timeout,
        TaskType::ContentGenerate | TaskType::BulkContent => ctx.content_timeout,
    };

    match tokio::time::timeout(budget, run_pipeline(ctx, &task)).await {
        Ok(Ok(result)) => {
            ledger::complete(&ctx.db, task.id, &result)?;
            info!("task {}: completed", task.id);
        }
        Ok(Err(e)) => {
            warn!("task {}: failed: {:#}", task.id, e);
            ledger::fail(&ctx.db, task.id, &format!("{e:#}"))?;
        }
        Err(_) => {
            warn!("task {}: timed out after {}s", task.id, budget.as_secs());
            ledger::fail(
                &ctx.db,
                task.id,
                &format!("timed out after {}s", budget.as_secs()),
            )?;
        }
    }
    Ok(())
}

async fn run_pipeline(ctx: &WorkerContext, task: &Task) -> Result<TaskResult> {
    match &task.payload {
        TaskPayload::BulkContent { provider, .. } => {
            let generator = generate::create_generator(provider, &ctx.generation)?;
            let images = generate::create_image_generator(&ctx.generation)?;
            content_job::run_bulk(
                &ctx.db,
                &ctx.registry,
                &ctx.router,
                generator.as_ref(),
                images.as_ref(),
                task,
            )
            .await
        }
        TaskPayload::ContentGenerate { provider, .. } => {
            let generator = generate::create_generator(provider, &ctx.generation)?;
            let images = generate::create_image_generator(&ctx.generation)?;
            content_job::run_single(
                &ctx.db,
                &ctx.registry,
                &ctx.router,
                generator.as_ref(),
                images.as_ref(),
                task,
            )
            .await
        }
        TaskPayload::CloneSite { .. } => {
            clone_job::run(&ctx.db, &ctx.registry, &ctx.router, task).await
        }
    }
}
