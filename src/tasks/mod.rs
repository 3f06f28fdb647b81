pub mod batch;
pub mod clone_job;
pub mod content_job;
pub mod dispatcher;
pub mod ledger;
pub mod worker;

use serde::{Deserialize, Serialize};

use crate::generate::ContentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    ContentGenerate,
    BulkContent,
    CloneSite,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ContentGenerate => "content_generate",
            TaskType::BulkContent => "bulk_content",
            TaskType::CloneSite => "clone_site",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "content_generate" => Some(TaskType::ContentGenerate),
            "bulk_content" => Some(TaskType::BulkContent),
            "clone_site" => Some(TaskType::CloneSite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Which content categories a bulk run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentScope {
    Pages,
    Posts,
    Daily,
    All,
}

impl ContentScope {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pages" => Some(ContentScope::Pages),
            "posts" => Some(ContentScope::Posts),
            "daily" => Some(ContentScope::Daily),
            "all" => Some(ContentScope::All),
            _ => None,
        }
    }

    pub fn includes_pages(&self) -> bool {
        matches!(self, ContentScope::Pages | ContentScope::All)
    }

    pub fn includes_posts(&self) -> bool {
        matches!(self, ContentScope::Posts | ContentScope::All)
    }

    pub fn includes_daily(&self) -> bool {
        matches!(self, ContentScope::Daily | ContentScope::All)
    }
}

/// One input shape per task type, dispatched on the stored `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    ContentGenerate {
        provider: String,
        kind: ContentKind,
        topic: String,
        #[serde(default)]
        overwrite: bool,
    },
    BulkContent {
        provider: String,
        scope: ContentScope,
        #[serde(default)]
        overwrite: bool,
        #[serde(default = "default_daily_count")]
        daily_count: u32,
    },
    CloneSite {
        new_domain: String,
    },
}

fn default_daily_count() -> u32 {
    5
}

impl TaskPayload {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskPayload::ContentGenerate { .. } => TaskType::ContentGenerate,
            TaskPayload::BulkContent { .. } => TaskType::BulkContent,
            TaskPayload::CloneSite { .. } => TaskType::CloneSite,
        }
    }
}

/// One output shape per task type. Present only on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskResult {
    ContentGenerate {
        slug: String,
        title: String,
        skipped: bool,
    },
    BulkContent {
        created: u32,
        skipped: u32,
        errors: Vec<String>,
    },
    CloneSite {
        target_tenant_id: String,
        pages: u32,
        posts: u32,
        offers: u32,
        redirects: u32,
    },
}

/// A durable unit of background work against one (or a source+target pair of)
/// tenant(s). Never deleted; the ledger is the audit trail.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub progress: u8,
    pub source_tenant_id: Option<String>,
    pub target_tenant_id: Option<String>,
    pub batch_id: Option<String>,
    pub payload: TaskPayload,
    pub result: Option<TaskResult>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) const TASK_COLUMNS: &str =
    "id, task_type, status, progress, source_tenant_id, target_tenant_id, batch_id, payload, \
     result, error_message, created_at, updated_at";

fn column_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

impl Task {
    /// Map a row selected with [`TASK_COLUMNS`].
    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let type_str: String = row.get(1)?;
        let task_type = TaskType::from_str(&type_str)
            .ok_or_else(|| column_error(1, format!("unknown task type '{type_str}'")))?;

        let status_str: String = row.get(2)?;
        let status = TaskStatus::from_str(&status_str)
            .ok_or_else(|| column_error(2, format!("unknown task status '{status_str}'")))?;

        let payload_str: String = row.get(7)?;
        let payload: TaskPayload = serde_json::from_str(&payload_str)
            .map_err(|e| column_error(7, format!("bad task payload: {e}")))?;

        let result: Option<TaskResult> = match row.get::<_, Option<String>>(8)? {
            Some(s) => Some(
                serde_json::from_str(&s)
                    .map_err(|e| column_error(8, format!("bad task result: {e}")))?,
            ),
            None => None,
        };

        Ok(Self {
            id: row.get(0)?,
            task_type,
            status,
            progress: row.get::<_, i64>(3)? as u8,
            source_tenant_id: row.get(4)?,
            target_tenant_id: row.get(5)?,
            batch_id: row.get(6)?,
            payload,
            result,
            error_message: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}
