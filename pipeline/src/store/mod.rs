use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::event::{EventKind, InteractionEvent, NewEvent};
use crate::ingest::ScrapedRecord;
use crate::lead::{DataQuality, Lead, LeadPatch, NewLead, Stage};
use crate::task::{FollowUpTask, NewTask, TaskStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLeadStore;
pub use postgres::PgLeadStore;

/// Errors originating in the persistence layer, wrapped to provide the
/// failing command as context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("migrations failed with: {error}")]
    MigrationError { error: sqlx::migrate::MigrateError },
    #[error("unique key conflict")]
    UniqueViolation,
}

/// Limit/offset paging, with the transport's page numbering folded in.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 500;

    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        let page = page.unwrap_or(1).max(1);
        Self {
            limit,
            offset: (page - 1) * limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub stage: Option<Stage>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub lead_id: Option<Uuid>,
    pub actor: Option<String>,
    pub kind: Option<EventKind>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub lead_id: Option<Uuid>,
    pub owner: Option<String>,
    pub status: Option<TaskStatus>,
}

/// Result of an atomic stage-advance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageAdvance {
    pub stage_after: Stage,
    pub changed: bool,
}

/// Result of the conditional merge-upsert: the merged row plus whether it
/// was inserted rather than updated.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub lead: Lead,
    pub created: bool,
}

/// One funnel bucket for the reporting surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StageCount {
    pub stage: Stage,
    pub count: i64,
}

/// The persistence seam of the engine.
///
/// Implementations must make `advance_stage` and `upsert_lead` atomic per
/// lead: two concurrent calls for the same lead must serialize on the
/// read-compare-write, while calls for different leads proceed
/// independently. `PgLeadStore` gets this from single-statement row
/// locking; `MemoryLeadStore` from a mutex.
#[async_trait]
pub trait LeadStore {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError>;

    /// Insert-or-merge by `external_key`. Incoming non-null fields win,
    /// incoming nulls never erase, and quality is reclassified from the
    /// merged attributes. New rows start at `stage` with the supplied
    /// `quality`. Reports created-vs-updated from the same atomic write.
    async fn upsert_lead(
        &self,
        record: &ScrapedRecord,
        stage: Stage,
        quality: DataQuality,
        owner: &str,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError>;

    async fn lead_by_external_key(&self, key: &str) -> Result<Option<Lead>, StoreError>;

    async fn list_leads(&self, filter: &LeadFilter, page: Page) -> Result<Vec<Lead>, StoreError>;

    /// Apply a typed patch. Provided fields overwrite, omitted fields are
    /// untouched, and quality is reclassified unless the patch overrides
    /// it. Returns `None` when the lead does not exist.
    async fn update_lead(&self, id: Uuid, patch: &LeadPatch) -> Result<Option<Lead>, StoreError>;

    /// Move the lead to `target` only if that is a forward move; otherwise
    /// leave it alone. Returns `None` when the lead does not exist.
    async fn advance_stage(
        &self,
        id: Uuid,
        target: Stage,
    ) -> Result<Option<StageAdvance>, StoreError>;

    async fn append_event(&self, event: NewEvent) -> Result<InteractionEvent, StoreError>;

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: Page,
    ) -> Result<Vec<InteractionEvent>, StoreError>;

    async fn insert_task(&self, task: NewTask) -> Result<FollowUpTask, StoreError>;

    async fn set_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<FollowUpTask>, StoreError>;

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list_tasks(
        &self,
        filter: &TaskFilter,
        page: Page,
    ) -> Result<Vec<FollowUpTask>, StoreError>;

    async fn overdue_tasks(&self, now: DateTime<Utc>) -> Result<Vec<FollowUpTask>, StoreError>;

    async fn funnel_counts(&self) -> Result<Vec<StageCount>, StoreError>;
}
