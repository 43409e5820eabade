use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::event::{InteractionEvent, NewEvent};
use crate::ingest::ScrapedRecord;
use crate::lead::{DataQuality, Lead, LeadPatch, NewLead, Stage};
use crate::task::{FollowUpTask, NewTask, TaskStatus};

use super::{
    EventFilter, LeadFilter, LeadStore, Page, StageAdvance, StageCount, StoreError, TaskFilter,
    UpsertOutcome,
};

/// Postgres-backed store.
///
/// Per-lead serialization comes from single-statement writes: the stage
/// advance and the merge-upsert each execute as one `UPDATE`/`INSERT ON
/// CONFLICT` with the comparison inside the statement, so concurrent calls
/// for the same lead serialize on the row lock and calls for different
/// leads share nothing.
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|error| StoreError::MigrationError { error })
    }
}

fn query_error(command: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |error| StoreError::QueryError {
        command: command.to_owned(),
        error,
    }
}

fn insert_error(command: &str, error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            return StoreError::UniqueViolation;
        }
    }
    StoreError::QueryError {
        command: command.to_owned(),
        error,
    }
}

/// `RETURNING *` plus the inserted-vs-updated flag from the same write.
#[derive(sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    lead: Lead,
    created: bool,
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let query = r#"
INSERT INTO leads
    (id, external_key, display_name, role_title, organization, geo_label, tenure_months, stage, data_quality, owner, created_at, updated_at)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
RETURNING *
        "#;

        sqlx::query_as(query)
            .bind(Uuid::now_v7())
            .bind(&lead.external_key)
            .bind(&lead.display_name)
            .bind(&lead.role_title)
            .bind(&lead.organization)
            .bind(&lead.geo_label)
            .bind(lead.tenure_months)
            .bind(lead.stage)
            .bind(lead.data_quality)
            .bind(&lead.owner)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| insert_error("INSERT leads", error))
    }

    async fn upsert_lead(
        &self,
        record: &ScrapedRecord,
        stage: Stage,
        quality: DataQuality,
        owner: &str,
    ) -> Result<UpsertOutcome, StoreError> {
        // Last-non-null-wins merge and the created/updated flag, in one
        // atomic statement (xmax = 0 only on freshly inserted rows).
        // Incoming fields are normalized to NULL-or-non-empty upstream.
        let query = r#"
INSERT INTO leads
    (id, external_key, display_name, role_title, organization, geo_label, tenure_months, stage, data_quality, owner, created_at, updated_at)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
ON CONFLICT (external_key) DO UPDATE SET
    display_name = COALESCE(NULLIF(EXCLUDED.display_name, ''), leads.display_name),
    role_title = COALESCE(EXCLUDED.role_title, leads.role_title),
    organization = COALESCE(EXCLUDED.organization, leads.organization),
    geo_label = COALESCE(EXCLUDED.geo_label, leads.geo_label),
    tenure_months = COALESCE(EXCLUDED.tenure_months, leads.tenure_months),
    data_quality = CASE
        WHEN COALESCE(EXCLUDED.role_title, leads.role_title) IS NOT NULL
         AND COALESCE(EXCLUDED.organization, leads.organization) IS NOT NULL
        THEN 'complete'::data_quality
        ELSE 'partial'::data_quality
    END,
    updated_at = NOW()
RETURNING *, (xmax = 0) AS created
        "#;

        let row: UpsertRow = sqlx::query_as(query)
            .bind(Uuid::now_v7())
            .bind(&record.external_key)
            .bind(&record.display_name)
            .bind(&record.role_title)
            .bind(&record.organization)
            .bind(&record.geo_label)
            .bind(record.tenure_months)
            .bind(stage)
            .bind(quality)
            .bind(owner)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("UPSERT leads"))?;

        Ok(UpsertOutcome {
            lead: row.lead,
            created: row.created,
        })
    }

    async fn lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        sqlx::query_as("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("SELECT leads"))
    }

    async fn lead_by_external_key(&self, key: &str) -> Result<Option<Lead>, StoreError> {
        sqlx::query_as("SELECT * FROM leads WHERE external_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("SELECT leads"))
    }

    async fn list_leads(&self, filter: &LeadFilter, page: Page) -> Result<Vec<Lead>, StoreError> {
        let query = r#"
SELECT * FROM leads
WHERE ($1::lead_stage IS NULL OR stage = $1)
  AND ($2::text IS NULL OR owner = $2)
ORDER BY created_at DESC
LIMIT $3 OFFSET $4
        "#;

        sqlx::query_as(query)
            .bind(filter.stage)
            .bind(&filter.owner)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT leads"))
    }

    async fn update_lead(&self, id: Uuid, patch: &LeadPatch) -> Result<Option<Lead>, StoreError> {
        // Provided fields overwrite, omitted fields stay. Quality is
        // reclassified from the merged values unless the patch carries an
        // explicit override ($8).
        let query = r#"
UPDATE leads SET
    display_name = COALESCE($2, display_name),
    role_title = COALESCE($3, role_title),
    organization = COALESCE($4, organization),
    geo_label = COALESCE($5, geo_label),
    tenure_months = COALESCE($6, tenure_months),
    stage = COALESCE($7, stage),
    data_quality = COALESCE($8, CASE
        WHEN COALESCE($3, role_title) IS NOT NULL
         AND COALESCE($4, organization) IS NOT NULL
        THEN 'complete'::data_quality
        ELSE 'partial'::data_quality
    END),
    updated_at = NOW()
WHERE id = $1
RETURNING *
        "#;

        sqlx::query_as(query)
            .bind(id)
            .bind(patch.display_name.as_deref())
            .bind(patch.role_title.as_deref())
            .bind(patch.organization.as_deref())
            .bind(patch.geo_label.as_deref())
            .bind(patch.tenure_months)
            .bind(patch.stage)
            .bind(patch.data_quality)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("UPDATE leads"))
    }

    async fn advance_stage(
        &self,
        id: Uuid,
        target: Stage,
    ) -> Result<Option<StageAdvance>, StoreError> {
        // lead_stage labels are declared in funnel order, so the enum
        // comparison below is the monotonic advance check, evaluated under
        // the row lock of this single UPDATE.
        let advanced: Option<Stage> = sqlx::query_scalar(
            r#"
UPDATE leads SET stage = $2, updated_at = NOW()
WHERE id = $1 AND stage < $2
RETURNING stage
            "#,
        )
        .bind(id)
        .bind(target)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error("UPDATE leads"))?;

        if let Some(stage_after) = advanced {
            return Ok(Some(StageAdvance {
                stage_after,
                changed: true,
            }));
        }

        let current: Option<Stage> = sqlx::query_scalar("SELECT stage FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("SELECT leads"))?;

        Ok(current.map(|stage_after| StageAdvance {
            stage_after,
            changed: false,
        }))
    }

    async fn append_event(&self, event: NewEvent) -> Result<InteractionEvent, StoreError> {
        let query = r#"
INSERT INTO events (id, lead_id, actor, kind, occurred_at)
VALUES ($1, $2, $3, $4, $5)
RETURNING *
        "#;

        sqlx::query_as(query)
            .bind(Uuid::now_v7())
            .bind(event.lead_id)
            .bind(&event.actor)
            .bind(event.kind)
            .bind(event.occurred_at)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("INSERT events"))
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: Page,
    ) -> Result<Vec<InteractionEvent>, StoreError> {
        let query = r#"
SELECT * FROM events
WHERE ($1::uuid IS NULL OR lead_id = $1)
  AND ($2::text IS NULL OR actor = $2)
  AND ($3::event_kind IS NULL OR kind = $3)
ORDER BY occurred_at DESC
LIMIT $4 OFFSET $5
        "#;

        sqlx::query_as(query)
            .bind(filter.lead_id)
            .bind(&filter.actor)
            .bind(filter.kind)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT events"))
    }

    async fn insert_task(&self, task: NewTask) -> Result<FollowUpTask, StoreError> {
        let query = r#"
INSERT INTO tasks (id, lead_id, owner, label, due_at, status)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING *
        "#;

        sqlx::query_as(query)
            .bind(Uuid::now_v7())
            .bind(task.lead_id)
            .bind(&task.owner)
            .bind(&task.label)
            .bind(task.due_at)
            .bind(TaskStatus::Open)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("INSERT tasks"))
    }

    async fn set_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<FollowUpTask>, StoreError> {
        sqlx::query_as("UPDATE tasks SET status = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("UPDATE tasks"))
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        let deleted: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM tasks WHERE id = $1 RETURNING id")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error("DELETE tasks"))?;

        Ok(deleted.is_some())
    }

    async fn list_tasks(
        &self,
        filter: &TaskFilter,
        page: Page,
    ) -> Result<Vec<FollowUpTask>, StoreError> {
        let query = r#"
SELECT * FROM tasks
WHERE ($1::uuid IS NULL OR lead_id = $1)
  AND ($2::text IS NULL OR owner = $2)
  AND ($3::task_status IS NULL OR status = $3)
ORDER BY due_at ASC
LIMIT $4 OFFSET $5
        "#;

        sqlx::query_as(query)
            .bind(filter.lead_id)
            .bind(&filter.owner)
            .bind(filter.status)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT tasks"))
    }

    async fn overdue_tasks(&self, now: DateTime<Utc>) -> Result<Vec<FollowUpTask>, StoreError> {
        let query = r#"
SELECT * FROM tasks
WHERE status = 'open' AND due_at < $1
ORDER BY due_at ASC
        "#;

        sqlx::query_as(query)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT tasks"))
    }

    async fn funnel_counts(&self) -> Result<Vec<StageCount>, StoreError> {
        sqlx::query_as("SELECT stage, COUNT(*) AS count FROM leads GROUP BY stage ORDER BY stage")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT leads"))
    }
}
