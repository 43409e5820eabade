use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::api::PipelineError;
use crate::event::{EventInput, InteractionEvent, NewEvent};
use crate::ingest::{IngestSummary, RecordOutcome, ScrapedRecord, SkipReason};
use crate::lead::{normalize_opt, DataQuality, Lead, LeadPatch, NewLead, Stage};
use crate::store::{
    EventFilter, LeadFilter, LeadStore, Page, StageCount, TaskFilter,
};
use crate::task::{FollowUpTask, NewTask, TaskStatus};
use crate::time::TimeSource;
use crate::transitions::TransitionTable;

/// Default due offset for directly scheduled tasks with no explicit due
/// date, matching the shortest rule-driven follow-up cadence.
const DEFAULT_TASK_DUE_HOURS: i64 = 24;

/// Result of processing one interaction event.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub event: InteractionEvent,
    pub stage_after: Stage,
    pub stage_changed: bool,
    pub task_created: Option<FollowUpTask>,
}

/// A single-record creation request (manual entry path).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLeadInput {
    pub external_key: String,
    pub display_name: String,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub geo_label: Option<String>,
    pub tenure_months: Option<i32>,
    pub owner: String,
}

/// An explicit task-scheduling request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskInput {
    pub lead_id: Uuid,
    pub owner: String,
    pub label: String,
    pub due_at: Option<DateTime<Utc>>,
}

/// The pipeline engine: event-driven stage advancement, follow-up
/// scheduling, and bulk ingestion, over an injected store and rule table.
///
/// The engine performs no retries and holds no background state; every
/// operation is one synchronous pass over the store.
pub struct PipelineEngine {
    store: Arc<dyn LeadStore + Send + Sync>,
    rules: TransitionTable,
    clock: Arc<dyn TimeSource + Send + Sync>,
}

impl PipelineEngine {
    pub fn new(
        store: Arc<dyn LeadStore + Send + Sync>,
        rules: TransitionTable,
        clock: Arc<dyn TimeSource + Send + Sync>,
    ) -> Self {
        Self {
            store,
            rules,
            clock,
        }
    }

    /// Process one interaction event.
    ///
    /// Side effects are exactly: one event appended, zero-or-one stage
    /// advance, zero-or-one task created. The event is persisted for every
    /// valid interaction whether or not it moves the stage, and a rule
    /// with a task template schedules a fresh follow-up on every event of
    /// that kind, repeated or not.
    #[instrument(skip(self, input), fields(lead_id = %input.lead_id, kind = %input.kind))]
    pub async fn process_event(&self, input: EventInput) -> Result<ProcessOutcome, PipelineError> {
        let lead = self
            .store
            .lead(input.lead_id)
            .await?
            .ok_or(PipelineError::NotFound("lead"))?;

        let rule = self
            .rules
            .rule(input.kind)
            .ok_or(PipelineError::UnknownEventKind(input.kind))?;

        let occurred_at = input.occurred_at.unwrap_or_else(|| self.clock.now());
        let event = self
            .store
            .append_event(NewEvent {
                lead_id: lead.id,
                actor: input.actor.clone(),
                kind: input.kind,
                occurred_at,
            })
            .await?;

        let advance = self
            .store
            .advance_stage(lead.id, rule.target_stage)
            .await?
            .ok_or(PipelineError::NotFound("lead"))?;

        // Follow-up scheduling is driven by the event, not by the stage
        // transition: due from "now", not from occurred_at.
        let task_created = match &rule.task_template {
            Some(template) => Some(
                self.store
                    .insert_task(NewTask {
                        lead_id: lead.id,
                        owner: input.actor,
                        label: template.label.clone(),
                        due_at: self.clock.now() + template.due_offset(),
                    })
                    .await?,
            ),
            None => None,
        };

        counter!("pipeline_events_processed_total").increment(1);
        if advance.changed {
            counter!("pipeline_stage_advances_total").increment(1);
            tracing::debug!(stage = ?advance.stage_after, "lead advanced");
        }

        Ok(ProcessOutcome {
            event,
            stage_after: advance.stage_after,
            stage_changed: advance.changed,
            task_created,
        })
    }

    /// Ingest a batch of scraped records, one insert-or-merge per record.
    ///
    /// Records are independent: a failed or invalid record is counted as
    /// skipped and the batch continues. Cancelling the returned future
    /// between records leaves the completed writes committed; the designed
    /// failure mode is partial completion, reported honestly.
    #[instrument(skip_all, fields(batch_size = records.len(), owner = %owner))]
    pub async fn ingest_batch(&self, records: Vec<ScrapedRecord>, owner: &str) -> IngestSummary {
        let mut summary = IngestSummary::default();
        for record in records {
            summary.record(self.ingest_one(record, owner).await);
        }

        counter!("pipeline_records_ingested_total").increment(summary.created + summary.updated);
        counter!("pipeline_records_skipped_total").increment(summary.skipped);
        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            "batch ingested"
        );
        summary
    }

    async fn ingest_one(&self, record: ScrapedRecord, owner: &str) -> RecordOutcome {
        let record = record.normalized();
        if record.external_key.is_empty() {
            tracing::warn!("skipping record: {}", SkipReason::MissingExternalKey);
            return RecordOutcome::Skipped(SkipReason::MissingExternalKey);
        }

        // A record with no display name can still refresh an existing
        // lead (the merge never applies blank fields), but it must not
        // create a nameless one.
        if record.display_name.is_empty() {
            match self.store.lead_by_external_key(&record.external_key).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(
                        key = %record.external_key,
                        "skipping record: {}", SkipReason::MissingDisplayName
                    );
                    return RecordOutcome::Skipped(SkipReason::MissingDisplayName);
                }
                Err(error) => {
                    tracing::error!(key = %record.external_key, %error, "record lookup failed");
                    return RecordOutcome::Skipped(SkipReason::StoreFailure);
                }
            }
        }

        // Bulk-ingested contacts are already-connected relationships.
        let quality = record.quality();
        match self
            .store
            .upsert_lead(&record, Stage::Connected, quality, owner)
            .await
        {
            Ok(outcome) if outcome.created => RecordOutcome::Created,
            Ok(_) => RecordOutcome::Updated,
            Err(error) => {
                tracing::error!(key = %record.external_key, %error, "record write failed");
                RecordOutcome::Skipped(SkipReason::StoreFailure)
            }
        }
    }

    /// Create a single lead from manual entry. Unlike ingestion, a
    /// duplicate external key is a conflict, and a manually entered lead
    /// starts at `New`: no connection is implied.
    pub async fn create_lead(&self, input: CreateLeadInput) -> Result<Lead, PipelineError> {
        let external_key = input.external_key.trim().to_string();
        let display_name = input.display_name.trim().to_string();
        if external_key.is_empty() {
            return Err(PipelineError::ValidationFailed(
                "external_key is required".into(),
            ));
        }
        if display_name.is_empty() {
            return Err(PipelineError::ValidationFailed(
                "display_name is required".into(),
            ));
        }
        if input.tenure_months.is_some_and(|months| months < 0) {
            return Err(PipelineError::ValidationFailed(
                "tenure_months must be >= 0".into(),
            ));
        }

        let role_title = normalize_opt(input.role_title);
        let organization = normalize_opt(input.organization);
        let data_quality = DataQuality::derive(role_title.as_deref(), organization.as_deref());

        let lead = self
            .store
            .insert_lead(NewLead {
                external_key,
                display_name,
                role_title,
                organization,
                geo_label: normalize_opt(input.geo_label),
                tenure_months: input.tenure_months,
                stage: Stage::New,
                data_quality,
                owner: input.owner,
            })
            .await?;

        counter!("pipeline_leads_created_total").increment(1);
        Ok(lead)
    }

    /// Apply a typed edit. This is the administrative path: a supplied
    /// `stage` is applied verbatim, regressions included.
    pub async fn update_lead(&self, id: Uuid, patch: LeadPatch) -> Result<Lead, PipelineError> {
        if patch.is_empty() {
            return Err(PipelineError::ValidationFailed(
                "no fields to update".into(),
            ));
        }
        if patch
            .display_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(PipelineError::ValidationFailed(
                "display_name cannot be empty".into(),
            ));
        }
        if patch.tenure_months.is_some_and(|months| months < 0) {
            return Err(PipelineError::ValidationFailed(
                "tenure_months must be >= 0".into(),
            ));
        }

        let patch = LeadPatch {
            display_name: normalize_opt(patch.display_name),
            role_title: normalize_opt(patch.role_title),
            organization: normalize_opt(patch.organization),
            geo_label: normalize_opt(patch.geo_label),
            tenure_months: patch.tenure_months,
            stage: patch.stage,
            data_quality: patch.data_quality,
        };

        self.store
            .update_lead(id, &patch)
            .await?
            .ok_or(PipelineError::NotFound("lead"))
    }

    pub async fn lead(&self, id: Uuid) -> Result<Lead, PipelineError> {
        self.store
            .lead(id)
            .await?
            .ok_or(PipelineError::NotFound("lead"))
    }

    pub async fn lead_by_external_key(&self, key: &str) -> Result<Option<Lead>, PipelineError> {
        Ok(self.store.lead_by_external_key(key).await?)
    }

    pub async fn list_leads(
        &self,
        filter: LeadFilter,
        page: Page,
    ) -> Result<Vec<Lead>, PipelineError> {
        Ok(self.store.list_leads(&filter, page).await?)
    }

    pub async fn list_events(
        &self,
        filter: EventFilter,
        page: Page,
    ) -> Result<Vec<InteractionEvent>, PipelineError> {
        Ok(self.store.list_events(&filter, page).await?)
    }

    /// Schedule a follow-up directly. Defaults to due in 24 hours.
    pub async fn create_task(&self, input: CreateTaskInput) -> Result<FollowUpTask, PipelineError> {
        let label = input.label.trim().to_string();
        if label.is_empty() {
            return Err(PipelineError::ValidationFailed("label is required".into()));
        }
        self.store
            .lead(input.lead_id)
            .await?
            .ok_or(PipelineError::NotFound("lead"))?;

        let due_at = input
            .due_at
            .unwrap_or_else(|| self.clock.now() + Duration::hours(DEFAULT_TASK_DUE_HOURS));

        Ok(self
            .store
            .insert_task(NewTask {
                lead_id: input.lead_id,
                owner: input.owner,
                label,
                due_at,
            })
            .await?)
    }

    pub async fn set_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<FollowUpTask, PipelineError> {
        self.store
            .set_task_status(id, status)
            .await?
            .ok_or(PipelineError::NotFound("task"))
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), PipelineError> {
        if self.store.delete_task(id).await? {
            Ok(())
        } else {
            Err(PipelineError::NotFound("task"))
        }
    }

    pub async fn list_tasks(
        &self,
        filter: TaskFilter,
        page: Page,
    ) -> Result<Vec<FollowUpTask>, PipelineError> {
        Ok(self.store.list_tasks(&filter, page).await?)
    }

    /// Open tasks past due. "Due" is evaluated lazily against the engine
    /// clock at read time; nothing ticks in the background.
    pub async fn overdue_tasks(&self) -> Result<Vec<FollowUpTask>, PipelineError> {
        Ok(self.store.overdue_tasks(self.clock.now()).await?)
    }

    pub async fn funnel_counts(&self) -> Result<Vec<StageCount>, PipelineError> {
        Ok(self.store.funnel_counts().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::store::MemoryLeadStore;
    use chrono::TimeZone;

    #[derive(Clone)]
    struct FixedTime {
        time: DateTime<Utc>,
    }

    impl TimeSource for FixedTime {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    fn engine() -> PipelineEngine {
        engine_with_rules(TransitionTable::default())
    }

    fn engine_with_rules(rules: TransitionTable) -> PipelineEngine {
        PipelineEngine::new(
            Arc::new(MemoryLeadStore::new()),
            rules,
            Arc::new(FixedTime { time: fixed_now() }),
        )
    }

    fn create_input(key: &str, name: &str) -> CreateLeadInput {
        CreateLeadInput {
            external_key: key.to_string(),
            display_name: name.to_string(),
            role_title: None,
            organization: None,
            geo_label: None,
            tenure_months: None,
            owner: "sales@example.com".to_string(),
        }
    }

    fn event_input(lead_id: Uuid, kind: EventKind) -> EventInput {
        EventInput {
            lead_id,
            kind,
            actor: "sales@example.com".to_string(),
            occurred_at: None,
        }
    }

    fn record(key: &str, name: &str) -> ScrapedRecord {
        ScrapedRecord {
            external_key: key.to_string(),
            display_name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn invite_advances_and_schedules_follow_up() {
        let engine = engine();
        let lead = engine
            .create_lead(create_input("https://example.com/in/a", "A"))
            .await
            .unwrap();
        assert_eq!(lead.stage, Stage::New);

        let outcome = engine
            .process_event(event_input(lead.id, EventKind::InviteSent))
            .await
            .unwrap();

        assert_eq!(outcome.stage_after, Stage::Invited);
        assert!(outcome.stage_changed);
        let task = outcome.task_created.unwrap();
        assert_eq!(task.label, "Follow up on invite");
        assert_eq!(task.due_at, fixed_now() + Duration::hours(72));
        assert_eq!(task.owner, "sales@example.com");
        assert_eq!(task.status, TaskStatus::Open);
    }

    #[tokio::test]
    async fn repeated_event_keeps_stage_but_schedules_again() {
        let engine = engine();
        let lead = engine
            .create_lead(create_input("https://example.com/in/a", "A"))
            .await
            .unwrap();

        engine
            .process_event(event_input(lead.id, EventKind::InviteSent))
            .await
            .unwrap();
        let second = engine
            .process_event(event_input(lead.id, EventKind::InviteSent))
            .await
            .unwrap();

        assert_eq!(second.stage_after, Stage::Invited);
        assert!(!second.stage_changed);
        assert!(second.task_created.is_some());

        let tasks = engine
            .list_tasks(TaskFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[tokio::test]
    async fn out_of_order_events_never_regress() {
        let engine = engine();
        let lead = engine
            .create_lead(create_input("https://example.com/in/a", "A"))
            .await
            .unwrap();

        engine
            .process_event(event_input(lead.id, EventKind::MeetingBooked))
            .await
            .unwrap();
        let late = engine
            .process_event(event_input(lead.id, EventKind::Connected))
            .await
            .unwrap();

        assert_eq!(late.stage_after, Stage::Meeting);
        assert!(!late.stage_changed);
        // Event-task coupling is unconditional: the late event still
        // schedules its follow-up.
        assert_eq!(late.task_created.unwrap().label, "Send first message");
        assert_eq!(engine.lead(lead.id).await.unwrap().stage, Stage::Meeting);
    }

    #[tokio::test]
    async fn every_valid_event_lands_in_the_log() {
        let engine = engine();
        let lead = engine
            .create_lead(create_input("https://example.com/in/a", "A"))
            .await
            .unwrap();

        engine
            .process_event(event_input(lead.id, EventKind::MeetingBooked))
            .await
            .unwrap();
        engine
            .process_event(event_input(lead.id, EventKind::ReplyReceived))
            .await
            .unwrap();

        let events = engine
            .list_events(EventFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn missing_lead_is_rejected_before_logging() {
        let engine = engine();
        let err = engine
            .process_event(event_input(Uuid::now_v7(), EventKind::InviteSent))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound("lead")));

        let events = engine
            .list_events(EventFilter::default(), Page::default())
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn kind_without_rule_is_rejected_before_logging() {
        let engine = engine_with_rules(TransitionTable::new([]));
        let lead = engine
            .create_lead(create_input("https://example.com/in/a", "A"))
            .await
            .unwrap();

        let err = engine
            .process_event(event_input(lead.id, EventKind::InviteSent))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownEventKind(_)));

        let events = engine
            .list_events(EventFilter::default(), Page::default())
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn reingesting_the_same_batch_converges() {
        let engine = engine();
        let batch = vec![ScrapedRecord {
            role_title: Some("Eng".to_string()),
            organization: Some("Acme".to_string()),
            ..record("u1", "A")
        }];

        let first = engine.ingest_batch(batch.clone(), "owner").await;
        assert_eq!((first.created, first.updated, first.skipped), (1, 0, 0));

        let second = engine.ingest_batch(batch, "owner").await;
        assert_eq!((second.created, second.updated, second.skipped), (0, 1, 0));

        let lead = engine.lead_by_external_key("u1").await.unwrap().unwrap();
        assert_eq!(lead.stage, Stage::Connected);
        assert_eq!(lead.data_quality, DataQuality::Complete);
        assert_eq!(lead.role_title.as_deref(), Some("Eng"));
        assert_eq!(lead.organization.as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn invalid_records_are_skipped_without_aborting_the_batch() {
        let engine = engine();
        let summary = engine
            .ingest_batch(
                vec![
                    record("", "No Key"),
                    record("u2", ""),
                    record("u3", "Valid"),
                ],
                "owner",
            )
            .await;

        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.total, 3);
        assert!(engine.lead_by_external_key("u3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn blank_fields_refresh_but_never_erase() {
        let engine = engine();
        engine
            .ingest_batch(
                vec![ScrapedRecord {
                    role_title: Some("Eng".to_string()),
                    organization: Some("Acme".to_string()),
                    ..record("u1", "A")
                }],
                "owner",
            )
            .await;

        // Nameless re-sighting of a known contact: merged, not skipped.
        let summary = engine
            .ingest_batch(
                vec![ScrapedRecord {
                    organization: Some("NewCo".to_string()),
                    ..record("u1", "")
                }],
                "owner",
            )
            .await;
        assert_eq!((summary.created, summary.updated, summary.skipped), (0, 1, 0));

        let lead = engine.lead_by_external_key("u1").await.unwrap().unwrap();
        assert_eq!(lead.display_name, "A");
        assert_eq!(lead.organization.as_deref(), Some("NewCo"));
        assert_eq!(lead.role_title.as_deref(), Some("Eng"));
        assert_eq!(lead.data_quality, DataQuality::Complete);
    }

    #[tokio::test]
    async fn ingestion_promotes_quality_on_enrichment() {
        let engine = engine();
        engine.ingest_batch(vec![record("u1", "A")], "owner").await;
        assert_eq!(
            engine
                .lead_by_external_key("u1")
                .await
                .unwrap()
                .unwrap()
                .data_quality,
            DataQuality::Partial
        );

        engine
            .ingest_batch(
                vec![ScrapedRecord {
                    role_title: Some("Eng".to_string()),
                    organization: Some("Acme".to_string()),
                    ..record("u1", "A")
                }],
                "owner",
            )
            .await;
        assert_eq!(
            engine
                .lead_by_external_key("u1")
                .await
                .unwrap()
                .unwrap()
                .data_quality,
            DataQuality::Complete
        );
    }

    #[tokio::test]
    async fn single_create_conflicts_on_duplicate_key() {
        let engine = engine();
        engine
            .create_lead(create_input("https://example.com/in/a", "A"))
            .await
            .unwrap();
        let err = engine
            .create_lead(create_input("https://example.com/in/a", "B"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict));
    }

    #[tokio::test]
    async fn create_validates_required_fields() {
        let engine = engine();
        assert!(matches!(
            engine.create_lead(create_input(" ", "A")).await,
            Err(PipelineError::ValidationFailed(_))
        ));
        assert!(matches!(
            engine.create_lead(create_input("u1", " ")).await,
            Err(PipelineError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn edit_auto_promotes_quality_unless_overridden() {
        let engine = engine();
        let lead = engine
            .create_lead(CreateLeadInput {
                role_title: Some("Eng".to_string()),
                ..create_input("u1", "A")
            })
            .await
            .unwrap();
        assert_eq!(lead.data_quality, DataQuality::Partial);

        let edited = engine
            .update_lead(
                lead.id,
                LeadPatch {
                    organization: Some("Acme".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.data_quality, DataQuality::Complete);

        let flagged = engine
            .update_lead(
                lead.id,
                LeadPatch {
                    data_quality: Some(DataQuality::NeedsEnrichment),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(flagged.data_quality, DataQuality::NeedsEnrichment);
    }

    #[tokio::test]
    async fn edit_may_regress_stage_as_administrative_correction() {
        let engine = engine();
        let lead = engine
            .create_lead(create_input("u1", "A"))
            .await
            .unwrap();
        engine
            .process_event(event_input(lead.id, EventKind::MeetingBooked))
            .await
            .unwrap();

        let corrected = engine
            .update_lead(
                lead.id,
                LeadPatch {
                    stage: Some(Stage::Connected),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(corrected.stage, Stage::Connected);
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let engine = engine();
        let lead = engine.create_lead(create_input("u1", "A")).await.unwrap();
        assert!(matches!(
            engine.update_lead(lead.id, LeadPatch::default()).await,
            Err(PipelineError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn direct_tasks_default_to_24_hours() {
        let engine = engine();
        let lead = engine.create_lead(create_input("u1", "A")).await.unwrap();

        let task = engine
            .create_task(CreateTaskInput {
                lead_id: lead.id,
                owner: "owner".to_string(),
                label: "Research".to_string(),
                due_at: None,
            })
            .await
            .unwrap();
        assert_eq!(task.due_at, fixed_now() + Duration::hours(24));

        let err = engine
            .create_task(CreateTaskInput {
                lead_id: Uuid::now_v7(),
                owner: "owner".to_string(),
                label: "Research".to_string(),
                due_at: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound("lead")));
    }

    #[tokio::test]
    async fn tasks_reopen_and_complete() {
        let engine = engine();
        let lead = engine.create_lead(create_input("u1", "A")).await.unwrap();
        let task = engine
            .create_task(CreateTaskInput {
                lead_id: lead.id,
                owner: "owner".to_string(),
                label: "Research".to_string(),
                due_at: None,
            })
            .await
            .unwrap();

        let done = engine
            .set_task_status(task.id, TaskStatus::Done)
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Done);

        let reopened = engine
            .set_task_status(task.id, TaskStatus::Open)
            .await
            .unwrap();
        assert_eq!(reopened.status, TaskStatus::Open);

        engine.delete_task(task.id).await.unwrap();
        assert!(matches!(
            engine.delete_task(task.id).await,
            Err(PipelineError::NotFound("task"))
        ));
    }

    #[tokio::test]
    async fn overdue_is_computed_at_read_time() {
        let engine = engine();
        let lead = engine.create_lead(create_input("u1", "A")).await.unwrap();

        let stale = engine
            .create_task(CreateTaskInput {
                lead_id: lead.id,
                owner: "owner".to_string(),
                label: "Missed".to_string(),
                due_at: Some(fixed_now() - Duration::hours(1)),
            })
            .await
            .unwrap();
        engine
            .create_task(CreateTaskInput {
                lead_id: lead.id,
                owner: "owner".to_string(),
                label: "Upcoming".to_string(),
                due_at: None,
            })
            .await
            .unwrap();

        let overdue = engine.overdue_tasks().await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, stale.id);

        // Done tasks are never overdue.
        engine
            .set_task_status(stale.id, TaskStatus::Done)
            .await
            .unwrap();
        assert!(engine.overdue_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn funnel_counts_follow_stage_order() {
        let engine = engine();
        engine.create_lead(create_input("u1", "A")).await.unwrap();
        engine.create_lead(create_input("u2", "B")).await.unwrap();
        engine
            .ingest_batch(vec![record("u3", "C")], "owner")
            .await;

        let counts = engine.funnel_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                StageCount {
                    stage: Stage::New,
                    count: 2
                },
                StageCount {
                    stage: Stage::Connected,
                    count: 1
                },
            ]
        );
    }
}
