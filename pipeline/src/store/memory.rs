use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event::{InteractionEvent, NewEvent};
use crate::ingest::ScrapedRecord;
use crate::lead::{DataQuality, Lead, LeadPatch, NewLead, Stage};
use crate::task::{FollowUpTask, NewTask, TaskStatus};

use super::{
    EventFilter, LeadFilter, LeadStore, Page, StageAdvance, StageCount, StoreError, TaskFilter,
    UpsertOutcome,
};

/// In-memory store double with the same observable semantics as
/// `PgLeadStore`. One mutex over the whole state serializes every
/// read-compare-write, which trivially satisfies the per-lead atomicity
/// the trait requires; it is only meant to back tests.
#[derive(Default)]
pub struct MemoryLeadStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    leads: HashMap<Uuid, Lead>,
    keys: HashMap<String, Uuid>,
    events: Vec<InteractionEvent>,
    tasks: Vec<FollowUpTask>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page_slice<T: Clone>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.keys.contains_key(&lead.external_key) {
            return Err(StoreError::UniqueViolation);
        }
        let now = Utc::now();
        let stored = Lead {
            id: Uuid::now_v7(),
            external_key: lead.external_key,
            display_name: lead.display_name,
            role_title: lead.role_title,
            organization: lead.organization,
            geo_label: lead.geo_label,
            tenure_months: lead.tenure_months,
            stage: lead.stage,
            data_quality: lead.data_quality,
            owner: lead.owner,
            created_at: now,
            updated_at: now,
        };
        inner.keys.insert(stored.external_key.clone(), stored.id);
        inner.leads.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn upsert_lead(
        &self,
        record: &ScrapedRecord,
        stage: Stage,
        quality: DataQuality,
        owner: &str,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = inner.keys.get(&record.external_key).copied() {
            let lead = inner.leads.get_mut(&id).expect("key index out of sync");
            record.merge_into(lead);
            lead.updated_at = Utc::now();
            return Ok(UpsertOutcome {
                lead: lead.clone(),
                created: false,
            });
        }

        let now = Utc::now();
        let lead = Lead {
            id: Uuid::now_v7(),
            external_key: record.external_key.clone(),
            display_name: record.display_name.clone(),
            role_title: record.role_title.clone(),
            organization: record.organization.clone(),
            geo_label: record.geo_label.clone(),
            tenure_months: record.tenure_months,
            stage,
            data_quality: quality,
            owner: owner.to_owned(),
            created_at: now,
            updated_at: now,
        };
        inner.keys.insert(lead.external_key.clone(), lead.id);
        inner.leads.insert(lead.id, lead.clone());
        Ok(UpsertOutcome {
            lead,
            created: true,
        })
    }

    async fn lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(self.inner.lock().unwrap().leads.get(&id).cloned())
    }

    async fn lead_by_external_key(&self, key: &str) -> Result<Option<Lead>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .keys
            .get(key)
            .and_then(|id| inner.leads.get(id))
            .cloned())
    }

    async fn list_leads(&self, filter: &LeadFilter, page: Page) -> Result<Vec<Lead>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut leads: Vec<Lead> = inner
            .leads
            .values()
            .filter(|l| filter.stage.map_or(true, |stage| l.stage == stage))
            .filter(|l| filter.owner.as_deref().map_or(true, |o| l.owner == o))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page_slice(leads, page))
    }

    async fn update_lead(&self, id: Uuid, patch: &LeadPatch) -> Result<Option<Lead>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(lead) = inner.leads.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(display_name) = &patch.display_name {
            lead.display_name = display_name.clone();
        }
        if let Some(role_title) = &patch.role_title {
            lead.role_title = Some(role_title.clone());
        }
        if let Some(organization) = &patch.organization {
            lead.organization = Some(organization.clone());
        }
        if let Some(geo_label) = &patch.geo_label {
            lead.geo_label = Some(geo_label.clone());
        }
        if let Some(tenure_months) = patch.tenure_months {
            lead.tenure_months = Some(tenure_months);
        }
        if let Some(stage) = patch.stage {
            lead.stage = stage;
        }
        lead.data_quality = patch.data_quality.unwrap_or_else(|| {
            DataQuality::derive(lead.role_title.as_deref(), lead.organization.as_deref())
        });
        lead.updated_at = Utc::now();
        Ok(Some(lead.clone()))
    }

    async fn advance_stage(
        &self,
        id: Uuid,
        target: Stage,
    ) -> Result<Option<StageAdvance>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(lead) = inner.leads.get_mut(&id) else {
            return Ok(None);
        };
        if target > lead.stage {
            lead.stage = target;
            lead.updated_at = Utc::now();
            Ok(Some(StageAdvance {
                stage_after: target,
                changed: true,
            }))
        } else {
            Ok(Some(StageAdvance {
                stage_after: lead.stage,
                changed: false,
            }))
        }
    }

    async fn append_event(&self, event: NewEvent) -> Result<InteractionEvent, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = InteractionEvent {
            id: Uuid::now_v7(),
            lead_id: event.lead_id,
            actor: event.actor,
            kind: event.kind,
            occurred_at: event.occurred_at,
        };
        inner.events.push(stored.clone());
        Ok(stored)
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: Page,
    ) -> Result<Vec<InteractionEvent>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<InteractionEvent> = inner
            .events
            .iter()
            .filter(|e| filter.lead_id.map_or(true, |id| e.lead_id == id))
            .filter(|e| filter.actor.as_deref().map_or(true, |a| e.actor == a))
            .filter(|e| filter.kind.map_or(true, |kind| e.kind == kind))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(page_slice(events, page))
    }

    async fn insert_task(&self, task: NewTask) -> Result<FollowUpTask, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = FollowUpTask {
            id: Uuid::now_v7(),
            lead_id: task.lead_id,
            owner: task.owner,
            label: task.label,
            due_at: task.due_at,
            status: TaskStatus::Open,
        };
        inner.tasks.push(stored.clone());
        Ok(stored)
    }

    async fn set_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<FollowUpTask>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        task.status = status;
        Ok(Some(task.clone()))
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.tasks.len();
        inner.tasks.retain(|t| t.id != id);
        Ok(inner.tasks.len() < before)
    }

    async fn list_tasks(
        &self,
        filter: &TaskFilter,
        page: Page,
    ) -> Result<Vec<FollowUpTask>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut tasks: Vec<FollowUpTask> = inner
            .tasks
            .iter()
            .filter(|t| filter.lead_id.map_or(true, |id| t.lead_id == id))
            .filter(|t| filter.owner.as_deref().map_or(true, |o| t.owner == o))
            .filter(|t| filter.status.map_or(true, |status| t.status == status))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        Ok(page_slice(tasks, page))
    }

    async fn overdue_tasks(&self, now: DateTime<Utc>) -> Result<Vec<FollowUpTask>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut tasks: Vec<FollowUpTask> = inner
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Open && t.due_at < now)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        Ok(tasks)
    }

    async fn funnel_counts(&self) -> Result<Vec<StageCount>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut counts: HashMap<Stage, i64> = HashMap::new();
        for lead in inner.leads.values() {
            *counts.entry(lead.stage).or_default() += 1;
        }
        let mut counts: Vec<StageCount> = counts
            .into_iter()
            .map(|(stage, count)| StageCount { stage, count })
            .collect();
        counts.sort_by_key(|c| c.stage);
        Ok(counts)
    }
}
