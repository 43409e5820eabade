use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Funnel position of a lead.
///
/// Variant order is the funnel order, relied on both by the Rust `Ord` derive
/// and by the `lead_stage` enum type in Postgres (labels are declared in the
/// same order, so `stage < $1` comparisons agree across both layers).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "lead_stage", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    Invited,
    Connected,
    Messaged,
    Replied,
    Meeting,
}

/// Completeness classification of a lead's descriptive attributes.
///
/// Derived from the stored attributes everywhere except the edit path, where
/// a caller may set it explicitly (e.g. to flag a lead for enrichment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "data_quality", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    Complete,
    Partial,
    NeedsEnrichment,
}

impl DataQuality {
    /// A lead is `Complete` iff both role title and organization are known.
    pub fn derive(role_title: Option<&str>, organization: Option<&str>) -> Self {
        match (non_blank(role_title), non_blank(organization)) {
            (true, true) => DataQuality::Complete,
            _ => DataQuality::Partial,
        }
    }
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// A tracked external contact moving through the outreach funnel.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Lead {
    pub id: Uuid,
    /// Canonical externally observed identity (e.g. a profile URL).
    /// Unique across all leads, the natural key for deduplication.
    pub external_key: String,
    pub display_name: String,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub geo_label: Option<String>,
    pub tenure_months: Option<i32>,
    pub stage: Stage,
    pub data_quality: DataQuality,
    /// Actor that created or claims the lead. Advisory, not an access
    /// control boundary.
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A lead ready for insertion, with stage and quality already decided.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub external_key: String,
    pub display_name: String,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub geo_label: Option<String>,
    pub tenure_months: Option<i32>,
    pub stage: Stage,
    pub data_quality: DataQuality,
    pub owner: String,
}

/// Typed edit request, one optional field per mutable attribute.
///
/// A provided field overwrites the stored value, an omitted field is left
/// untouched; there is no way to clear a field through an edit. A provided
/// `stage` is applied verbatim, bypassing the monotonic advance rule — the
/// administrative correction path, deliberately separate from event
/// processing. A provided `data_quality` suppresses the automatic
/// reclassification for this edit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPatch {
    pub display_name: Option<String>,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub geo_label: Option<String>,
    pub tenure_months: Option<i32>,
    pub stage: Option<Stage>,
    pub data_quality: Option<DataQuality>,
}

impl LeadPatch {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.role_title.is_none()
            && self.organization.is_none()
            && self.geo_label.is_none()
            && self.tenure_months.is_none()
            && self.stage.is_none()
            && self.data_quality.is_none()
    }
}

/// Normalize an optional text field: trim, map empty to `None`.
/// Stored optional attributes are always `NULL` or non-empty, never `""`.
pub(crate) fn normalize_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
