use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lead::{normalize_opt, DataQuality, Lead};

/// One externally observed contact record, as produced by the scraping
/// extension or a manual entry form. Only the shape is trusted, never the
/// provenance: any field may be blank, truncated or stale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapedRecord {
    #[serde(default)]
    pub external_key: String,
    #[serde(default)]
    pub display_name: String,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub geo_label: Option<String>,
    pub tenure_months: Option<i32>,
}

impl ScrapedRecord {
    /// Trim all text fields, drop blanks and out-of-range tenure values.
    /// Merges rely on this: a stored attribute is `NULL` or non-empty.
    pub fn normalized(mut self) -> Self {
        self.external_key = self.external_key.trim().to_string();
        self.display_name = self.display_name.trim().to_string();
        self.role_title = normalize_opt(self.role_title);
        self.organization = normalize_opt(self.organization);
        self.geo_label = normalize_opt(self.geo_label);
        self.tenure_months = self.tenure_months.filter(|months| *months >= 0);
        self
    }

    pub fn validate(&self) -> Result<(), SkipReason> {
        if self.external_key.is_empty() {
            return Err(SkipReason::MissingExternalKey);
        }
        if self.display_name.is_empty() {
            return Err(SkipReason::MissingDisplayName);
        }
        Ok(())
    }

    /// Quality classification of the incoming record, before any merge.
    pub fn quality(&self) -> DataQuality {
        DataQuality::derive(self.role_title.as_deref(), self.organization.as_deref())
    }

    /// Last-non-null-wins merge into an existing lead: a blank incoming
    /// field never erases previously stored data. Quality is reclassified
    /// from the merged attributes. The Postgres store expresses the same
    /// policy in its upsert statement; this is the in-memory counterpart.
    pub fn merge_into(&self, lead: &mut Lead) {
        if !self.display_name.is_empty() {
            lead.display_name = self.display_name.clone();
        }
        if self.role_title.is_some() {
            lead.role_title = self.role_title.clone();
        }
        if self.organization.is_some() {
            lead.organization = self.organization.clone();
        }
        if self.geo_label.is_some() {
            lead.geo_label = self.geo_label.clone();
        }
        if self.tenure_months.is_some() {
            lead.tenure_months = self.tenure_months;
        }
        lead.data_quality =
            DataQuality::derive(lead.role_title.as_deref(), lead.organization.as_deref());
    }
}

/// Why a record was skipped instead of written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingExternalKey,
    MissingDisplayName,
    StoreFailure,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SkipReason::MissingExternalKey => write!(f, "missing external_key"),
            SkipReason::MissingDisplayName => write!(f, "missing display_name"),
            SkipReason::StoreFailure => write!(f, "store write failed"),
        }
    }
}

/// Outcome of ingesting one record. Failures are explicit values folded
/// into the summary, not exceptions discarded by the batch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Created,
    Updated,
    Skipped(SkipReason),
}

/// Aggregate counts returned to the caller. Always honest and partial:
/// records written before a mid-batch failure or cancellation stay written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub total: u64,
}

impl IngestSummary {
    pub fn record(&mut self, outcome: RecordOutcome) {
        self.total += 1;
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::Stage;
    use chrono::Utc;
    use uuid::Uuid;

    fn stored_lead() -> Lead {
        Lead {
            id: Uuid::now_v7(),
            external_key: "https://example.com/in/a".to_string(),
            display_name: "A".to_string(),
            role_title: Some("Engineer".to_string()),
            organization: Some("Acme".to_string()),
            geo_label: None,
            tenure_months: Some(12),
            stage: Stage::Connected,
            data_quality: DataQuality::Complete,
            owner: "sales@example.com".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn validation_requires_key_and_name() {
        let record = ScrapedRecord {
            external_key: "  ".to_string(),
            display_name: "A".to_string(),
            ..Default::default()
        }
        .normalized();
        assert_eq!(record.validate(), Err(SkipReason::MissingExternalKey));

        let record = ScrapedRecord {
            external_key: "https://example.com/in/a".to_string(),
            display_name: String::new(),
            ..Default::default()
        }
        .normalized();
        assert_eq!(record.validate(), Err(SkipReason::MissingDisplayName));
    }

    #[test]
    fn blank_fields_never_erase_stored_data() {
        let mut lead = stored_lead();
        let record = ScrapedRecord {
            external_key: lead.external_key.clone(),
            display_name: String::new(),
            organization: Some("NewCo".to_string()),
            ..Default::default()
        }
        .normalized();

        record.merge_into(&mut lead);

        assert_eq!(lead.display_name, "A");
        assert_eq!(lead.organization.as_deref(), Some("NewCo"));
        assert_eq!(lead.role_title.as_deref(), Some("Engineer"));
        assert_eq!(lead.tenure_months, Some(12));
        assert_eq!(lead.data_quality, DataQuality::Complete);
    }

    #[test]
    fn merge_reclassifies_quality() {
        let mut lead = stored_lead();
        lead.role_title = None;
        lead.data_quality = DataQuality::Partial;

        let record = ScrapedRecord {
            external_key: lead.external_key.clone(),
            display_name: "A".to_string(),
            role_title: Some("VP Engineering".to_string()),
            ..Default::default()
        }
        .normalized();

        record.merge_into(&mut lead);
        assert_eq!(lead.data_quality, DataQuality::Complete);
    }

    #[test]
    fn negative_tenure_is_dropped() {
        let record = ScrapedRecord {
            external_key: "k".to_string(),
            display_name: "A".to_string(),
            tenure_months: Some(-3),
            ..Default::default()
        }
        .normalized();
        assert_eq!(record.tenure_months, None);
    }

    #[test]
    fn summary_tallies_outcomes() {
        let mut summary = IngestSummary::default();
        summary.record(RecordOutcome::Created);
        summary.record(RecordOutcome::Updated);
        summary.record(RecordOutcome::Skipped(SkipReason::MissingDisplayName));
        assert_eq!(
            summary,
            IngestSummary {
                created: 1,
                updated: 1,
                skipped: 1,
                total: 3,
            }
        );
    }
}
