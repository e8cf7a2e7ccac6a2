use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::definition::{PipelineDefinition, PipelineStage};
use super::reachability::next_states;

/// Opaque key of a tracked request or response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored shape of a tracked entity.
///
/// The stage is kept as the raw stored string so legacy or unrecognized values
/// survive until the backfill pass repairs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: EntityId,
    #[serde(default, alias = "status")]
    pub stage: Option<String>,
    #[serde(default, alias = "max_stage")]
    pub high_water_mark: Option<usize>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Every other top-level key of the stored document.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl PipelineRecord {
    /// Read the pipeline position, substituting defaults for absent or unrecognized values.
    pub fn resolve<S: PipelineStage>(&self, definition: &PipelineDefinition<S>) -> ResolvedPosition<S> {
        let stored = match self.stage.as_deref() {
            None => StoredStage::Missing,
            Some(raw) => match S::from_key(raw) {
                Some(stage) => StoredStage::Recognized(stage),
                None => StoredStage::Malformed(raw.to_string()),
            },
        };

        let stage = match &stored {
            StoredStage::Recognized(stage) => *stage,
            StoredStage::Missing | StoredStage::Malformed(_) => definition.entry(),
        };

        let high_water_mark = self
            .high_water_mark
            .unwrap_or_else(|| definition.index_of(stage).unwrap_or(0));

        ResolvedPosition {
            stage,
            high_water_mark,
            stored,
            mark_missing: self.high_water_mark.is_none(),
        }
    }
}

/// How the stored stage value relates to the workflow vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredStage<S> {
    Recognized(S),
    Missing,
    /// Stored value is not a member of the vocabulary.
    Malformed(String),
}

/// Effective stage and mark used for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPosition<S> {
    pub stage: S,
    pub high_water_mark: usize,
    pub stored: StoredStage<S>,
    pub mark_missing: bool,
}

impl<S> ResolvedPosition<S> {
    pub fn needs_backfill(&self) -> bool {
        self.mark_missing || !matches!(self.stored, StoredStage::Recognized(_))
    }
}

/// Single logical write applied to a stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub stage: Option<String>,
    pub high_water_mark: Option<usize>,
    pub fields: BTreeMap<String, Value>,
    pub updated_at: DateTime<Utc>,
}

impl RecordUpdate {
    pub fn apply_to(self, record: &mut PipelineRecord) {
        if let Some(stage) = self.stage {
            record.stage = Some(stage);
        }
        if let Some(mark) = self.high_water_mark {
            record.high_water_mark = Some(mark);
        }
        record.fields.extend(self.fields);
        record.updated_at = Some(self.updated_at);
    }
}

/// Storage abstraction so the service can be exercised in isolation.
pub trait PipelineRepository: Send + Sync {
    fn insert(&self, record: PipelineRecord) -> Result<PipelineRecord, RepositoryError>;
    fn fetch(&self, id: &EntityId) -> Result<Option<PipelineRecord>, RepositoryError>;
    fn update(&self, id: &EntityId, update: RecordUpdate) -> Result<PipelineRecord, RepositoryError>;
    fn delete(&self, id: &EntityId) -> Result<bool, RepositoryError>;
    fn list(&self) -> Result<Vec<PipelineRecord>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Append-only record of a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub entity_type: String,
    pub entity_id: EntityId,
    pub action: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outbound hook receiving audit events (database collection, log shipper, ...).
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Public view of an entity: effective stage, mark, and the stages it may move to.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSnapshot<S: PipelineStage> {
    pub id: EntityId,
    pub stage: S,
    pub high_water_mark: usize,
    pub fields: BTreeMap<String, Value>,
    pub updated_at: Option<DateTime<Utc>>,
    pub next_stages: Vec<S>,
    stage_field: &'static str,
}

impl<S: PipelineStage> PipelineSnapshot<S> {
    pub fn from_record(record: PipelineRecord, definition: &PipelineDefinition<S>) -> Self {
        let position = record.resolve(definition);
        Self {
            next_stages: next_states(definition, position.stage, position.high_water_mark),
            id: record.id,
            stage: position.stage,
            high_water_mark: position.high_water_mark,
            fields: record.fields,
            updated_at: record.updated_at,
            stage_field: definition.stage_field(),
        }
    }
}

impl<S: PipelineStage> Serialize for PipelineSnapshot<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut state = serializer.serialize_struct("PipelineSnapshot", 6)?;
        state.serialize_field("id", &self.id.0)?;
        state.serialize_field(self.stage_field, &self.stage)?;
        state.serialize_field("high_water_mark", &self.high_water_mark)?;
        state.serialize_field("fields", &self.fields)?;
        state.serialize_field("updated_at", &self.updated_at)?;
        state.serialize_field("next_stages", &self.next_stages)?;
        state.end()
    }
}
