use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::backfill::{backfill, BackfillReport};
use super::definition::{PipelineDefinition, PipelineStage};
use super::evaluator::{evaluate, RejectionReason};
use super::reachability::next_states;
use super::record::{
    AuditError, AuditEvent, AuditSink, EntityId, PipelineRecord, PipelineRepository,
    PipelineSnapshot, RecordUpdate, RepositoryError, StoredStage,
};

/// Orchestrates load -> evaluate -> write -> audit for one workflow.
///
/// Each call performs a single read followed by a single write. Two concurrent
/// transitions on the same entity can both evaluate against the same stale
/// record; repositories that need stronger guarantees must enforce them in
/// [`PipelineRepository::update`].
pub struct PipelineService<S: PipelineStage, R, A> {
    definition: Arc<PipelineDefinition<S>>,
    repository: Arc<R>,
    audit: Arc<A>,
    sequence: AtomicU64,
}

impl<S, R, A> PipelineService<S, R, A>
where
    S: PipelineStage,
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    pub fn new(definition: Arc<PipelineDefinition<S>>, repository: Arc<R>, audit: Arc<A>) -> Self {
        Self {
            definition,
            repository,
            audit,
            sequence: AtomicU64::new(1),
        }
    }

    pub fn definition(&self) -> &PipelineDefinition<S> {
        &self.definition
    }

    fn next_id(&self) -> EntityId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        EntityId(format!("{}-{id:06}", self.definition.entity_type()))
    }

    fn action(&self, verb: &str) -> String {
        format!("{}_{verb}", self.definition.entity_type())
    }

    fn load(&self, id: &EntityId) -> Result<PipelineRecord, PipelineServiceError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| self.not_found(id))
    }

    fn not_found(&self, id: &EntityId) -> PipelineServiceError {
        PipelineServiceError::NotFound {
            entity: self.definition.entity_type(),
            id: id.clone(),
        }
    }

    /// Store a new entity at the entry stage.
    pub fn create(
        &self,
        fields: BTreeMap<String, Value>,
    ) -> Result<PipelineSnapshot<S>, PipelineServiceError> {
        let now = Utc::now();
        let entry = self.definition.entry();
        let record = PipelineRecord {
            id: self.next_id(),
            stage: Some(entry.key().to_string()),
            high_water_mark: Some(self.definition.entry_rank()),
            fields,
            updated_at: Some(now),
        };

        let stored = self.repository.insert(record)?;
        self.audit.record(AuditEvent {
            entity_type: self.definition.entity_type().to_string(),
            entity_id: stored.id.clone(),
            action: self.action("created"),
            from: None,
            to: Some(entry.key().to_string()),
            timestamp: now,
        })?;

        info!(entity = self.definition.entity_type(), id = %stored.id, "created");
        Ok(PipelineSnapshot::from_record(stored, &self.definition))
    }

    pub fn get(&self, id: &EntityId) -> Result<PipelineSnapshot<S>, PipelineServiceError> {
        let record = self.load(id)?;
        Ok(PipelineSnapshot::from_record(record, &self.definition))
    }

    pub fn list(&self) -> Result<Vec<PipelineSnapshot<S>>, PipelineServiceError> {
        let records = self.repository.list()?;
        Ok(records
            .into_iter()
            .map(|record| PipelineSnapshot::from_record(record, &self.definition))
            .collect())
    }

    /// Stages the entity may move to from where it currently stands.
    pub fn next_stages(&self, id: &EntityId) -> Result<Vec<S>, PipelineServiceError> {
        let record = self.load(id)?;
        let position = record.resolve(&self.definition);
        Ok(next_states(
            &self.definition,
            position.stage,
            position.high_water_mark,
        ))
    }

    /// Move an entity to `target` and persist `fields` in the same write.
    ///
    /// `target = None` only updates fields. A rejected transition writes nothing.
    /// Re-applying the current stage with no fields is a no-op without an audit event.
    pub fn apply_transition(
        &self,
        id: &EntityId,
        target: Option<S>,
        fields: BTreeMap<String, Value>,
    ) -> Result<PipelineSnapshot<S>, PipelineServiceError> {
        let record = self.load(id)?;
        let position = record.resolve(&self.definition);
        if let StoredStage::Malformed(raw) = &position.stored {
            warn!(
                entity = self.definition.entity_type(),
                %id,
                stored = %raw,
                "unrecognized stored stage, evaluating from entry stage"
            );
        }

        let now = Utc::now();
        let current = position.stage;
        let mut update = RecordUpdate {
            stage: None,
            high_water_mark: None,
            fields,
            updated_at: now,
        };
        let mut moved_to = None;

        if let Some(target) = target {
            let decision = evaluate(
                &self.definition,
                current,
                position.high_water_mark,
                target,
            );
            if !decision.allowed {
                let reason = decision.reason.unwrap_or(RejectionReason::NotPermitted);
                debug!(
                    entity = self.definition.entity_type(),
                    %id,
                    from = current.key(),
                    to = target.key(),
                    %reason,
                    "transition rejected"
                );
                return Err(PipelineServiceError::InvalidTransition {
                    from: current.key(),
                    to: target.key(),
                    reason,
                });
            }

            if target != current {
                update.stage = Some(target.key().to_string());
                update.high_water_mark = Some(decision.new_high_water_mark);
                moved_to = Some(target);
            }
        }

        if update.stage.is_none() && update.fields.is_empty() {
            return Ok(PipelineSnapshot::from_record(record, &self.definition));
        }

        let stored = self.repository.update(id, update).map_err(|err| match err {
            RepositoryError::NotFound => self.not_found(id),
            other => other.into(),
        })?;

        if let Some(target) = moved_to {
            self.audit.record(AuditEvent {
                entity_type: self.definition.entity_type().to_string(),
                entity_id: id.clone(),
                action: self.action(&format!("{}_changed", self.definition.stage_field())),
                from: Some(current.key().to_string()),
                to: Some(target.key().to_string()),
                timestamp: now,
            })?;
            info!(
                entity = self.definition.entity_type(),
                %id,
                from = current.key(),
                to = target.key(),
                "transition applied"
            );
        }

        Ok(PipelineSnapshot::from_record(stored, &self.definition))
    }

    pub fn delete(&self, id: &EntityId) -> Result<(), PipelineServiceError> {
        let record = self.load(id)?;
        if !self.repository.delete(id)? {
            return Err(self.not_found(id));
        }

        self.audit.record(AuditEvent {
            entity_type: self.definition.entity_type().to_string(),
            entity_id: id.clone(),
            action: self.action("deleted"),
            from: record.stage,
            to: None,
            timestamp: Utc::now(),
        })?;
        Ok(())
    }

    /// Run the backfill pass over this workflow's repository.
    pub fn backfill(&self) -> Result<BackfillReport, PipelineServiceError> {
        Ok(backfill(&self.definition, self.repository.as_ref())?)
    }
}

/// Error raised by the pipeline service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: EntityId },
    #[error("cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
        reason: RejectionReason,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl PipelineServiceError {
    pub fn rejection(&self) -> Option<RejectionReason> {
        match self {
            Self::InvalidTransition { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
