use hr_pipeline::error::AppError;
use hr_pipeline::workflows::pipeline::{
    AuditError, AuditEvent, AuditSink, EntityId, PipelineRecord, PipelineRepository,
    RecordUpdate, RepositoryError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local record store shared by the HTTP handlers.
#[derive(Default, Clone)]
pub(crate) struct InMemoryPipelineRepository {
    records: Arc<Mutex<BTreeMap<EntityId, PipelineRecord>>>,
}

impl InMemoryPipelineRepository {
    fn guard(&self) -> Result<MutexGuard<'_, BTreeMap<EntityId, PipelineRecord>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("record store lock poisoned".to_string()))
    }
}

impl PipelineRepository for InMemoryPipelineRepository {
    fn insert(&self, record: PipelineRecord) -> Result<PipelineRecord, RepositoryError> {
        let mut guard = self.guard()?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &EntityId) -> Result<Option<PipelineRecord>, RepositoryError> {
        Ok(self.guard()?.get(id).cloned())
    }

    fn update(&self, id: &EntityId, update: RecordUpdate) -> Result<PipelineRecord, RepositoryError> {
        let mut guard = self.guard()?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        update.apply_to(record);
        Ok(record.clone())
    }

    fn delete(&self, id: &EntityId) -> Result<bool, RepositoryError> {
        Ok(self.guard()?.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<PipelineRecord>, RepositoryError> {
        Ok(self.guard()?.values().cloned().collect())
    }
}

/// One stored document as it appears in a JSON export.
pub(crate) type ExportEntry = Map<String, Value>;

pub(crate) fn read_export(path: &Path) -> Result<Vec<ExportEntry>, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Inserts every entry into `repository` and returns the ids in export order.
pub(crate) fn load_export<R: PipelineRepository>(
    repository: &R,
    entries: &[ExportEntry],
) -> Result<Vec<EntityId>, AppError> {
    entries
        .iter()
        .map(|entry| {
            let record: PipelineRecord = serde_json::from_value(Value::Object(entry.clone()))?;
            Ok(repository.insert(record)?.id)
        })
        .collect()
}

/// Keeps audit events in memory and mirrors them to the log.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        info!(
            entity = %event.entity_type,
            id = %event.entity_id,
            action = %event.action,
            from = event.from.as_deref().unwrap_or("-"),
            to = event.to.as_deref().unwrap_or("-"),
            "audit"
        );
        self.events
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

impl InMemoryAuditSink {
    #[cfg(test)]
    pub(crate) fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }
}
