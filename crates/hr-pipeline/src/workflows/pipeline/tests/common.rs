use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::workflows::pipeline::{
    AuditError, AuditEvent, AuditSink, EntityId, PipelineRecord, PipelineRepository,
    PipelineService, RecordUpdate, RepositoryError,
};
use crate::workflows::request::{request_pipeline, RequestStatus};
use crate::workflows::response::{response_pipeline, ResponseStage};

pub(super) type RequestTestService = PipelineService<RequestStatus, MemoryRepository, MemoryAudit>;
pub(super) type ResponseTestService =
    PipelineService<ResponseStage, MemoryRepository, MemoryAudit>;

pub(super) fn build_request_service() -> (
    RequestTestService,
    Arc<MemoryRepository>,
    Arc<MemoryAudit>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let audit = Arc::new(MemoryAudit::default());
    let definition = Arc::new(request_pipeline().expect("request pipeline"));
    let service = PipelineService::new(definition, repository.clone(), audit.clone());
    (service, repository, audit)
}

pub(super) fn build_response_service() -> (
    ResponseTestService,
    Arc<MemoryRepository>,
    Arc<MemoryAudit>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let audit = Arc::new(MemoryAudit::default());
    let definition = Arc::new(response_pipeline().expect("response pipeline"));
    let service = PipelineService::new(definition, repository.clone(), audit.clone());
    (service, repository, audit)
}

pub(super) fn record(id: &str, stage: Option<&str>, mark: Option<usize>) -> PipelineRecord {
    PipelineRecord {
        id: EntityId(id.to_string()),
        stage: stage.map(str::to_string),
        high_water_mark: mark,
        fields: BTreeMap::new(),
        updated_at: None,
    }
}

pub(super) fn seed(
    repository: &MemoryRepository,
    id: &str,
    stage: Option<&str>,
    mark: Option<usize>,
) -> EntityId {
    let stored = repository
        .insert(record(id, stage, mark))
        .expect("seed record");
    stored.id
}

pub(super) fn note(text: &str) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    fields.insert("note".to_string(), Value::from(text));
    fields
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<BTreeMap<EntityId, PipelineRecord>>>,
}

impl MemoryRepository {
    pub(super) fn stored(&self, id: &EntityId) -> PipelineRecord {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
            .expect("record present")
    }

    pub(super) fn contains(&self, id: &EntityId) -> bool {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .contains_key(id)
    }
}

impl PipelineRepository for MemoryRepository {
    fn insert(&self, record: PipelineRecord) -> Result<PipelineRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &EntityId) -> Result<Option<PipelineRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(&self, id: &EntityId, update: RecordUpdate) -> Result<PipelineRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        update.apply_to(record);
        Ok(record.clone())
    }

    fn delete(&self, id: &EntityId) -> Result<bool, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<PipelineRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

/// Memory store whose writes fail for selected ids.
#[derive(Default)]
pub(super) struct FlakyRepository {
    pub(super) inner: MemoryRepository,
    pub(super) failing: HashSet<EntityId>,
}

impl PipelineRepository for FlakyRepository {
    fn insert(&self, record: PipelineRecord) -> Result<PipelineRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn fetch(&self, id: &EntityId) -> Result<Option<PipelineRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn update(&self, id: &EntityId, update: RecordUpdate) -> Result<PipelineRecord, RepositoryError> {
        if self.failing.contains(id) {
            return Err(RepositoryError::Unavailable("write timeout".to_string()));
        }
        self.inner.update(id, update)
    }

    fn delete(&self, id: &EntityId) -> Result<bool, RepositoryError> {
        self.inner.delete(id)
    }

    fn list(&self) -> Result<Vec<PipelineRecord>, RepositoryError> {
        self.inner.list()
    }
}

pub(super) struct UnavailableRepository;

impl PipelineRepository for UnavailableRepository {
    fn insert(&self, _record: PipelineRecord) -> Result<PipelineRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &EntityId) -> Result<Option<PipelineRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _id: &EntityId, _update: RecordUpdate) -> Result<PipelineRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &EntityId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<PipelineRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAudit {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAudit {
    pub(super) fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().expect("audit mutex poisoned").push(event);
        Ok(())
    }
}

pub(super) struct OfflineAudit;

impl AuditSink for OfflineAudit {
    fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("audit collection offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
