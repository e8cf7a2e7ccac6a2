//! Board view of responses grouped by interview stage.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

use super::pipeline::{
    AuditSink, EntityId, PipelineRepository, PipelineSnapshot, PipelineStage,
};
use super::response::{ResponseService, ResponseStage};

#[derive(Debug, Clone, Serialize)]
pub struct KanbanBoard {
    pub columns: Vec<KanbanColumn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KanbanColumn {
    pub stage: ResponseStage,
    pub label: &'static str,
    pub cards: Vec<KanbanCard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KanbanCard {
    pub id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub fields: BTreeMap<String, Value>,
    pub updated_at: Option<DateTime<Utc>>,
    pub allowed_stages: Vec<ResponseStage>,
}

impl KanbanBoard {
    /// One column per stage in vocabulary order, empty columns included.
    /// Cards keep the order of `snapshots`.
    pub fn build(snapshots: Vec<PipelineSnapshot<ResponseStage>>) -> Self {
        let mut columns: Vec<KanbanColumn> = ResponseStage::all()
            .iter()
            .map(|stage| KanbanColumn {
                stage: *stage,
                label: stage.label(),
                cards: Vec::new(),
            })
            .collect();

        for snapshot in snapshots {
            let card = KanbanCard {
                request_id: snapshot
                    .fields
                    .get("request_id")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                id: snapshot.id,
                fields: snapshot.fields,
                updated_at: snapshot.updated_at,
                allowed_stages: snapshot.next_stages,
            };
            if let Some(column) = columns
                .iter_mut()
                .find(|column| column.stage == snapshot.stage)
            {
                column.cards.push(card);
            }
        }

        Self { columns }
    }

    pub fn card_count(&self) -> usize {
        self.columns.iter().map(|column| column.cards.len()).sum()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct KanbanQuery {
    #[serde(default)]
    pub request_id: Option<String>,
}

/// `GET /api/v1/kanban`, optionally narrowed to one request with `?request_id=`.
pub fn kanban_router<R, A>(service: Arc<ResponseService<R, A>>) -> Router
where
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route("/api/v1/kanban", get(board_handler::<R, A>))
        .with_state(service)
}

pub(crate) async fn board_handler<R, A>(
    State(service): State<Arc<ResponseService<R, A>>>,
    Query(query): Query<KanbanQuery>,
) -> Result<Json<KanbanBoard>, AppError>
where
    R: PipelineRepository + 'static,
    A: AuditSink + 'static,
{
    let mut snapshots = service.list()?;

    if let Some(request_id) = query.request_id.as_deref() {
        snapshots.retain(|snapshot| {
            snapshot.fields.get("request_id").and_then(Value::as_str) == Some(request_id)
        });
    }
    snapshots.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    Ok(Json(KanbanBoard::build(snapshots)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::pipeline::PipelineRecord;
    use crate::workflows::response::response_pipeline;

    fn snapshot(id: &str, stage: &str, mark: usize) -> PipelineSnapshot<ResponseStage> {
        let definition = response_pipeline().expect("response pipeline");
        let mut fields = BTreeMap::new();
        fields.insert("request_id".to_string(), Value::from("request-000001"));
        let record = PipelineRecord {
            id: EntityId(id.to_string()),
            stage: Some(stage.to_string()),
            high_water_mark: Some(mark),
            fields,
            updated_at: None,
        };
        PipelineSnapshot::from_record(record, &definition)
    }

    #[test]
    fn board_groups_cards_by_stage_and_keeps_empty_columns() {
        let board = KanbanBoard::build(vec![
            snapshot("response-000001", "client_review", 4),
            snapshot("response-000002", "client_review", 4),
            snapshot("response-000003", "rejected", 6),
        ]);

        assert_eq!(board.columns.len(), ResponseStage::all().len());
        assert_eq!(board.card_count(), 3);

        let review = board
            .columns
            .iter()
            .find(|column| column.stage == ResponseStage::ClientReview)
            .expect("client review column");
        assert_eq!(review.cards.len(), 2);
        assert_eq!(review.cards[0].request_id.as_deref(), Some("request-000001"));
        assert_eq!(
            review.cards[0].allowed_stages,
            vec![
                ResponseStage::Precheck,
                ResponseStage::Interview1,
                ResponseStage::CancelledByUs,
                ResponseStage::Rejected,
            ]
        );

        let rejected = board
            .columns
            .iter()
            .find(|column| column.stage == ResponseStage::Rejected)
            .expect("rejected column");
        assert!(rejected.cards[0]
            .allowed_stages
            .contains(&ResponseStage::Interview1));
        assert!(!rejected.cards[0]
            .allowed_stages
            .contains(&ResponseStage::Interview2));
    }
}
