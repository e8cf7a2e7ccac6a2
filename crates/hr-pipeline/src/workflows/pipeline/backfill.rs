use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::definition::{PipelineDefinition, PipelineStage};
use super::record::{EntityId, PipelineRepository, RecordUpdate, RepositoryError, StoredStage};

/// Summary of one backfill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub updated: usize,
    pub failures: Vec<BackfillFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillFailure {
    pub id: EntityId,
    pub error: String,
}

/// Give legacy records a stage and high-water mark.
///
/// Absent or unrecognized stages become the entry stage; an absent mark becomes the
/// rank of the (possibly defaulted) stage, or 0 for unranked stages. Records that
/// already carry both are left alone, so a second pass changes nothing. A failed
/// write is reported and the pass moves on.
pub fn backfill<S, R>(
    definition: &PipelineDefinition<S>,
    repository: &R,
) -> Result<BackfillReport, RepositoryError>
where
    S: PipelineStage,
    R: PipelineRepository + ?Sized,
{
    let records = repository.list()?;
    let mut report = BackfillReport {
        scanned: records.len(),
        ..BackfillReport::default()
    };

    for record in records {
        let position = record.resolve(definition);
        if !position.needs_backfill() {
            continue;
        }

        let stage = match position.stored {
            StoredStage::Recognized(_) => None,
            StoredStage::Missing | StoredStage::Malformed(_) => {
                Some(position.stage.key().to_string())
            }
        };
        let high_water_mark = position.mark_missing.then_some(position.high_water_mark);
        let update = RecordUpdate {
            stage,
            high_water_mark,
            fields: BTreeMap::new(),
            updated_at: Utc::now(),
        };

        match repository.update(&record.id, update) {
            Ok(_) => report.updated += 1,
            Err(err) => {
                warn!(
                    entity = definition.entity_type(),
                    id = %record.id,
                    error = %err,
                    "backfill skipped record"
                );
                report.failures.push(BackfillFailure {
                    id: record.id,
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        entity = definition.entity_type(),
        scanned = report.scanned,
        updated = report.updated,
        failed = report.failures.len(),
        "backfill finished"
    );
    Ok(report)
}
