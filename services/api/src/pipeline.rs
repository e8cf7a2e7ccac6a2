use crate::infra::{load_export, read_export, ExportEntry, InMemoryPipelineRepository};
use clap::{Args, ValueEnum};
use hr_pipeline::error::AppError;
use hr_pipeline::workflows::pipeline::{
    backfill, evaluate, next_states, BackfillReport, PipelineDefinition, PipelineRepository,
    PipelineStage, TransitionDecision,
};
use hr_pipeline::workflows::request::request_pipeline;
use hr_pipeline::workflows::response::response_pipeline;
use serde_json::Value;
use std::path::PathBuf;

const STAGE_KEYS: [&str; 2] = ["status", "stage"];
const MARK_KEYS: [&str; 2] = ["high_water_mark", "max_stage"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Workflow {
    Request,
    Response,
}

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    #[arg(long, value_enum)]
    pub(crate) workflow: Workflow,
    /// Current stage key
    #[arg(long)]
    pub(crate) from: String,
    /// Requested stage key
    #[arg(long)]
    pub(crate) to: String,
    /// High-water mark; defaults to the rank of the current stage
    #[arg(long)]
    pub(crate) mark: Option<usize>,
}

#[derive(Args, Debug)]
pub(crate) struct NextArgs {
    #[arg(long, value_enum)]
    pub(crate) workflow: Workflow,
    #[arg(long)]
    pub(crate) stage: String,
    /// High-water mark; defaults to the rank of the stage
    #[arg(long)]
    pub(crate) mark: Option<usize>,
}

#[derive(Args, Debug)]
pub(crate) struct BackfillArgs {
    #[arg(long, value_enum)]
    pub(crate) workflow: Workflow,
    /// JSON array of stored records
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Where to write the repaired records (defaults to stdout)
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_check(args: CheckArgs) -> Result<(), AppError> {
    let rendered = match args.workflow {
        Workflow::Request => {
            let definition = request_pipeline()?;
            render_decision(&definition, &args, check(&definition, &args)?)
        }
        Workflow::Response => {
            let definition = response_pipeline()?;
            render_decision(&definition, &args, check(&definition, &args)?)
        }
    };
    println!("{rendered}");
    Ok(())
}

pub(crate) fn run_next(args: NextArgs) -> Result<(), AppError> {
    let stages = match args.workflow {
        Workflow::Request => next_keys(&request_pipeline()?, &args)?,
        Workflow::Response => next_keys(&response_pipeline()?, &args)?,
    };

    if stages.is_empty() {
        println!("{} has no outgoing transitions", args.stage);
    } else {
        println!("Allowed from {}:", args.stage);
        for stage in stages {
            println!("  - {stage}");
        }
    }
    Ok(())
}

pub(crate) fn run_backfill(args: BackfillArgs) -> Result<(), AppError> {
    let entries = read_export(&args.input)?;

    let (report, repaired) = match args.workflow {
        Workflow::Request => backfill_export(&request_pipeline()?, entries)?,
        Workflow::Response => backfill_export(&response_pipeline()?, entries)?,
    };

    let output = serde_json::to_string_pretty(&repaired)?;
    match args.output {
        Some(path) => std::fs::write(path, output)?,
        None => println!("{output}"),
    }

    eprintln!(
        "Backfill scanned {} records, updated {}, failed {}",
        report.scanned,
        report.updated,
        report.failures.len()
    );
    for failure in &report.failures {
        eprintln!("  - {}: {}", failure.id, failure.error);
    }
    Ok(())
}

fn parse_stage<S: PipelineStage>(
    definition: &PipelineDefinition<S>,
    key: &str,
) -> Result<S, AppError> {
    S::from_key(key).ok_or_else(|| AppError::UnknownStage {
        workflow: definition.entity_type(),
        key: key.to_string(),
    })
}

fn default_mark<S: PipelineStage>(definition: &PipelineDefinition<S>, stage: S) -> usize {
    definition.index_of(stage).unwrap_or(0)
}

fn check<S: PipelineStage>(
    definition: &PipelineDefinition<S>,
    args: &CheckArgs,
) -> Result<TransitionDecision, AppError> {
    let from = parse_stage(definition, &args.from)?;
    let to = parse_stage(definition, &args.to)?;
    let mark = args.mark.unwrap_or_else(|| default_mark(definition, from));
    Ok(evaluate(definition, from, mark, to))
}

fn render_decision<S: PipelineStage>(
    definition: &PipelineDefinition<S>,
    args: &CheckArgs,
    decision: TransitionDecision,
) -> String {
    let header = format!("{} {} -> {}", definition.entity_type(), args.from, args.to);
    match decision.reason {
        None => format!(
            "{header}: allowed (high-water mark {})",
            decision.new_high_water_mark
        ),
        Some(reason) => format!("{header}: rejected ({reason})"),
    }
}

fn next_keys<S: PipelineStage>(
    definition: &PipelineDefinition<S>,
    args: &NextArgs,
) -> Result<Vec<&'static str>, AppError> {
    let stage = parse_stage(definition, &args.stage)?;
    let mark = args.mark.unwrap_or_else(|| default_mark(definition, stage));
    Ok(next_states(definition, stage, mark)
        .into_iter()
        .map(PipelineStage::key)
        .collect())
}

/// Repairs an export in place: entries keep their order and keys, and only the
/// pipeline fields the backfill filled in are written back.
fn backfill_export<S: PipelineStage>(
    definition: &PipelineDefinition<S>,
    entries: Vec<ExportEntry>,
) -> Result<(BackfillReport, Vec<ExportEntry>), AppError> {
    let repository = InMemoryPipelineRepository::default();
    let ids = load_export(&repository, &entries)?;
    let report = backfill(definition, &repository)?;

    let mut repaired = Vec::with_capacity(entries.len());
    for (mut entry, id) in entries.into_iter().zip(ids) {
        if let Some(stored) = repository.fetch(&id)? {
            if let Some(stage) = stored.stage {
                write_back(&mut entry, &STAGE_KEYS, definition.stage_field(), Value::from(stage));
            }
            if let Some(mark) = stored.high_water_mark {
                write_back(&mut entry, &MARK_KEYS, "high_water_mark", Value::from(mark));
            }
        }
        repaired.push(entry);
    }
    Ok((report, repaired))
}

/// Stores `value` under whichever alias the entry already uses.
fn write_back(entry: &mut ExportEntry, aliases: &[&str], default_key: &str, value: Value) {
    let key = aliases
        .iter()
        .copied()
        .find(|key| entry.contains_key(*key))
        .unwrap_or(default_key);
    if entry.get(key) != Some(&value) {
        entry.insert(key.to_string(), value);
    }
}
