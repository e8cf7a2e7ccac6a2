use crate::pipeline::{run_backfill, run_check, run_next, BackfillArgs, CheckArgs, NextArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use hr_pipeline::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "hr-pipeline-api",
    about = "Serve and inspect the request and response hiring pipelines",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Query the pipeline rules or repair stored records offline
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PipelineCommand {
    /// Evaluate a single transition and print the decision
    Check(CheckArgs),
    /// List the stages reachable from a position
    Next(NextArgs),
    /// Fill in missing stages and high-water marks in a JSON export
    Backfill(BackfillArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Pipeline { command } => match command {
            PipelineCommand::Check(args) => run_check(args),
            PipelineCommand::Next(args) => run_next(args),
            PipelineCommand::Backfill(args) => run_backfill(args),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Workflow;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["hr-pipeline-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn pipeline_check_parses_workflow_and_stages() {
        let cli = Cli::try_parse_from([
            "hr-pipeline-api",
            "pipeline",
            "check",
            "--workflow",
            "request",
            "--from",
            "interview_2",
            "--to",
            "cancelled_by_us",
            "--mark",
            "7",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Pipeline {
                command: PipelineCommand::Check(args),
            }) => {
                assert_eq!(args.workflow, Workflow::Request);
                assert_eq!(args.from, "interview_2");
                assert_eq!(args.mark, Some(7));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_workflow_is_refused() {
        let parsed = Cli::try_parse_from([
            "hr-pipeline-api",
            "pipeline",
            "next",
            "--workflow",
            "candidate",
            "--stage",
            "new",
        ]);
        assert!(parsed.is_err());
    }
}
