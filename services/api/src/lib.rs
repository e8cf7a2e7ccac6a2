mod cli;
mod infra;
mod pipeline;
mod routes;
mod server;

use hr_pipeline::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
