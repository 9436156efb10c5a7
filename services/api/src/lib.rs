mod cli;
mod infra;
mod jobs;
mod routes;
mod server;

use applicant_notify::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
