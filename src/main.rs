// src/main.rs

use std::process::ExitCode;

use flowwatch::{cli, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    // Without a subscriber there is nowhere to report through tracing.
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("flowwatch: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("flowwatch failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
