use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qa_batch_rs::{ApiConfig, QaApiClient, RunDirs, RunParams, run_batch};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qa_batch_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!(
            "Usage: {} <input-file> <product> <version> <app_id> [session_id]",
            args[0]
        );
        eprintln!("  input-file: questions spreadsheet (.csv, .xls, .xlsx) with a 'Question' column");
        eprintln!("  app_id: integer backend application id (per-row app_id column overrides it)");
        eprintln!();
        eprintln!("Environment: API_USERNAME, API_PASSWORD (required); API_BASE_URL,");
        eprintln!("  API_TOKEN_PATH, API_MESSAGE_PATH, API_CLIENT_ID, QA_OUTPUT_DIR,");
        eprintln!("  QA_MESSAGES_DIR (optional overrides)");
        std::process::exit(1);
    }

    let input = Path::new(&args[1]);
    let params = RunParams {
        product: args[2].clone(),
        version: args[3].clone(),
        app_id: args[4].clone(),
        session_id: args.get(5).cloned(),
    };

    let config = ApiConfig::from_env().context("Incomplete API configuration")?;
    let dirs = RunDirs::from_env();
    let client = QaApiClient::new(config).context("Failed to build HTTP client")?;

    let report = run_batch(&client, input, &params, &dirs)
        .await
        .context("Batch run failed")?;

    println!("Processed file: {}", report.output_path.display());
    println!(
        "Rows: {} total, {} answered, {} skipped, {} failed",
        report.total_rows, report.answered, report.skipped, report.failed
    );
    println!("Snapshots written: {}", report.snapshots.len());

    Ok(())
}
