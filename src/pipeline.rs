//! Batch pipeline: validate input, authenticate once, process rows, write
//! the augmented spreadsheet plus per-row snapshots.
//!
//! Run-level failures (bad app_id, unreadable file, missing column, auth
//! exhaustion) abort before any row is touched. Row-level failures are data:
//! the row gets a placeholder in its output columns and the batch carries on.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::{Value, json};

use crate::client::AnswerApi;
use crate::config::RunDirs;
use crate::error::PipelineError;
use crate::extract::{answer_text, extract_urls};
use crate::sheet::{self, SheetFormat, Table};
use crate::types::MessageRequest;

/// Scoring columns added to the output for manual evaluation, left blank.
pub const EVALUATION_METRICS: [&str; 10] = [
    "Relevance",
    "Accuracy",
    "Clarity",
    "Tone and Politeness",
    "Completeness",
    "Engagement",
    "User Satisfaction",
    "Bias and Ethical",
    "Cross-Session Continuity",
    "Information Provenance",
];

const QUESTION_COLUMN: &str = "Question";
const TEXT_COLUMN: &str = "Extracted Text";
const URL_COLUMN: &str = "Extracted URL";
const NO_URL: &str = "No URL found";

/// Caller-supplied parameters for one batch run.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub product: String,
    pub version: String,
    /// Raw app_id as received from the caller; validated before the input
    /// file is read.
    pub app_id: String,
    pub session_id: Option<String>,
}

/// Outcome of a completed run. A run that reaches the row loop always
/// completes, even if every row holds an error placeholder.
#[derive(Debug)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub total_rows: usize,
    pub answered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub snapshots: Vec<PathBuf>,
}

/// Run one batch over `input`, writing artifacts into `dirs`.
pub async fn run_batch<A: AnswerApi + Sync>(
    api: &A,
    input: &Path,
    params: &RunParams,
    dirs: &RunDirs,
) -> Result<RunReport, PipelineError> {
    // Validating: app_id first, before the file is even opened.
    let run_app_id = parse_app_id(&params.app_id)?;
    let format = SheetFormat::from_path(input)?;

    let mut table = sheet::read_table(input)?;
    let question_col = table.column_index(QUESTION_COLUMN).ok_or_else(|| {
        PipelineError::Validation(format!(
            "input file must contain a '{}' column",
            QUESTION_COLUMN
        ))
    })?;
    let app_id_col = ensure_app_id_column(&mut table, run_app_id);
    for metric in EVALUATION_METRICS {
        table.ensure_column(metric);
    }
    let text_col = table.ensure_column(TEXT_COLUMN);
    let url_col = table.ensure_column(URL_COLUMN);

    dirs.ensure()?;

    // Authenticating: one token for the whole run.
    let token = api.acquire_token().await?;
    tracing::info!("token obtained, processing {} rows", table.rows.len());

    let mut report = RunReport {
        output_path: PathBuf::new(),
        total_rows: table.rows.len(),
        answered: 0,
        skipped: 0,
        failed: 0,
        snapshots: Vec::new(),
    };

    // ProcessingRows: strictly sequential, one request in flight at a time.
    for idx in 0..table.rows.len() {
        let question = table.cell(idx, question_col).trim().to_string();
        if question.is_empty() {
            tracing::debug!(row = idx + 1, "skipping blank question");
            report.skipped += 1;
            continue;
        }

        let app_id = table
            .cell(idx, app_id_col)
            .trim()
            .parse::<i64>()
            .unwrap_or(run_app_id);

        tracing::info!(
            row = idx + 1,
            total = report.total_rows,
            app_id,
            question = truncate(&question, 80),
            "submitting question"
        );

        let request = MessageRequest {
            message: question.clone(),
            product: params.product.clone(),
            version: params.version.clone(),
            app_id,
            session_id: params.session_id.clone(),
        };

        let response = match api.submit_message(&token.token, &request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(row = idx + 1, error = %e, "request failed");
                table.set_cell(idx, text_col, "Error: API request failed");
                table.set_cell(idx, url_col, NO_URL);
                report.failed += 1;
                continue;
            }
        };

        if !response.is_success() {
            tracing::warn!(row = idx + 1, status = response.status, "error status");
            table.set_cell(
                idx,
                text_col,
                format!("Error: API returned {}", response.status),
            );
            table.set_cell(idx, url_col, NO_URL);
            report.failed += 1;
            continue;
        }

        let body = response.body_json();
        let text = answer_text(&body);
        let urls = extract_urls(&text);

        table.set_cell(idx, text_col, text);
        table.set_cell(
            idx,
            url_col,
            if urls.is_empty() {
                NO_URL.to_string()
            } else {
                urls.join("\n")
            },
        );

        match write_snapshot(&dirs.messages, &question, params, app_id, &body) {
            Ok(path) => report.snapshots.push(path),
            // A failed snapshot does not fail the row; the answer is already
            // in the output table.
            Err(e) => tracing::warn!(row = idx + 1, error = %e, "snapshot not written"),
        }
        report.answered += 1;
    }

    // Finalizing: timestamped output file in the input's (output) format.
    let out_name = format!(
        "processed_{}.{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        format.output_extension()
    );
    let output_path = dirs.output.join(out_name);
    sheet::write_table(&table, &output_path, format)?;
    tracing::info!(path = %output_path.display(), "batch complete");

    report.output_path = output_path;
    Ok(report)
}

/// Validate the caller's app_id. Runs before any file or network I/O.
fn parse_app_id(raw: &str) -> Result<i64, PipelineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Validation(
            "app_id is required".to_string(),
        ));
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| PipelineError::Validation("app_id must be an integer".to_string()))
}

/// Index of the app_id column; when the input has none, a new column is
/// added with the run-level app_id filled into every row.
fn ensure_app_id_column(table: &mut Table, run_app_id: i64) -> usize {
    if let Some(idx) = table.column_index("app_id") {
        return idx;
    }
    let idx = table.ensure_column("app_id");
    for row in 0..table.rows.len() {
        table.set_cell(row, idx, run_app_id.to_string());
    }
    idx
}

/// Persist one answered row as a standalone JSON snapshot.
fn write_snapshot(
    dir: &Path,
    question: &str,
    params: &RunParams,
    app_id: i64,
    response: &Value,
) -> Result<PathBuf, PipelineError> {
    let now = Local::now();
    let sanitized: String = question
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(40)
        .collect();
    let path = dir.join(format!("{}_{}.json", sanitized, now.format("%Y%m%d_%H%M%S")));

    let wrapper = json!({
        "question": question,
        "product": params.product,
        "version": params.version,
        "app_id": app_id,
        "timestamp": now.format("%Y-%m-%d %H:%M:%S").to_string(),
        "response": response,
    });
    std::fs::write(&path, serde_json::to_string_pretty(&wrapper)?)?;
    Ok(path)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
