//! Error taxonomy for the batch harness.
//!
//! Validation, format, and auth failures abort a run; row-level failures are
//! never surfaced as errors at all — they become placeholder text in the output
//! row, so a run that reaches the row loop always produces an output file.

use thiserror::Error;

/// One token-endpoint attempt, kept for AuthError diagnostics.
#[derive(Debug, Clone)]
pub struct AuthAttempt {
    /// Shape label, e.g. `form:oauth-password` or `json:data`.
    pub shape: &'static str,
    /// HTTP status, when the request got a response at all.
    pub status: Option<u16>,
    /// Transport error or extraction note for this attempt.
    pub detail: Option<String>,
}

impl std::fmt::Display for AuthAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.status, &self.detail) {
            (Some(status), None) => write!(f, "{} => {}", self.shape, status),
            (Some(status), Some(detail)) => write!(f, "{} => {} ({})", self.shape, status, detail),
            (None, Some(detail)) => write!(f, "{} => {}", self.shape, detail),
            (None, None) => write!(f, "{} => no response", self.shape),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad input from the caller: missing column, bad app_id, missing env.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Input file extension we cannot read.
    #[error("unsupported file format: {0} (use .xlsx/.xls or .csv)")]
    UnsupportedFormat(String),

    /// Every candidate payload shape was tried and none yielded a token.
    #[error("failed to obtain token after {} attempts: [{}]", .attempts.len(), format_attempts(.attempts))]
    Auth { attempts: Vec<AuthAttempt> },

    /// Spreadsheet could not be read or written.
    #[error("spreadsheet error: {0}")]
    Sheet(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_attempts(attempts: &[AuthAttempt]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_lists_attempted_shapes() {
        let err = PipelineError::Auth {
            attempts: vec![
                AuthAttempt {
                    shape: "form:oauth-password",
                    status: Some(401),
                    detail: None,
                },
                AuthAttempt {
                    shape: "json:flat",
                    status: None,
                    detail: Some("connection refused".to_string()),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 attempts"));
        assert!(msg.contains("form:oauth-password => 401"));
        assert!(msg.contains("json:flat => connection refused"));
    }
}
