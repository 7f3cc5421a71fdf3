pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod sheet;
pub mod token;
pub mod types;

pub use client::{AnswerApi, QaApiClient};
pub use config::{ApiConfig, Credentials, RunDirs};
pub use error::{AuthAttempt, PipelineError};
pub use pipeline::{EVALUATION_METRICS, RunParams, RunReport, run_batch};
pub use types::{MessageRequest, MessageResponse, TokenResult};
