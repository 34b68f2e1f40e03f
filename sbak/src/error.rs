use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced while talking to the Slack Web API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 429. `retry_after` is `None` when the header is absent or malformed.
    #[error("{method} is rate limited")]
    RateLimited {
        method: String,
        retry_after: Option<Duration>,
    },

    /// The response envelope carried `ok: false`.
    #[error("{method} failed: {error}")]
    Slack { method: String, error: String },

    #[error("{method} returned HTTP {status}: {body}")]
    Status {
        method: String,
        status: StatusCode,
        body: String,
    },

    #[error("request to {method} failed")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot decode {method} response")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{method} still rate limited after {attempts} attempts")]
    RetriesExhausted { method: String, attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }
}

/// Run-terminating conditions of the backup engine.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("conversation {id} cannot be resolved")]
    NotFound {
        id: String,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("missing Slack token, pass --token or export SLACK_USER_TOKEN")]
    MissingToken,

    #[error("missing output directory, pass --out or set `out` in the config file")]
    MissingOutputDir,
}

/// True when the error chain was caused by cooperative cancellation.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let api = match cause.downcast_ref::<BackupError>() {
            Some(BackupError::Api(api)) => Some(api),
            _ => cause.downcast_ref::<ApiError>(),
        };
        api.is_some_and(ApiError::is_cancelled)
    })
}
