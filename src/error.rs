// src/error.rs
// One error type for the whole service. Parsing never produces these:
// malformed lines and unknown speakers are absorbed by the transcript engine.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FocusError {
    #[error("roster is empty: add at least one participant before starting")]
    EmptyRoster,

    #[error("topic is empty")]
    EmptyTopic,

    #[error("a run is already in progress")]
    RunInProgress,

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("GOOGLE_GENERATIVE_AI_API_KEY is not set")]
    MissingApiKey,

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("stream transport failed: {0}")]
    Transport(String),

    #[error("malformed upstream payload: {0}")]
    Payload(String),

    #[error("nothing to export: transcript is empty")]
    EmptyTranscript,

    #[error("export failed: {0}")]
    Export(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FocusError {
    pub fn session_not_found(id: &str) -> Self {
        FocusError::NotFound { entity: "session", id: id.to_string() }
    }

    pub fn participant_not_found(id: &str) -> Self {
        FocusError::NotFound { entity: "participant", id: id.to_string() }
    }
}

impl From<reqwest::Error> for FocusError {
    fn from(err: reqwest::Error) -> Self {
        FocusError::Transport(err.to_string())
    }
}

impl From<csv::Error> for FocusError {
    fn from(err: csv::Error) -> Self {
        FocusError::Export(err.to_string())
    }
}

impl ResponseError for FocusError {
    fn status_code(&self) -> StatusCode {
        match self {
            FocusError::EmptyRoster
            | FocusError::EmptyTopic
            | FocusError::EmptyTranscript => StatusCode::BAD_REQUEST,
            FocusError::NotFound { .. } => StatusCode::NOT_FOUND,
            FocusError::RunInProgress => StatusCode::CONFLICT,
            FocusError::Upstream { .. }
            | FocusError::Transport(_)
            | FocusError::Payload(_) => StatusCode::BAD_GATEWAY,
            FocusError::MissingApiKey
            | FocusError::Export(_)
            | FocusError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.to_string() }))
    }
}
