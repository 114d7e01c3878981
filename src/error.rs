use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// A present field could not be cast to the numeric type its slot needs.
#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("could not convert {field}={value} to float")]
    NotFloat { field: String, value: String },
    #[error("could not convert {field}={value} to integer")]
    NotInteger { field: String, value: String },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model does not support probabilities")]
    ProbabilitiesUnsupported,
    #[error("model returned unknown class {0}")]
    UnknownClass(i64),
}

#[derive(Debug, Error)]
pub enum BulkError {
    #[error("could not read spreadsheet: {0}")]
    Read(String),
    #[error("spreadsheet has no worksheet")]
    NoSheet,
    #[error("missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("could not write results: {0}")]
    Write(String),
}

impl From<calamine::Error> for BulkError {
    fn from(e: calamine::Error) -> Self {
        BulkError::Read(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for BulkError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        BulkError::Write(e.to_string())
    }
}

/// Everything a handler can report. Always sent as `{"error": ...}` with a
/// 200 status; clients inspect the payload, not the status line.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} model is not loaded")]
    ModelUnavailable(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Bulk(#[from] BulkError),
    #[error("file not found")]
    NotFound,
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(msg) => tracing::error!("internal error: {}", msg),
            ApiError::Bulk(BulkError::Write(msg)) => tracing::error!("result write failed: {}", msg),
            other => tracing::debug!("request failed: {}", other),
        }
        (StatusCode::OK, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_names() {
        let e = BulkError::MissingColumns(vec!["speed".into(), "v/c".into()]);
        assert_eq!(e.to_string(), "missing columns: speed, v/c");
    }

    #[test]
    fn test_api_error_is_200_with_error_payload() {
        let resp = ApiError::NotFound.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
