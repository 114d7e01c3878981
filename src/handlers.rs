use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        Path, State,
    },
    http::{header, HeaderValue},
    response::{Html, IntoResponse, Response},
    Json,
};
use std::path::{Component, Path as FsPath, PathBuf};

use crate::app::AppState;
use crate::bulk::{self, BulkSummary};
use crate::error::{ApiError, ApiResult};
use crate::types::{HealthOut, InputRecord, TrafficPrediction};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const UPLOAD_FIELD: &str = "file";

pub async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    let models = state.predictor.models();
    Json(HealthOut {
        status: "ok",
        jam_model: models.traffic.status(),
        day_model: models.day_type.status(),
    })
}

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../templates/index.html"))
}

pub async fn predict_traffic(
    State(state): State<AppState>,
    payload: Result<Json<InputRecord>, JsonRejection>,
) -> ApiResult<Json<TrafficPrediction>> {
    let Json(record) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let out = state.predictor.predict(&record, &state.fields.json)?;
    Ok(Json(out))
}

pub async fn upload_traffic_excel(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<BulkSummary>> {
    let mut multipart = multipart.map_err(|e| ApiError::Validation(e.body_text()))?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }
    let (file_name, bytes) =
        upload.ok_or_else(|| ApiError::Validation(format!("missing multipart field `{}`", UPLOAD_FIELD)))?;

    let predictor = state.predictor.clone();
    let fields = state.fields.clone();
    let output_dir = state.output_dir.clone();
    let summary = tokio::task::spawn_blocking(move || {
        bulk::run(&predictor, &fields.spreadsheet, &file_name, bytes.to_vec(), &output_dir)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("upload worker failed: {}", e)))??;

    Ok(Json(summary))
}

/// `name` must be one plain file name that, once resolved, still lives in `dir`.
pub async fn resolve_download(dir: &FsPath, name: &str) -> Option<PathBuf> {
    if name.contains(['/', '\\']) {
        return None;
    }
    let mut comps = FsPath::new(name).components();
    if !matches!((comps.next(), comps.next()), (Some(Component::Normal(_)), None)) {
        return None;
    }

    let root = tokio::fs::canonicalize(dir).await.ok()?;
    let path = tokio::fs::canonicalize(root.join(name)).await.ok()?;
    let meta = tokio::fs::metadata(&path).await.ok()?;
    (path.starts_with(&root) && meta.is_file()).then_some(path)
}

pub async fn download(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<Response> {
    let path = resolve_download(&state.output_dir, &filename)
        .await
        .ok_or(ApiError::NotFound)?;
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::warn!("could not read {}: {}", path.display(), e);
        ApiError::NotFound
    })?;

    let content_type = if filename.to_ascii_lowercase().ends_with(".xlsx") {
        XLSX_CONTENT_TYPE
    } else {
        "application/octet-stream"
    };
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, attachment_disposition(&filename)),
        ],
        bytes,
    )
        .into_response())
}

/// Quotes and backslashes would end or escape the quoted-string, and header
/// values reject control characters, so all of those are dropped.
fn attachment_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .filter(|c| !matches!(c, '"' | '\\') && !c.is_control())
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
