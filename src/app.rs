use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{path::PathBuf, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::FieldMap;
use crate::handlers;
use crate::predictor::Predictor;

/// Spreadsheets can be far larger than axum's 2 MB default.
pub const UPLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub fields: Arc<FieldMap>,
    pub output_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(predictor: Predictor, fields: FieldMap, output_dir: PathBuf) -> Self {
        Self {
            predictor: Arc::new(predictor),
            fields: Arc::new(fields),
            output_dir: Arc::new(output_dir),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let static_files = ServeDir::new(state.output_dir.as_path());

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/predict-traffic", post(handlers::predict_traffic))
        .route(
            "/upload-traffic-excel",
            post(handlers::upload_traffic_excel).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/download/:filename", get(handlers::download))
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
