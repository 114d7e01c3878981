//! Traffic congestion predictor: two classifiers plus a rule-based label,
//! served over HTTP for single JSON records and spreadsheet uploads.

pub mod app;
pub mod bulk;
pub mod config;
pub mod error;
pub mod features;
pub mod handlers;
pub mod model;
pub mod predictor;
pub mod rules;
pub mod types;

#[cfg(feature = "torch")]
pub mod torchscript;
