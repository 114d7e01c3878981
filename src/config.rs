use anyhow::{Context, Result};
use serde::Deserialize;
use std::{env, fs, path::PathBuf};

use crate::rules::RuleFields;

/// Rule field names per entry point. The JSON endpoint and the spreadsheet
/// upload have historically read the ratio from different columns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub json: RuleFields,
    pub spreadsheet: RuleFields,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            json: RuleFields::json(),
            spreadsheet: RuleFields::spreadsheet(),
        }
    }
}

impl FieldMap {
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path).with_context(|| format!("failed to read field map at {}", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid field map JSON in {}", path))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_path: String,
    pub model_meta_path: Option<String>,
    pub day_model_path: String,
    pub day_model_meta_path: Option<String>,
    pub output_dir: PathBuf,
    pub fields: FieldMap,
    pub derive_vc_ratio: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8004,
            model_path: "models/rf_model.pt".to_string(),
            model_meta_path: None,
            day_model_path: "models/rf_model.pt".to_string(),
            day_model_meta_path: None,
            output_dir: PathBuf::from("static"),
            fields: FieldMap::default(),
            derive_vc_ratio: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let model_path = get("MODEL_PATH").unwrap_or(d.model_path);
        let fields = match get("FIELD_MAP_PATH") {
            Some(path) => FieldMap::load(&path)?,
            None => d.fields,
        };

        Ok(Self {
            host: get("HOST").unwrap_or(d.host),
            port: get("PORT").and_then(|s| s.parse().ok()).unwrap_or(d.port),
            // both slots share one artifact unless told otherwise
            day_model_path: get("DAY_MODEL_PATH").unwrap_or_else(|| model_path.clone()),
            model_path,
            model_meta_path: get("MODEL_META_PATH"),
            day_model_meta_path: get("DAY_MODEL_META_PATH"),
            output_dir: get("OUTPUT_DIR").map(PathBuf::from).unwrap_or(d.output_dir),
            fields,
            derive_vc_ratio: get("DERIVE_VC_RATIO")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(d.derive_vc_ratio),
        })
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
