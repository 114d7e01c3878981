//! Model facade: the two classifier slots and the labels attached to their classes.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, sync::Arc};

use crate::config::Config;
use crate::error::ModelError;
use crate::features::{FeatureSchema, FeatureVector};
use crate::types::Probabilities;

pub const NOT_AVAILABLE: &str = "N/A";

/// Anything that can classify a feature vector. `predict_proba` is optional;
/// the default says so instead of failing some other way.
pub trait Classifier: Send + Sync {
    fn predict(&self, x: &FeatureVector) -> Result<i64, ModelError>;

    fn predict_proba(&self, _x: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        Err(ModelError::ProbabilitiesUnsupported)
    }
}

/// Human-readable label and probability key per class index.
#[derive(Debug, Clone, Copy)]
pub struct ClassLabels {
    pub classes: &'static [(&'static str, &'static str)],
}

pub const TRAFFIC_LABELS: ClassLabels = ClassLabels {
    classes: &[
        ("การจราจรไม่ติด (Free Flow)", "ไม่ติด"),
        ("การจราจรติด (Congested)", "ติด"),
    ],
};

pub const DAY_TYPE_LABELS: ClassLabels = ClassLabels {
    classes: &[
        ("วันทำงาน (Weekday)", "วันทำงาน"),
        ("วันหยุด (Weekend/Holiday)", "วันหยุด"),
    ],
};

impl ClassLabels {
    pub fn label(&self, class: i64) -> Result<&'static str, ModelError> {
        usize::try_from(class)
            .ok()
            .and_then(|i| self.classes.get(i))
            .map(|(label, _)| *label)
            .ok_or(ModelError::UnknownClass(class))
    }

    /// Percentages per class, or "N/A" for every class if the model could not
    /// produce one value per class.
    pub fn probabilities(&self, proba: Result<Vec<f64>, ModelError>) -> Probabilities {
        match proba {
            Ok(p) if p.len() >= self.classes.len() => Probabilities(
                self.classes
                    .iter()
                    .zip(p)
                    .map(|((_, key), v)| (*key, format!("{:.2}%", v * 100.0)))
                    .collect(),
            ),
            Ok(p) => {
                tracing::debug!("got {} probabilities for {} classes", p.len(), self.classes.len());
                self.unavailable()
            }
            Err(e) => {
                tracing::debug!("probabilities unavailable: {}", e);
                self.unavailable()
            }
        }
    }

    pub fn unavailable(&self) -> Probabilities {
        Probabilities(
            self.classes
                .iter()
                .map(|(_, key)| (*key, NOT_AVAILABLE.to_string()))
                .collect(),
        )
    }
}

/// A classifier plus the schema its inputs are assembled with.
#[derive(Clone)]
pub struct LoadedModel {
    pub classifier: Arc<dyn Classifier>,
    pub schema: FeatureSchema,
}

#[derive(Clone)]
pub enum ModelSlot {
    Loaded(LoadedModel),
    Unavailable(String),
}

impl ModelSlot {
    pub fn loaded(classifier: Arc<dyn Classifier>, schema: FeatureSchema) -> Self {
        ModelSlot::Loaded(LoadedModel { classifier, schema })
    }

    pub fn get(&self) -> Option<&LoadedModel> {
        match self {
            ModelSlot::Loaded(m) => Some(m),
            ModelSlot::Unavailable(_) => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ModelSlot::Loaded(_) => "loaded",
            ModelSlot::Unavailable(_) => "not_loaded",
        }
    }
}

/// Both slots, filled once at startup and read-only afterwards.
#[derive(Clone)]
pub struct Models {
    pub traffic: ModelSlot,
    pub day_type: ModelSlot,
}

impl Models {
    pub fn load(cfg: &Config) -> Self {
        Self {
            traffic: load_slot(
                "traffic jam",
                &cfg.model_path,
                cfg.model_meta_path.as_deref(),
                FeatureSchema::traffic(),
            ),
            day_type: load_slot(
                "day type",
                &cfg.day_model_path,
                cfg.day_model_meta_path.as_deref(),
                FeatureSchema::day_type(),
            ),
        }
    }
}

#[derive(Deserialize)]
struct MetaJson {
    feat_list: Vec<String>,
    in_dim: Option<usize>,
}

fn load_meta(meta_path: &str) -> Result<MetaJson> {
    let meta_txt = fs::read_to_string(Path::new(meta_path))
        .with_context(|| format!("failed to read meta at {}", meta_path))?;
    serde_json::from_str(&meta_txt).with_context(|| format!("failed to parse {}", meta_path))
}

/// Never fails: a model that cannot be loaded leaves its slot unavailable.
pub fn load_slot(name: &str, model_path: &str, meta_path: Option<&str>, base: FeatureSchema) -> ModelSlot {
    match try_load(model_path, meta_path, base) {
        Ok(slot) => {
            tracing::info!("{} model loaded from {} ({} features)", name, model_path, slot.schema.len());
            ModelSlot::Loaded(slot)
        }
        Err(e) => {
            tracing::warn!("{} model not loaded: {:#}", name, e);
            ModelSlot::Unavailable(format!("{:#}", e))
        }
    }
}

fn try_load(model_path: &str, meta_path: Option<&str>, base: FeatureSchema) -> Result<LoadedModel> {
    let schema = match meta_path {
        Some(p) => {
            let meta = load_meta(p)?;
            if let Some(in_dim) = meta.in_dim {
                if in_dim != meta.feat_list.len() {
                    tracing::warn!(
                        "meta.in_dim ({}) != feat_list.len() ({}); using feat_list.len()",
                        in_dim,
                        meta.feat_list.len()
                    );
                }
            }
            base.reordered(&meta.feat_list)
        }
        None => base,
    };
    let classifier = open_classifier(model_path, schema.len())?;
    Ok(LoadedModel { classifier, schema })
}

#[cfg(feature = "torch")]
fn open_classifier(model_path: &str, in_dim: usize) -> Result<Arc<dyn Classifier>> {
    Ok(Arc::new(crate::torchscript::TorchClassifier::load(model_path, in_dim)?))
}

#[cfg(not(feature = "torch"))]
fn open_classifier(model_path: &str, _in_dim: usize) -> Result<Arc<dyn Classifier>> {
    anyhow::bail!("cannot load {}: built without the `torch` feature", model_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_lookup() {
        assert_eq!(TRAFFIC_LABELS.label(0).unwrap(), "การจราจรไม่ติด (Free Flow)");
        assert_eq!(DAY_TYPE_LABELS.label(1).unwrap(), "วันหยุด (Weekend/Holiday)");
        assert!(matches!(TRAFFIC_LABELS.label(2), Err(ModelError::UnknownClass(2))));
        assert!(matches!(TRAFFIC_LABELS.label(-1), Err(ModelError::UnknownClass(-1))));
    }

    #[test]
    fn test_probabilities_formatting() {
        let p = TRAFFIC_LABELS.probabilities(Ok(vec![0.123456, 0.876544]));
        assert_eq!(p.get("ไม่ติด"), Some("12.35%"));
        assert_eq!(p.get("ติด"), Some("87.65%"));
    }

    #[test]
    fn test_probabilities_fall_back_to_sentinel() {
        let p = DAY_TYPE_LABELS.probabilities(Err(ModelError::ProbabilitiesUnsupported));
        assert_eq!(p.get("วันทำงาน"), Some(NOT_AVAILABLE));
        assert_eq!(p.get("วันหยุด"), Some(NOT_AVAILABLE));

        let p = DAY_TYPE_LABELS.probabilities(Ok(vec![1.0]));
        assert_eq!(p, DAY_TYPE_LABELS.unavailable());
    }

    #[test]
    fn test_missing_model_file_leaves_slot_unavailable() {
        let slot = load_slot("traffic jam", "/nonexistent/model.pt", None, FeatureSchema::traffic());
        assert_eq!(slot.status(), "not_loaded");
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_bad_meta_leaves_slot_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let meta = dir.path().join("meta.json");
        fs::write(&meta, "{").unwrap();
        let slot = load_slot("day type", "/nonexistent/model.pt", meta.to_str(), FeatureSchema::day_type());
        match slot {
            ModelSlot::Unavailable(reason) => assert!(reason.contains("meta.json"), "{}", reason),
            ModelSlot::Loaded(_) => panic!("should not load"),
        }
    }
}
