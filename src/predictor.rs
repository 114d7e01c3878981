use crate::error::{ApiError, ApiResult};
use crate::model::{LoadedModel, Models, DAY_TYPE_LABELS, TRAFFIC_LABELS};
use crate::rules::{self, RuleFields};
use crate::types::{InputRecord, TrafficPrediction};

/// Runs one record through both models and the rules, merging the results.
#[derive(Clone)]
pub struct Predictor {
    models: Models,
    derive_vc_ratio: bool,
}

impl Predictor {
    pub fn new(models: Models, derive_vc_ratio: bool) -> Self {
        Self {
            models,
            derive_vc_ratio,
        }
    }

    pub fn models(&self) -> &Models {
        &self.models
    }

    /// Both slots or nothing; callers must not compute half a response.
    pub fn ready(&self) -> ApiResult<(&LoadedModel, &LoadedModel)> {
        let traffic = self
            .models
            .traffic
            .get()
            .ok_or(ApiError::ModelUnavailable("traffic jam"))?;
        let day = self
            .models
            .day_type
            .get()
            .ok_or(ApiError::ModelUnavailable("day type"))?;
        Ok((traffic, day))
    }

    pub fn predict(&self, record: &InputRecord, fields: &RuleFields) -> ApiResult<TrafficPrediction> {
        let (traffic, day) = self.ready()?;

        let traffic_x = traffic.schema.assemble(record)?;
        let day_x = day.schema.assemble(record)?;

        let traffic_pred = traffic.classifier.predict(&traffic_x)?;
        let traffic_label = TRAFFIC_LABELS.label(traffic_pred)?;
        let traffic_probabilities = TRAFFIC_LABELS.probabilities(traffic.classifier.predict_proba(&traffic_x));

        let day_pred = day.classifier.predict(&day_x)?;
        let day_type_label = DAY_TYPE_LABELS.label(day_pred)?;
        let day_type_probabilities = DAY_TYPE_LABELS.probabilities(day.classifier.predict_proba(&day_x));

        let congestion = rules::evaluate_congestion(record, fields, self.derive_vc_ratio)?;
        // Informational only: a day name or blank cell must not fail the record.
        let actual_day_type = match rules::evaluate_day_type(record, fields) {
            Ok(label) => Some(label),
            Err(e) => {
                tracing::debug!("day-type rule skipped: {}", e);
                None
            }
        };

        Ok(TrafficPrediction {
            traffic_prediction: traffic_pred,
            traffic_label,
            traffic_probabilities,
            day_type_prediction: day_pred,
            day_type_label,
            day_type_probabilities,
            actual_congested: congestion.label,
            actual_day_type,
            vc_ratio: congestion.vc_ratio,
            criteria_met: congestion.criteria,
        })
    }
}
