//! Rule-based labels computed straight from the record, independent of any model.

use serde::Deserialize;

use crate::error::FeatureError;
use crate::features::{self, FieldSpec};
use crate::types::{CriteriaMet, InputRecord};

pub const VC_RATIO_LIMIT: f64 = 1.0;
pub const SPEED_LIMIT_KPH: f64 = 20.0;
/// Saturday = 6, Sunday = 7.
pub const FIRST_WEEKEND_DAY: i64 = 6;

pub const DEFAULT_VC_RATIO: f64 = 0.75;
pub const DEFAULT_SPEED: f64 = 0.0;
pub const DEFAULT_DAY_OF_WEEK: f64 = 2.0;

/// Which record fields the rules read. Differs per entry point.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleFields {
    pub vc_ratio: String,
    #[serde(default = "default_speed_field")]
    pub speed: String,
    #[serde(default = "default_day_field")]
    pub day_of_week: String,
}

fn default_speed_field() -> String {
    "speed".to_string()
}

fn default_day_field() -> String {
    "day_of_week".to_string()
}

impl RuleFields {
    pub fn json() -> Self {
        Self::with_ratio_field("vc_ratio")
    }

    pub fn spreadsheet() -> Self {
        Self::with_ratio_field("v/c")
    }

    fn with_ratio_field(name: &str) -> Self {
        Self {
            vc_ratio: name.to_string(),
            speed: default_speed_field(),
            day_of_week: default_day_field(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Congestion {
    pub vc_ratio: f64,
    pub speed: f64,
    pub criteria: CriteriaMet,
    pub label: u8,
}

/// 1 when demand exceeds capacity or traffic crawls below 20 km/h.
pub fn congestion_label(vc_ratio: f64, speed: f64) -> u8 {
    u8::from(vc_ratio > VC_RATIO_LIMIT || speed < SPEED_LIMIT_KPH)
}

pub fn day_type_label(day_of_week: i64) -> u8 {
    u8::from(day_of_week >= FIRST_WEEKEND_DAY)
}

pub fn evaluate_congestion(
    record: &InputRecord,
    fields: &RuleFields,
    derive_ratio: bool,
) -> Result<Congestion, FeatureError> {
    let vc_ratio = features::read_field(record, &FieldSpec::ratio(&fields.vc_ratio, DEFAULT_VC_RATIO), derive_ratio)?;
    let speed = features::read_field(record, &FieldSpec::float(&fields.speed, DEFAULT_SPEED), false)?;
    Ok(Congestion {
        vc_ratio,
        speed,
        criteria: CriteriaMet {
            vc_ratio_over_1: vc_ratio > VC_RATIO_LIMIT,
            speed_under_20: speed < SPEED_LIMIT_KPH,
        },
        label: congestion_label(vc_ratio, speed),
    })
}

pub fn evaluate_day_type(record: &InputRecord, fields: &RuleFields) -> Result<u8, FeatureError> {
    let day = features::read_field(record, &FieldSpec::integer(&fields.day_of_week, DEFAULT_DAY_OF_WEEK), false)?;
    Ok(day_type_label(day as i64))
}
