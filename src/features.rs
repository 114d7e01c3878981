//! Feature assembly: loosely-typed record -> fixed-order numeric vector.
//!
//! Each model owns a [`FeatureSchema`]. Both schemas are currently the same
//! eight fields, but they are built separately so a model meta file (or a
//! later change here) can reorder or extend one without touching the other.

use crate::error::FeatureError;
use crate::types::{InputRecord, Scalar};

pub const DEFAULT_FEATURE_COUNT: usize = 8;

pub const VC_RATIO: &str = "vc_ratio";
pub const VOLUME: &str = "volume";
pub const CAPACITY: &str = "capacity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    Float,
    /// Truncated toward zero, then fed to the model as a float.
    Integer,
}

/// What to use when a field is absent from the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fallback {
    Default,
    /// `volume / capacity` if both are present and capacity != 0, else the default.
    VolumeOverCapacity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub default: f64,
    pub cast: Cast,
    pub fallback: Fallback,
}

impl FieldSpec {
    pub fn float(name: &str, default: f64) -> Self {
        Self { name: name.to_string(), default, cast: Cast::Float, fallback: Fallback::Default }
    }

    pub fn integer(name: &str, default: f64) -> Self {
        Self { name: name.to_string(), default, cast: Cast::Integer, fallback: Fallback::Default }
    }

    pub fn ratio(name: &str, default: f64) -> Self {
        Self { name: name.to_string(), default, cast: Cast::Float, fallback: Fallback::VolumeOverCapacity }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    fields: Vec<FieldSpec>,
}

fn standard_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::float("latitude", 13.7563),
        FieldSpec::float("longitude", 100.5018),
        FieldSpec::float("density", 0.0),
        FieldSpec::float(VOLUME, 0.0),
        FieldSpec::float(CAPACITY, 1.0),
        FieldSpec::integer("hour", 12.0),
        FieldSpec::float("speed", 0.0),
        FieldSpec::float(VC_RATIO, 0.75),
    ]
}

impl FeatureSchema {
    /// Inputs of the congestion model.
    pub fn traffic() -> Self {
        Self { fields: standard_fields() }
    }

    /// Inputs of the day-type model.
    pub fn day_type() -> Self {
        Self { fields: standard_fields() }
    }

    /// Reorder (or extend) `self` to match a model's `feat_list`. Names not
    /// known to `self` become floats defaulting to 0.0.
    pub fn reordered(&self, feat_list: &[String]) -> Self {
        let fields = feat_list
            .iter()
            .map(|name| {
                self.fields
                    .iter()
                    .find(|f| &f.name == name)
                    .cloned()
                    .unwrap_or_else(|| FieldSpec::float(name, 0.0))
            })
            .collect();
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Absent fields always take the schema default; the model was trained on
    /// those defaults, so the ratio is never derived here.
    pub fn assemble(&self, record: &InputRecord) -> Result<FeatureVector, FeatureError> {
        let mut values = Vec::with_capacity(self.fields.len());
        for spec in &self.fields {
            values.push(read_field(record, spec, false)?);
        }
        Ok(FeatureVector { values })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|v| *v as f32).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolve one field of `record` per `spec`: cast if present, fallback if not.
pub fn read_field(record: &InputRecord, spec: &FieldSpec, derive_ratio: bool) -> Result<f64, FeatureError> {
    if let Some(v) = record.get(&spec.name) {
        return cast(&spec.name, v, spec.cast);
    }
    if derive_ratio && spec.fallback == Fallback::VolumeOverCapacity {
        if let Some(ratio) = volume_over_capacity(record)? {
            return Ok(ratio);
        }
    }
    Ok(spec.default)
}

fn volume_over_capacity(record: &InputRecord) -> Result<Option<f64>, FeatureError> {
    let (Some(volume), Some(capacity)) = (record.get(VOLUME), record.get(CAPACITY)) else {
        return Ok(None);
    };
    let volume = cast_float(VOLUME, volume)?;
    let capacity = cast_float(CAPACITY, capacity)?;
    if capacity == 0.0 {
        return Ok(None);
    }
    Ok(Some(volume / capacity))
}

pub fn cast(field: &str, v: &Scalar, kind: Cast) -> Result<f64, FeatureError> {
    match kind {
        Cast::Float => cast_float(field, v),
        Cast::Integer => cast_integer(field, v).map(|i| i as f64),
    }
}

pub fn cast_float(field: &str, v: &Scalar) -> Result<f64, FeatureError> {
    let err = || FeatureError::NotFloat { field: field.to_string(), value: v.to_string() };
    match v {
        Scalar::Number(n) => Ok(*n),
        Scalar::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Scalar::Text(s) => s.trim().parse::<f64>().map_err(|_| err()),
        Scalar::Null => Err(err()),
    }
}

pub fn cast_integer(field: &str, v: &Scalar) -> Result<i64, FeatureError> {
    let err = || FeatureError::NotInteger { field: field.to_string(), value: v.to_string() };
    match v {
        Scalar::Number(n) if n.is_finite() => Ok(n.trunc() as i64),
        Scalar::Bool(b) => Ok(i64::from(*b)),
        Scalar::Text(s) => s.trim().parse::<i64>().map_err(|_| err()),
        Scalar::Number(_) | Scalar::Null => Err(err()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Scalar {
        Scalar::Number(n)
    }

    #[test]
    fn test_empty_record_yields_default_vector() {
        let v = FeatureSchema::traffic().assemble(&InputRecord::new()).unwrap();
        assert_eq!(v.values(), &[13.7563, 100.5018, 0.0, 0.0, 1.0, 12.0, 0.0, 0.75]);
        assert_eq!(v.len(), DEFAULT_FEATURE_COUNT);
    }

    #[test]
    fn test_both_schemas_agree_today() {
        let rec = InputRecord::new().with("speed", num(33.0)).with("hour", num(7.9));
        let a = FeatureSchema::traffic().assemble(&rec).unwrap();
        let b = FeatureSchema::day_type().assemble(&rec).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.values()[5], 7.0, "hour truncates");
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let rec = InputRecord::new()
            .with("latitude", Scalar::Text(" 13.8 ".into()))
            .with("density", Scalar::Bool(true))
            .with("vc_ratio", num(1.1));
        let schema = FeatureSchema::traffic();
        let first = schema.assemble(&rec).unwrap();
        for _ in 0..5 {
            assert_eq!(schema.assemble(&rec).unwrap(), first);
        }
        assert_eq!(first.values()[0], 13.8);
        assert_eq!(first.values()[2], 1.0);
        assert_eq!(first.values()[7], 1.1);
    }

    #[test]
    fn test_vc_ratio_feature_keeps_default_when_absent() {
        let rec = InputRecord::new().with("volume", num(2500.0)).with("capacity", num(2000.0));
        let v = FeatureSchema::traffic().assemble(&rec).unwrap();
        assert_eq!(v.values()[7], 0.75);
        assert_eq!(FeatureSchema::day_type().assemble(&rec).unwrap().values()[7], 0.75);

        let derived = read_field(&rec, &FieldSpec::ratio(VC_RATIO, 0.75), true).unwrap();
        assert_eq!(derived, 1.25, "only the ratio fallback divides");
    }

    #[test]
    fn test_zero_capacity_falls_back_to_default_ratio() {
        let rec = InputRecord::new().with("volume", num(10.0)).with("capacity", num(0.0));
        assert_eq!(read_field(&rec, &FieldSpec::ratio(VC_RATIO, 0.75), true).unwrap(), 0.75);
    }

    #[test]
    fn test_explicit_ratio_beats_derivation() {
        let rec = InputRecord::new()
            .with("volume", num(2500.0))
            .with("capacity", num(2000.0))
            .with("vc_ratio", num(0.4));
        assert_eq!(read_field(&rec, &FieldSpec::ratio(VC_RATIO, 0.75), true).unwrap(), 0.4);
        assert_eq!(FeatureSchema::traffic().assemble(&rec).unwrap().values()[7], 0.4);
    }

    #[test]
    fn test_bad_values_are_reported_with_field_name() {
        let rec = InputRecord::new().with("speed", Scalar::Text("fast".into()));
        let err = FeatureSchema::traffic().assemble(&rec).unwrap_err();
        assert_eq!(err, FeatureError::NotFloat { field: "speed".into(), value: "'fast'".into() });

        let rec = InputRecord::new().with("hour", Scalar::Text("12.5".into()));
        assert!(matches!(
            FeatureSchema::traffic().assemble(&rec),
            Err(FeatureError::NotInteger { .. })
        ));

        let rec = InputRecord::new().with("hour", num(f64::NAN));
        assert!(FeatureSchema::traffic().assemble(&rec).is_err());

        let rec = InputRecord::new().with("latitude", Scalar::Null);
        assert!(FeatureSchema::traffic().assemble(&rec).is_err());
    }

    #[test]
    fn test_nan_float_passes_through() {
        let rec = InputRecord::new().with("density", num(f64::NAN));
        let v = FeatureSchema::traffic().assemble(&rec).unwrap();
        assert!(v.values()[2].is_nan());
    }

    #[test]
    fn test_reordered_schema_follows_feat_list() {
        let feat_list = vec!["speed".to_string(), "hour".to_string(), "rain_mm".to_string()];
        let schema = FeatureSchema::day_type().reordered(&feat_list);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["speed", "hour", "rain_mm"]);

        let rec = InputRecord::new().with("speed", num(40.0));
        let v = schema.assemble(&rec).unwrap();
        assert_eq!(v.values(), &[40.0, 12.0, 0.0]);
    }
}
