use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One loosely-typed input value, as it arrived from JSON or a spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl Scalar {
    pub fn from_json(v: Value) -> Self {
        match v {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(b),
            Value::Number(n) => n.as_f64().map(Scalar::Number).unwrap_or(Scalar::Null),
            Value::String(s) => Scalar::Text(s),
            // float("[1, 2]") fails later, same as any other junk text
            other => Scalar::Text(other.to_string()),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "'{}'", s),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Null => f.write_str("null"),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Number(n) if n.is_finite() => s.serialize_f64(*n),
            Scalar::Number(_) | Scalar::Null => s.serialize_none(),
            Scalar::Text(t) => s.serialize_str(t),
            Scalar::Bool(b) => s.serialize_bool(*b),
        }
    }
}

/// A partially populated record keyed by field name. Field order is kept
/// so spreadsheet rows echo back in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRecord {
    fields: Vec<(String, Scalar)>,
}

impl InputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later duplicates of a name are ignored on lookup; the first wins.
    pub fn insert(&mut self, name: impl Into<String>, value: Scalar) {
        self.fields.push((name.into(), value));
    }

    pub fn with(mut self, name: impl Into<String>, value: Scalar) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn from_json_map(map: serde_json::Map<String, Value>) -> Self {
        Self {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, Scalar::from_json(v)))
                .collect(),
        }
    }
}

impl Serialize for InputRecord {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for InputRecord {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::<String, Value>::deserialize(d)?;
        Ok(Self::from_json_map(map))
    }
}

/// Class name -> formatted probability, serialized as a JSON object in class order.
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities(pub Vec<(&'static str, String)>);

impl Probabilities {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }
}

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CriteriaMet {
    pub vc_ratio_over_1: bool,
    pub speed_under_20: bool,
}

/// Merged model + rule output for one record.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficPrediction {
    pub traffic_prediction: i64,
    pub traffic_label: &'static str,
    pub traffic_probabilities: Probabilities,
    pub day_type_prediction: i64,
    pub day_type_label: &'static str,
    pub day_type_probabilities: Probabilities,
    pub actual_congested: u8,
    /// `None` when `day_of_week` is present but not an integer.
    pub actual_day_type: Option<u8>,
    pub vc_ratio: f64,
    pub criteria_met: CriteriaMet,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub jam_model: &'static str,
    pub day_model: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_keeps_insertion_order_on_serialize() {
        let rec = InputRecord::new()
            .with("speed", Scalar::Number(15.0))
            .with("latitude", Scalar::Text("13.7".into()))
            .with("v/c", Scalar::Number(f64::NAN));

        let out = serde_json::to_string(&rec).unwrap();
        assert_eq!(out, r#"{"speed":15.0,"latitude":"13.7","v/c":null}"#);
    }

    #[test]
    fn test_record_from_json_maps_every_kind() {
        let rec: InputRecord = serde_json::from_value(json!({
            "a": 1, "b": "x", "c": true, "d": null, "e": [1, 2]
        }))
        .unwrap();

        assert_eq!(rec.get("a"), Some(&Scalar::Number(1.0)));
        assert_eq!(rec.get("b"), Some(&Scalar::Text("x".into())));
        assert_eq!(rec.get("c"), Some(&Scalar::Bool(true)));
        assert_eq!(rec.get("d"), Some(&Scalar::Null));
        assert_eq!(rec.get("e"), Some(&Scalar::Text("[1,2]".into())));
        assert!(!rec.contains("f"));
    }

    #[test]
    fn test_first_duplicate_wins() {
        let rec = InputRecord::new()
            .with("speed", Scalar::Number(1.0))
            .with("speed", Scalar::Number(2.0));
        assert_eq!(rec.get("speed"), Some(&Scalar::Number(1.0)));
    }

    #[test]
    fn test_probabilities_serialize_in_class_order() {
        let p = Probabilities(vec![("ไม่ติด", "25.00%".into()), ("ติด", "75.00%".into())]);
        let out = serde_json::to_string(&p).unwrap();
        assert_eq!(out, r#"{"ไม่ติด":"25.00%","ติด":"75.00%"}"#);
        assert_eq!(p.get("ติด"), Some("75.00%"));
    }
}
