// src/types.rs
//
// Common shared types: the fixed-order clinical state vector and the named
// patient record it is built from.
//
// The order of FEATURE_NAMES is the index<->name mapping used by every
// component (scorer groups, policy heads, domain table). Never reorder it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{IndexOutOfRange, InputError};

/// Number of variables in a clinical state.
pub const STATE_DIM: usize = 34;

/// Canonical variable names, in state-vector order.
pub const FEATURE_NAMES: [&str; STATE_DIM] = [
    "gender", "age", "race", "educ", "marry", "house", "pov", "wt", "ht", "bmi", "wst", "hip",
    "dia", "pulse", "sys", "alt", "albumin", "ast", "crea", "chol", "tyg", "ggt", "wbc", "hb",
    "hct", "ldl", "hdl", "acratio", "glu", "insulin", "crp", "hb1ac", "mvpa", "ac_week",
];

/// Key under which the input record may carry free-text patient context.
pub const CONTEXT_KEY: &str = "context";

/// Name of the variable at `index`.
pub fn name_of(index: usize) -> Result<&'static str, IndexOutOfRange> {
    FEATURE_NAMES.get(index).copied().ok_or(IndexOutOfRange {
        index,
        len: STATE_DIM,
    })
}

/// Index of the variable called `name`, if it is part of the state.
pub fn index_of(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// A single named value, used wherever the state crosses the crate boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: f64,
}

/// Fixed-length, fixed-order clinical state.
///
/// All coordinates are finite as f32, the precision the networks run in.
/// The vector is only mutated by the
/// environment, one coordinate per step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClinicalState {
    values: [f64; STATE_DIM],
}

impl ClinicalState {
    #[cfg(test)]
    pub(crate) fn from_values(values: [f64; STATE_DIM]) -> Self {
        Self { values }
    }

    /// Build from a raw slice; the slice must hold exactly 34 values that
    /// stay finite in single precision.
    pub fn from_slice(values: &[f64]) -> Result<Self, InputError> {
        if values.len() != STATE_DIM {
            return Err(InputError::LengthMismatch {
                expected: STATE_DIM,
                found: values.len(),
            });
        }
        let mut out = [0.0; STATE_DIM];
        for (i, v) in values.iter().enumerate() {
            if !is_network_finite(*v) {
                return Err(InputError::NonNumeric {
                    name: FEATURE_NAMES[i].to_string(),
                    value: v.to_string(),
                });
            }
            out[i] = *v;
        }
        Ok(Self { values: out })
    }

    /// Build from a JSON object keyed by variable name.
    ///
    /// Numbers and numeric strings are accepted; anything else is
    /// `NonNumeric`. Keys outside the canonical set are ignored.
    pub fn from_json_object(obj: &Map<String, JsonValue>) -> Result<Self, InputError> {
        let mut out = [0.0; STATE_DIM];
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            let raw = obj.get(*name).ok_or_else(|| InputError::MissingVariable {
                name: name.to_string(),
            })?;
            out[i] = json_number(name, raw)?;
        }
        Ok(Self { values: out })
    }

    pub fn get(&self, index: usize) -> Result<f64, IndexOutOfRange> {
        self.values.get(index).copied().ok_or(IndexOutOfRange {
            index,
            len: STATE_DIM,
        })
    }

    /// Value of a variable by canonical name.
    pub fn get_named(&self, name: &str) -> Option<f64> {
        index_of(name).map(|i| self.values[i])
    }

    pub(crate) fn set(&mut self, index: usize, value: f64) -> Result<(), IndexOutOfRange> {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(IndexOutOfRange {
                index,
                len: STATE_DIM,
            }),
        }
    }

    pub fn values(&self) -> &[f64; STATE_DIM] {
        &self.values
    }

    /// Single-precision copy used as network input.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.values.iter().map(|v| *v as f32).collect()
    }

    /// Values paired with their canonical names, in state order.
    pub fn named_values(&self) -> Vec<NamedValue> {
        FEATURE_NAMES
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| NamedValue {
                name: name.to_string(),
                value: *value,
            })
            .collect()
    }

    /// Indices whose values differ bitwise from `other`.
    pub fn changed_indices(&self, other: &ClinicalState) -> Vec<usize> {
        (0..STATE_DIM)
            .filter(|&i| self.values[i].to_bits() != other.values[i].to_bits())
            .collect()
    }
}

/// Finite in f64 and still finite after the cast to the networks' f32.
pub fn is_network_finite(v: f64) -> bool {
    v.is_finite() && (v as f32).is_finite()
}

fn json_number(name: &str, raw: &JsonValue) -> Result<f64, InputError> {
    let parsed = match raw {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if is_network_finite(v) => Ok(v),
        _ => Err(InputError::NonNumeric {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Named patient record as delivered by the input-collection layer.
///
/// Holds the 34 variables plus any pass-through keys (notably `context`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientInput {
    fields: Map<String, JsonValue>,
}

impl PatientInput {
    pub fn from_map(fields: Map<String, JsonValue>) -> Self {
        Self { fields }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, InputError> {
        match serde_json::from_str::<JsonValue>(raw) {
            Ok(JsonValue::Object(fields)) => Ok(Self { fields }),
            Ok(other) => Err(InputError::Malformed {
                source: format!("expected object, found {}", json_kind(&other)),
            }),
            Err(e) => Err(InputError::Malformed {
                source: e.to_string(),
            }),
        }
    }

    /// Record holding exactly the values of `state`, with optional context.
    pub fn from_state(state: &ClinicalState, context: Option<&str>) -> Self {
        let mut fields = Map::new();
        for nv in state.named_values() {
            fields.insert(nv.name, JsonValue::from(nv.value));
        }
        if let Some(ctx) = context {
            fields.insert(CONTEXT_KEY.to_string(), JsonValue::from(ctx));
        }
        Self { fields }
    }

    /// Set (or overwrite) a single numeric field.
    pub fn set(&mut self, name: &str, value: f64) {
        self.fields.insert(name.to_string(), JsonValue::from(value));
    }

    /// Remove a field, returning the old value if present.
    pub fn remove(&mut self, name: &str) -> Option<JsonValue> {
        self.fields.remove(name)
    }

    pub fn context(&self) -> Option<&str> {
        self.fields.get(CONTEXT_KEY).and_then(|v| v.as_str())
    }

    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.fields
    }

    /// Validate the record and project it onto the canonical state.
    pub fn to_state(&self) -> Result<ClinicalState, InputError> {
        ClinicalState::from_json_object(&self.fields)
    }
}

fn json_kind(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::scenario_input;
    use serde_json::json;

    #[test]
    fn test_feature_names_unique_and_ordered() {
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            assert_eq!(index_of(name), Some(i));
        }
        assert_eq!(name_of(0).unwrap(), "gender");
        assert_eq!(name_of(33).unwrap(), "ac_week");
        assert_eq!(
            name_of(34).unwrap_err(),
            IndexOutOfRange {
                index: 34,
                len: STATE_DIM
            }
        );
    }

    #[test]
    fn test_state_from_input_keeps_order() {
        let input = scenario_input();
        let state = input.to_state().unwrap();
        assert_eq!(state.get_named("age"), Some(33.0));
        assert_eq!(state.get(9).unwrap(), 35.7);
        assert_eq!(state.get(28).unwrap(), 204.0);
        assert_eq!(state.get(31).unwrap(), 9.5);
        assert_eq!(state.get(32).unwrap(), 840.0);
        assert_eq!(input.context(), Some("dd"));
    }

    #[test]
    fn test_missing_variable_is_reported_by_name() {
        let mut input = scenario_input();
        input.remove("insulin");
        assert_eq!(
            input.to_state().unwrap_err(),
            InputError::MissingVariable {
                name: "insulin".to_string()
            }
        );
    }

    #[test]
    fn test_non_numeric_values_rejected() {
        let mut fields = scenario_input().fields().clone();
        fields.insert("crp".to_string(), json!("high"));
        let err = PatientInput::from_map(fields).to_state().unwrap_err();
        assert!(matches!(err, InputError::NonNumeric { ref name, .. } if name == "crp"));

        let mut fields = scenario_input().fields().clone();
        fields.insert("crp".to_string(), json!(null));
        assert!(PatientInput::from_map(fields).to_state().is_err());
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let mut fields = scenario_input().fields().clone();
        fields.insert("pov".to_string(), json!(" 2.5 "));
        let state = PatientInput::from_map(fields).to_state().unwrap();
        assert_eq!(state.get_named("pov"), Some(2.5));
    }

    #[test]
    fn test_from_slice_checks_length_and_finiteness() {
        assert!(matches!(
            ClinicalState::from_slice(&[1.0; 33]),
            Err(InputError::LengthMismatch {
                expected: 34,
                found: 33
            })
        ));
        let mut raw = [1.0; STATE_DIM];
        raw[5] = f64::NAN;
        assert!(matches!(
            ClinicalState::from_slice(&raw),
            Err(InputError::NonNumeric { ref name, .. }) if name == "house"
        ));
    }

    #[test]
    fn test_values_beyond_single_precision_rejected() {
        let mut input = scenario_input();
        input.set("crp", 1.0e300);
        assert!(matches!(
            input.to_state(),
            Err(InputError::NonNumeric { ref name, .. }) if name == "crp"
        ));

        let mut raw = [1.0; STATE_DIM];
        raw[30] = -1.0e39;
        assert!(matches!(
            ClinicalState::from_slice(&raw),
            Err(InputError::NonNumeric { ref name, .. }) if name == "crp"
        ));

        assert!(is_network_finite(f32::MAX as f64));
        assert!(!is_network_finite(f64::MAX));
        assert!(!is_network_finite(f64::INFINITY));
    }

    #[test]
    fn test_changed_indices_bitwise() {
        let a = ClinicalState::from_values([1.0; STATE_DIM]);
        let mut b = a;
        b.set(7, 1.5).unwrap();
        assert_eq!(b.changed_indices(&a), vec![7]);
        assert!(a.changed_indices(&a).is_empty());
    }

    #[test]
    fn test_malformed_record() {
        assert!(matches!(
            PatientInput::from_json_str("[1, 2]"),
            Err(InputError::Malformed { .. })
        ));
        assert!(PatientInput::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_from_state_roundtrip_through_json() {
        let state = scenario_input().to_state().unwrap();
        let input = PatientInput::from_state(&state, Some("ctx"));
        let text = serde_json::to_string(&input).unwrap();
        let back = PatientInput::from_json_str(&text).unwrap();
        assert_eq!(back.to_state().unwrap(), state);
        assert_eq!(back.context(), Some("ctx"));
    }
}
