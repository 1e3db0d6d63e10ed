//! ParameterSet: a named bundle of strategy-tunable values.
//!
//! Identity is by value: cloning a set yields an independent copy, and two sets
//! compare equal when every name maps to an equal value. Optimizer individuals
//! therefore never alias each other's parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single parameter value: integer, continuous, or categorical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Choice(String),
}

impl ParamValue {
    /// Numeric view of the value. Categorical values have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Choice(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Choice(v) => write!(f, "{v}"),
        }
    }
}

/// Parameter name → value. `BTreeMap` keeps serialization (and hashing) ordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(ParamValue::as_f64)
    }

    /// Integer view. Floats with no fractional part are accepted.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.0.get(name)? {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn get_choice(&self, name: &str) -> Option<&str> {
        match self.0.get(name)? {
            ParamValue::Choice(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Boolean view: `"true"`/`"false"` choices, or non-zero numbers.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name)? {
            ParamValue::Choice(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => Some(true),
                "false" | "no" | "off" => Some(false),
                _ => None,
            },
            ParamValue::Int(v) => Some(*v != 0),
            ParamValue::Float(v) => Some(*v != 0.0),
        }
    }

    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.get_f64(name).unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic content hash (BLAKE3 over canonical JSON).
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(&self.0).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParameterSet {
        ParameterSet::new()
            .with("lookback", ParamValue::Int(5))
            .with("entry_threshold", ParamValue::Float(50.0))
            .with("mode", ParamValue::Choice("fast".into()))
    }

    #[test]
    fn typed_getters() {
        let p = sample();
        assert_eq!(p.get_i64("lookback"), Some(5));
        assert_eq!(p.get_f64("lookback"), Some(5.0));
        assert_eq!(p.get_i64("entry_threshold"), Some(50));
        assert_eq!(p.get_choice("mode"), Some("fast"));
        assert_eq!(p.get_f64("mode"), None);
        assert_eq!(p.f64_or("missing", 1.5), 1.5);
    }

    #[test]
    fn bool_view() {
        let p = ParameterSet::new()
            .with("a", ParamValue::Choice("true".into()))
            .with("b", ParamValue::Int(0))
            .with("c", ParamValue::Choice("maybe".into()));
        assert_eq!(p.get_bool("a"), Some(true));
        assert_eq!(p.get_bool("b"), Some(false));
        assert_eq!(p.get_bool("c"), None);
    }

    #[test]
    fn clones_do_not_alias() {
        let original = sample();
        let mut copy = original.clone();
        copy.insert("lookback", ParamValue::Int(9));
        assert_eq!(original.get_i64("lookback"), Some(5));
        assert_ne!(original, copy);
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = ParameterSet::new()
            .with("x", ParamValue::Int(1))
            .with("y", ParamValue::Float(2.5));
        let b = ParameterSet::new()
            .with("y", ParamValue::Float(2.5))
            .with("x", ParamValue::Int(1));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn untagged_json_shape() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"{"entry_threshold":50.0,"lookback":5,"mode":"fast"}"#
        );
        let back: ParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
