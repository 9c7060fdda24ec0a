//! Capsule options.
//!
//! Each capsule declares its tunable options with a type, a default and
//! bounds. Values supplied at configuration time are checked against those
//! declarations and rejected, never clamped, when they fall outside them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::OptionError;

/// Declared type, default and bounds of an option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionKind {
    Float { default: f64, min: f64, max: f64 },
    Int { default: i64, min: i64, max: i64 },
    Bool { default: bool },
    Enum { default: String, choices: Vec<String> },
}

/// A single option declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSpec {
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: OptionKind,
}

/// A concrete option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "'{}'", v),
        }
    }
}

impl OptionSpec {
    pub fn float(description: impl Into<String>, default: f64, min: f64, max: f64) -> Self {
        Self {
            description: description.into(),
            kind: OptionKind::Float { default, min, max },
        }
    }

    pub fn int(description: impl Into<String>, default: i64, min: i64, max: i64) -> Self {
        Self {
            description: description.into(),
            kind: OptionKind::Int { default, min, max },
        }
    }

    pub fn boolean(description: impl Into<String>, default: bool) -> Self {
        Self {
            description: description.into(),
            kind: OptionKind::Bool { default },
        }
    }

    pub fn choice<I, S>(description: impl Into<String>, default: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            description: description.into(),
            kind: OptionKind::Enum {
                default: default.into(),
                choices: choices.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn default_value(&self) -> OptionValue {
        match &self.kind {
            OptionKind::Float { default, .. } => OptionValue::Float(*default),
            OptionKind::Int { default, .. } => OptionValue::Int(*default),
            OptionKind::Bool { default } => OptionValue::Bool(*default),
            OptionKind::Enum { default, .. } => OptionValue::Text(default.clone()),
        }
    }

    /// Check a value against this declaration.
    ///
    /// Integers are accepted for float options and returned as floats.
    pub fn validate(&self, name: &str, value: &OptionValue) -> Result<OptionValue, OptionError> {
        match (&self.kind, value) {
            (OptionKind::Float { .. }, OptionValue::Int(i)) => {
                self.validate(name, &OptionValue::Float(*i as f64))
            }
            (OptionKind::Float { min, max, .. }, OptionValue::Float(v)) => {
                let v = *v;
                if !(*min <= v && v <= *max) {
                    return Err(OptionError::OutOfBounds {
                        name: name.to_string(),
                        value: v.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                Ok(OptionValue::Float(v))
            }
            (OptionKind::Int { min, max, .. }, OptionValue::Int(v)) => {
                if v < min || v > max {
                    return Err(OptionError::OutOfBounds {
                        name: name.to_string(),
                        value: v.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                Ok(value.clone())
            }
            (OptionKind::Bool { .. }, OptionValue::Bool(_)) => Ok(value.clone()),
            (OptionKind::Enum { choices, .. }, OptionValue::Text(v)) => {
                if !choices.iter().any(|c| c == v) {
                    return Err(OptionError::NotAChoice {
                        name: name.to_string(),
                        value: v.clone(),
                        choices: choices.clone(),
                    });
                }
                Ok(value.clone())
            }
            (kind, got) => Err(OptionError::WrongType {
                name: name.to_string(),
                expected: kind.type_name(),
                got: got.to_string(),
            }),
        }
    }

    /// Check that the declaration is self-consistent: bounds ordered and
    /// default inside them.
    pub fn check_declaration(&self, name: &str) -> Result<(), OptionError> {
        match &self.kind {
            OptionKind::Float { min, max, .. } if !(min <= max) => {
                return Err(OptionError::InvertedBounds {
                    name: name.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                })
            }
            OptionKind::Int { min, max, .. } if min > max => {
                return Err(OptionError::InvertedBounds {
                    name: name.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                })
            }
            _ => {}
        }
        self.validate(name, &self.default_value()).map(|_| ())
    }
}

impl OptionKind {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Float { .. } => "a float",
            Self::Int { .. } => "an integer",
            Self::Bool { .. } => "a boolean",
            Self::Enum { .. } => "one of the declared choices",
        }
    }
}

/// Resolved option values handed to a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionValues(BTreeMap<String, OptionValue>);

impl OptionValues {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0.get(name)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.0.get(name)? {
            OptionValue::Float(v) => Some(*v),
            OptionValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.0.get(name)? {
            OptionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name)? {
            OptionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name)? {
            OptionValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }
}

/// Merge declared defaults with caller overrides.
///
/// Every override must name a declared option and pass its validation.
pub fn resolve_options(
    specs: &BTreeMap<String, OptionSpec>,
    overrides: &BTreeMap<String, OptionValue>,
) -> Result<OptionValues, OptionError> {
    if let Some(unknown) = overrides.keys().find(|k| !specs.contains_key(*k)) {
        return Err(OptionError::Unknown(unknown.clone()));
    }

    let mut values = BTreeMap::new();
    for (name, spec) in specs {
        let value = match overrides.get(name) {
            Some(v) => spec.validate(name, v)?,
            None => spec.default_value(),
        };
        values.insert(name.clone(), value);
    }
    Ok(OptionValues(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn threshold() -> OptionSpec {
        OptionSpec::float("Filter out bad detections", 0.5, 0.0, 1.0)
    }

    fn specs() -> BTreeMap<String, OptionSpec> {
        let mut specs = BTreeMap::new();
        specs.insert("threshold".to_string(), threshold());
        specs.insert(
            "filter_mode".to_string(),
            OptionSpec::choice("Which classes to keep", "all", ["all", "only_animals"]),
        );
        specs.insert("max_faces".to_string(), OptionSpec::int("Limit", 10, 1, 100));
        specs
    }

    #[test]
    fn test_defaults_when_no_overrides() {
        let values = resolve_options(&specs(), &BTreeMap::new()).unwrap();
        assert_eq!(values.float("threshold"), Some(0.5));
        assert_eq!(values.text("filter_mode"), Some("all"));
        assert_eq!(values.int("max_faces"), Some(10));
    }

    #[test]
    fn test_overrides_are_applied() {
        let overrides: BTreeMap<String, OptionValue> = serde_json::from_str(
            r#"{"threshold": 0.9, "filter_mode": "only_animals", "max_faces": 3}"#,
        )
        .unwrap();
        let values = resolve_options(&specs(), &overrides).unwrap();
        assert_eq!(values.float("threshold"), Some(0.9));
        assert_eq!(values.text("filter_mode"), Some("only_animals"));
        assert_eq!(values.int("max_faces"), Some(3));
    }

    #[test]
    fn test_integer_accepted_for_float() {
        let v = threshold().validate("threshold", &OptionValue::Int(1)).unwrap();
        assert_eq!(v, OptionValue::Float(1.0));
    }

    #[test]
    fn test_out_of_bounds_is_rejected_not_clamped() {
        let err = threshold()
            .validate("threshold", &OptionValue::Float(1.5))
            .unwrap_err();
        assert!(matches!(err, OptionError::OutOfBounds { .. }));

        let err = threshold()
            .validate("threshold", &OptionValue::Float(f64::NAN))
            .unwrap_err();
        assert!(matches!(err, OptionError::OutOfBounds { .. }));
    }

    #[test]
    fn test_wrong_type_and_unknown_name() {
        let err = threshold()
            .validate("threshold", &OptionValue::Text("high".into()))
            .unwrap_err();
        assert!(matches!(err, OptionError::WrongType { .. }));

        let mut overrides = BTreeMap::new();
        overrides.insert("thresh".to_string(), OptionValue::Float(0.1));
        assert_eq!(
            resolve_options(&specs(), &overrides).unwrap_err(),
            OptionError::Unknown("thresh".into())
        );
    }

    #[test]
    fn test_enum_choice_checked() {
        let spec = OptionSpec::choice("mode", "all", ["all", "only_animals"]);
        let err = spec
            .validate("filter_mode", &OptionValue::Text("only_cats".into()))
            .unwrap_err();
        assert!(matches!(err, OptionError::NotAChoice { .. }));
    }

    #[test]
    fn test_declaration_checks() {
        assert!(threshold().check_declaration("threshold").is_ok());
        assert!(OptionSpec::float("x", 2.0, 0.0, 1.0)
            .check_declaration("x")
            .is_err());
        assert!(matches!(
            OptionSpec::int("x", 0, 5, 1).check_declaration("x"),
            Err(OptionError::InvertedBounds { .. })
        ));
        assert!(OptionSpec::choice("x", "c", ["a", "b"])
            .check_declaration("x")
            .is_err());
    }

    #[test]
    fn test_spec_json_shape() {
        let json = serde_json::to_value(threshold()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "description": "Filter out bad detections",
                "type": "float",
                "default": 0.5,
                "min": 0.0,
                "max": 1.0
            })
        );
    }
}
