//! Argument validators.
//!
//! A [`Validator`] is attached to an argument lookup. Its forms mirror the
//! ways a caller can describe "what a valid value looks like": a named
//! predicate, an arbitrary closure, a rule list for an external engine, a
//! validating object, or an exact JSON kind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{RunError, RunResult};

/// Per-field violation messages returned by a [`RuleEngine`].
pub type RuleViolations = BTreeMap<String, Vec<String>>;

/// External validation engine consuming structured rule lists.
pub trait RuleEngine: Send + Sync {
    fn check(&self, field: &str, value: &Value, rules: &[String]) -> Result<(), RuleViolations>;
}

/// An object that knows how to validate a value.
pub trait Validates: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), String>;
}

pub type Predicate = fn(&Value) -> bool;

#[derive(Clone)]
pub enum Validator {
    /// Named global predicate.
    Function { name: &'static str, predicate: Predicate },
    /// Closure receiving `(value, argument name)`.
    Callable(Arc<dyn Fn(&Value, &str) -> bool + Send + Sync>),
    /// Rule list delegated to an engine.
    Rules {
        rules: Vec<String>,
        engine: Arc<dyn RuleEngine>,
    },
    Validates(Arc<dyn Validates>),
    /// Exact JSON kind, see [`Kind`].
    Type(String),
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Function { name, .. } => f.debug_tuple("Function").field(name).finish(),
            Validator::Callable(_) => f.write_str("Callable"),
            Validator::Rules { rules, .. } => f.debug_tuple("Rules").field(rules).finish(),
            Validator::Validates(_) => f.write_str("Validates"),
            Validator::Type(kind) => f.debug_tuple("Type").field(kind).finish(),
        }
    }
}

impl Validator {
    /// Resolve a validator from its name.
    ///
    /// Global predicate names win over kind names, so `"is_string"` is the
    /// predicate and `"string"` is the exact kind check.
    pub fn named(name: &str) -> Self {
        match predicates::lookup(name) {
            Some(validator) => validator,
            None => Validator::Type(name.to_string()),
        }
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&Value, &str) -> bool + Send + Sync + 'static,
    {
        Validator::Callable(Arc::new(f))
    }

    pub fn rules<I, S>(rules: I, engine: Arc<dyn RuleEngine>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Validator::Rules {
            rules: rules.into_iter().map(Into::into).collect(),
            engine,
        }
    }

    pub fn object(validator: impl Validates + 'static) -> Self {
        Validator::Validates(Arc::new(validator))
    }

    /// Check `value` for the argument called `name`.
    pub fn check(&self, name: &str, value: &Value) -> RunResult<()> {
        match self {
            Validator::Function { name: func, predicate } => {
                if predicate(value) {
                    Ok(())
                } else {
                    Err(RunError::invalid(name, format!("{func}() rejected the value")))
                }
            }
            Validator::Callable(f) => {
                if f(value, name) {
                    Ok(())
                } else {
                    Err(RunError::invalid(name, "callable rejected the value"))
                }
            }
            Validator::Rules { rules, engine } => {
                engine
                    .check(name, value, rules)
                    .map_err(|messages| RunError::RuleValidationFailed {
                        name: name.to_string(),
                        messages,
                    })
            }
            Validator::Validates(v) => v.validate(value).map_err(|message| RunError::ValidationFailed {
                name: name.to_string(),
                message,
            }),
            Validator::Type(kind) => {
                let expected = Kind::parse(kind).ok_or_else(|| RunError::UnsupportedValidator {
                    name: name.to_string(),
                    validator: kind.clone(),
                })?;
                let actual = Kind::of(value);
                if actual == expected {
                    Ok(())
                } else {
                    Err(RunError::invalid(
                        name,
                        format!("expected {}, got {}", expected.as_str(), actual.as_str()),
                    ))
                }
            }
        }
    }
}

/// JSON value kinds, with integers and floats kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Bool,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl Kind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "null" => Some(Kind::Null),
            "bool" | "boolean" => Some(Kind::Bool),
            "int" | "integer" => Some(Kind::Integer),
            "float" | "double" => Some(Kind::Float),
            "string" => Some(Kind::String),
            "array" => Some(Kind::Array),
            "object" => Some(Kind::Object),
            _ => None,
        }
    }

    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Bool,
            Value::Number(n) if n.is_f64() => Kind::Float,
            Value::Number(_) => Kind::Integer,
            Value::String(_) => Kind::String,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Object,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Bool => "bool",
            Kind::Integer => "integer",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Object => "object",
        }
    }
}

/// Global predicates addressable by name.
pub mod predicates {
    use serde_json::Value;

    use super::{Predicate, Validator};

    const TABLE: &[(&str, Predicate)] = &[
        ("is_null", |v: &Value| v.is_null()),
        ("is_bool", |v: &Value| v.is_boolean()),
        ("is_int", |v: &Value| v.is_i64() || v.is_u64()),
        ("is_float", |v: &Value| v.is_f64()),
        ("is_numeric", is_numeric),
        ("is_string", |v: &Value| v.is_string()),
        ("is_array", |v: &Value| v.is_array()),
        ("is_object", |v: &Value| v.is_object()),
        ("is_scalar", |v: &Value| v.is_boolean() || v.is_number() || v.is_string()),
        ("filled", filled),
    ];

    pub fn lookup(name: &str) -> Option<Validator> {
        TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(n, predicate)| Validator::Function {
                name: n,
                predicate: *predicate,
            })
    }

    /// Numbers and numeric strings.
    pub fn is_numeric(value: &Value) -> bool {
        match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        }
    }

    /// Anything but null, `""`, `[]` or `{}`.
    pub fn filled(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            _ => true,
        }
    }
}

/// Minimal rule engine: `required`, `string`, `integer`, `numeric`,
/// `boolean`, `array`, `min:n`, `max:n`, `in:a,b`.
///
/// `min`/`max` measure string length, array length or numeric value.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicRules;

impl BasicRules {
    fn size(value: &Value) -> Option<f64> {
        match value {
            Value::String(s) => Some(s.chars().count() as f64),
            Value::Array(a) => Some(a.len() as f64),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    fn apply(field: &str, value: &Value, rule: &str) -> Option<String> {
        let (name, param) = match rule.split_once(':') {
            Some((name, param)) => (name.trim(), Some(param.trim())),
            None => (rule.trim(), None),
        };

        let ok = match (name, param) {
            ("required", _) => predicates::filled(value),
            ("string", _) => value.is_string() || value.is_null(),
            ("integer", _) => value.is_i64() || value.is_u64() || value.is_null(),
            ("numeric", _) => predicates::is_numeric(value) || value.is_null(),
            ("boolean", _) => value.is_boolean() || value.is_null(),
            ("array", _) => value.is_array() || value.is_null(),
            ("min", Some(p)) | ("max", Some(p)) => {
                let Ok(limit) = p.parse::<f64>() else {
                    return Some(format!("The {field} rule {rule} has an invalid limit."));
                };
                match Self::size(value) {
                    Some(size) if name == "min" => size >= limit,
                    Some(size) => size <= limit,
                    None => value.is_null(),
                }
            }
            ("in", Some(p)) => {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => return None,
                    other => other.to_string(),
                };
                p.split(',').any(|candidate| candidate.trim() == rendered)
            }
            _ => return Some(format!("The {field} rule {rule} is not recognised.")),
        };

        if ok {
            None
        } else {
            Some(format!("The {field} field failed the {name} rule."))
        }
    }
}

impl RuleEngine for BasicRules {
    fn check(&self, field: &str, value: &Value, rules: &[String]) -> Result<(), RuleViolations> {
        let failures: Vec<String> = rules
            .iter()
            .filter_map(|rule| Self::apply(field, value, rule))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BTreeMap::from([(field.to_string(), failures)]))
        }
    }
}
