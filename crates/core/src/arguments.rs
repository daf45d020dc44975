//! Named argument store shared by every runnable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RunError, RunResult};
use crate::validation::Validator;

/// Named arguments for a unit of work.
///
/// Keys are kept sorted so the serialized form (and anything hashed from it)
/// does not depend on assignment order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(BTreeMap<String, Value>);

/// Default for [`Arguments::option_with`].
pub enum Fallback {
    Value(Value),
    /// Resolved only when the fallback is actually needed.
    Lazy(Box<dyn FnOnce() -> Value>),
}

impl Fallback {
    pub fn lazy<F>(f: F) -> Self
    where
        F: FnOnce() -> Value + 'static,
    {
        Fallback::Lazy(Box::new(f))
    }

    fn resolve(self) -> Value {
        match self {
            Fallback::Value(v) => v,
            Fallback::Lazy(f) => f(),
        }
    }
}

macro_rules! fallback_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Fallback {
            fn from(value: $ty) -> Self {
                Fallback::Value(value.into())
            }
        })*
    };
}

fallback_from!(Value, &str, String, bool, i32, i64, u64, f64);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Replace the whole mapping.
    pub fn replace<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.0 = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
    }

    /// Copy of the arguments without the given names.
    pub fn except(&self, names: &[&str]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !names.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }

    /// Required argument; absent and null are both missing.
    pub fn argument(&self, name: &str, owner: &str) -> RunResult<Value> {
        match self.0.get(name) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Err(RunError::missing_argument(name, owner)),
        }
    }

    pub fn argument_with(&self, name: &str, owner: &str, validator: &Validator) -> RunResult<Value> {
        let value = self.argument(name, owner)?;
        validator.check(name, &value)?;
        Ok(value)
    }

    /// Optional argument; absent, null and `""` fall back to `default`.
    pub fn option(&self, name: &str, default: impl Into<Value>) -> Value {
        self.present(name).cloned().unwrap_or_else(|| default.into())
    }

    /// Optional argument with a lazy default and an optional validator.
    ///
    /// The validator only sees non-null results.
    pub fn option_with(
        &self,
        name: &str,
        default: impl Into<Fallback>,
        validator: Option<&Validator>,
    ) -> RunResult<Value> {
        let value = match self.present(name) {
            Some(v) => v.clone(),
            None => default.into().resolve(),
        };
        if let (Some(validator), false) = (validator, value.is_null()) {
            validator.check(name, &value)?;
        }
        Ok(value)
    }

    fn present(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl TryFrom<Value> for Arguments {
    type Error = RunError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            Value::Null => Ok(Self::default()),
            other => Err(RunError::Serialization(format!(
                "arguments must be an object, got {other}"
            ))),
        }
    }
}

impl IntoIterator for Arguments {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Arguments {
        [
            ("name", json!("widget")),
            ("qty", json!(3)),
            ("note", json!("")),
            ("gone", Value::Null),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn argument_treats_null_as_missing() {
        let args = sample();
        assert_eq!(args.argument("name", "Create").unwrap(), json!("widget"));
        let err = args.argument("gone", "Create").unwrap_err();
        assert!(matches!(err, RunError::MissingArgument { ref owner, .. } if owner == "Create"));
        assert!(args.argument("absent", "Create").is_err());
    }

    #[test]
    fn option_falls_back_on_empty_string_null_and_absent() {
        let args = sample();
        assert_eq!(args.option("note", "n/a"), json!("n/a"));
        assert_eq!(args.option("gone", 7), json!(7));
        assert_eq!(args.option("absent", false), json!(false));
        assert_eq!(args.option("qty", 0), json!(3));
    }

    #[test]
    fn lazy_fallback_is_only_resolved_when_needed() {
        let args = sample();
        let value = args
            .option_with("qty", Fallback::lazy(|| panic!("should not resolve")), None)
            .unwrap();
        assert_eq!(value, json!(3));
        let value = args
            .option_with("absent", Fallback::lazy(|| json!("computed")), None)
            .unwrap();
        assert_eq!(value, json!("computed"));
    }

    #[test]
    fn option_validator_skips_null_defaults() {
        let args = sample();
        let v = Validator::named("is_int");
        assert!(args.option_with("absent", Value::Null, Some(&v)).is_ok());
        assert!(args.option_with("name", Value::Null, Some(&v)).is_err());
    }

    #[test]
    fn replace_swaps_the_whole_mapping() {
        let mut args = sample();
        args.replace([("only", 1)]);
        assert_eq!(args.len(), 1);
        assert!(!args.contains("name"));
    }

    #[test]
    fn serialization_is_order_independent() {
        let a: Arguments = [("b", 1), ("a", 2)].into_iter().collect();
        let b: Arguments = [("a", 2), ("b", 1)].into_iter().collect();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn except_drops_named_entries() {
        let args = sample().except(&["note", "gone"]);
        assert_eq!(args.len(), 2);
    }
}
