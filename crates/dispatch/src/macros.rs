//! Process-wide builder macros.
//!
//! A macro is a named method [`Builder::call`] resolves before falling back
//! to argument assignment. The registry is shared by every builder in the
//! process.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use cadence_core::RunResult;
use serde_json::Value;
use tracing::{debug, warn};

use crate::builder::Builder;
use crate::runnable::Fluent;

pub type BoundMacro = Arc<dyn Fn(&mut Builder, &[Value]) -> RunResult<Fluent> + Send + Sync>;
pub type FreeMacro = Arc<dyn Fn(&[Value]) -> RunResult<Value> + Send + Sync>;

#[derive(Clone)]
pub enum Macro {
    /// Receives the calling builder.
    Bound(BoundMacro),
    /// Receives only the call arguments.
    Free(FreeMacro),
    /// Forwarded to the base runnable's `call` under the same name.
    Forward,
}

impl Macro {
    pub fn bound<F>(f: F) -> Self
    where
        F: Fn(&mut Builder, &[Value]) -> RunResult<Fluent> + Send + Sync + 'static,
    {
        Macro::Bound(Arc::new(f))
    }

    pub fn free<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> RunResult<Value> + Send + Sync + 'static,
    {
        Macro::Free(Arc::new(f))
    }
}

impl std::fmt::Debug for Macro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Macro::Bound(_) => f.write_str("Macro::Bound"),
            Macro::Free(_) => f.write_str("Macro::Free"),
            Macro::Forward => f.write_str("Macro::Forward"),
        }
    }
}

/// Bulk source of macros for [`mixin`].
pub trait Mixin {
    fn macros(&self) -> Vec<(String, Macro)>;
}

static MACROS: LazyLock<RwLock<HashMap<String, Macro>>> = LazyLock::new(|| RwLock::new(HashMap::new()));

pub fn register(name: impl Into<String>, mac: Macro) {
    let name = name.into();
    match MACROS.write() {
        Ok(mut macros) => {
            debug!(%name, kind = ?mac, "registering builder macro");
            macros.insert(name, mac);
        }
        Err(_) => warn!(%name, "macro registry poisoned; macro not registered"),
    }
}

pub fn has(name: &str) -> bool {
    MACROS.read().map(|m| m.contains_key(name)).unwrap_or(false)
}

/// Returns whether a macro was removed.
pub fn forget(name: &str) -> bool {
    MACROS.write().map(|mut m| m.remove(name).is_some()).unwrap_or(false)
}

pub(crate) fn lookup(name: &str) -> Option<Macro> {
    MACROS.read().ok()?.get(name).cloned()
}

/// Register every macro `source` offers. Existing names are kept unless
/// `replace` is set.
pub fn mixin(source: &dyn Mixin, replace: bool) {
    for (name, mac) in source.macros() {
        if replace || !has(&name) {
            register(name, mac);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Extras;

    impl Mixin for Extras {
        fn macros(&self) -> Vec<(String, Macro)> {
            vec![
                ("macros_test_answer".to_string(), Macro::free(|_| Ok(Value::from(42)))),
                ("macros_test_keep".to_string(), Macro::Forward),
            ]
        }
    }

    #[test]
    fn mixin_respects_replace() {
        register("macros_test_keep", Macro::free(|_| Ok(Value::Null)));
        mixin(&Extras, false);

        assert!(has("macros_test_answer"));
        assert!(matches!(lookup("macros_test_keep"), Some(Macro::Free(_))));

        mixin(&Extras, true);
        assert!(matches!(lookup("macros_test_keep"), Some(Macro::Forward)));

        assert!(forget("macros_test_answer"));
        assert!(forget("macros_test_keep"));
        assert!(!has("macros_test_answer"));
    }
}
