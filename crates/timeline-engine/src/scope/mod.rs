//! Variable scopes
//!
//! Each expansion copy of a timeline owns one scope seeded with its
//! variable-assignment record and chained to the scope of the enclosing
//! copy. Lookups walk the chain upward; the innermost binding wins.
//!
//! Scopes are cheap to clone (a shared pointer to an immutable frame).
//! Binding into a scope that is already shared copies its local frame first,
//! so children created earlier keep seeing what they saw.

use crate::error::ScopeError;
use crate::types::VariableRecord;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Key marking a variable placeholder inside trial parameters
pub const VARIABLE_KEY: &str = "$var";

#[derive(Debug, Clone, Default)]
struct ScopeFrame {
    vars: IndexMap<String, Value>,
    parent: Option<VariableScope>,
}

/// Chained name → value mapping
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    inner: Arc<ScopeFrame>,
}

impl VariableScope {
    /// Empty scope with no parent
    pub fn root() -> Self {
        Self::default()
    }

    /// Empty scope chained to `self`
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(ScopeFrame {
                vars: IndexMap::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Child scope seeded with every binding of `record`
    #[must_use]
    pub fn with_record(&self, record: &VariableRecord) -> Self {
        let mut scope = self.child();
        for (name, value) in record {
            scope.bind(name.clone(), value.clone());
        }
        scope
    }

    /// Insert or overwrite a binding in this scope's local frame only
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        Arc::make_mut(&mut self.inner).vars.insert(name.into(), value);
    }

    /// Resolve `name`, checking this frame first and then each parent
    pub fn resolve(&self, name: &str) -> Result<&Value, ScopeError> {
        self.lookup(name)
            .ok_or_else(|| ScopeError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(value) = scope.inner.vars.get(name) {
                return Some(value);
            }
            current = scope.inner.parent.as_ref();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Bindings held locally, ignoring parents
    pub fn local(&self) -> &IndexMap<String, Value> {
        &self.inner.vars
    }

    pub fn parent(&self) -> Option<&VariableScope> {
        self.inner.parent.as_ref()
    }

    /// Number of frames in the chain, this one included
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = Some(self);
        while let Some(scope) = current {
            depth += 1;
            current = scope.inner.parent.as_ref();
        }
        depth
    }

    /// Every visible binding, resolved as `resolve` would
    pub fn flatten(&self) -> IndexMap<String, Value> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        while let Some(scope) = current {
            chain.push(scope);
            current = scope.inner.parent.as_ref();
        }
        let mut out = IndexMap::new();
        for scope in chain.into_iter().rev() {
            for (name, value) in &scope.inner.vars {
                out.insert(name.clone(), value.clone());
            }
        }
        out
    }
}

/// Replace every `{"$var": "name"}` placeholder in `value` with its binding
pub fn substitute(value: &Value, scope: &VariableScope) -> Result<Value, ScopeError> {
    match value {
        Value::Object(map) => {
            if let Some(name) = placeholder_name(map) {
                return scope.resolve(name).cloned();
            }
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                out.insert(key.clone(), substitute(inner, scope)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| substitute(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn placeholder_name(map: &serde_json::Map<String, Value>) -> Option<&str> {
    if map.len() != 1 {
        return None;
    }
    map.get(VARIABLE_KEY).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> VariableRecord {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn resolve_walks_to_parent() {
        let outer = VariableScope::root().with_record(&record(&[("word", json!("a"))]));
        let inner = outer.with_record(&record(&[("color", json!("red"))]));

        assert_eq!(inner.resolve("word").unwrap(), &json!("a"));
        assert_eq!(inner.resolve("color").unwrap(), &json!("red"));
        assert_eq!(inner.depth(), 3);
    }

    #[test]
    fn innermost_binding_wins() {
        let outer = VariableScope::root().with_record(&record(&[("word", json!("a"))]));
        let inner = outer.with_record(&record(&[("word", json!("b"))]));

        assert_eq!(inner.resolve("word").unwrap(), &json!("b"));
        assert_eq!(outer.resolve("word").unwrap(), &json!("a"));
    }

    #[test]
    fn undefined_variable() {
        let scope = VariableScope::root();
        assert_eq!(
            scope.resolve("missing"),
            Err(ScopeError::UndefinedVariable {
                name: "missing".to_string()
            })
        );
    }

    #[test]
    fn bind_only_touches_local_frame() {
        let parent = VariableScope::root().with_record(&record(&[("x", json!(1))]));
        let mut left = parent.child();
        let right = parent.child();

        left.bind("x", json!(2));

        assert_eq!(left.resolve("x").unwrap(), &json!(2));
        assert_eq!(right.resolve("x").unwrap(), &json!(1));
        assert_eq!(parent.resolve("x").unwrap(), &json!(1));
    }

    #[test]
    fn flatten_prefers_inner() {
        let outer = VariableScope::root().with_record(&record(&[("a", json!(1)), ("b", json!(1))]));
        let inner = outer.with_record(&record(&[("b", json!(2))]));
        let flat = inner.flatten();
        assert_eq!(flat.get("a"), Some(&json!(1)));
        assert_eq!(flat.get("b"), Some(&json!(2)));
    }

    #[test]
    fn substitute_nested_placeholders() {
        let scope = VariableScope::root().with_record(&record(&[("word", json!("dog"))]));
        let params = json!({
            "stimulus": {"$var": "word"},
            "choices": ["f", {"$var": "word"}],
            "nested": {"prompt": "press", "extra": 3},
        });

        let resolved = substitute(&params, &scope).unwrap();

        assert_eq!(
            resolved,
            json!({
                "stimulus": "dog",
                "choices": ["f", "dog"],
                "nested": {"prompt": "press", "extra": 3},
            })
        );
    }

    #[test]
    fn substitute_undefined_placeholder_fails() {
        let params = json!({"stimulus": {"$var": "word"}});
        assert!(substitute(&params, &VariableScope::root()).is_err());
    }
}
