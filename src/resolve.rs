//! Identifier resolution.
//!
//! A [`Resolver`] is how callers feed known facts into the engine. It maps a
//! dotted identifier path (already split into segments) to a value, or
//! returns `None` when the value is not known ahead of time. `None` is not an
//! error: the identifier simply becomes a free solver variable.
//!
//! Within one solve a resolver is called at most once per distinct path and
//! must behave as a pure function of its input.

use std::collections::HashMap;

use crate::types::Value;

pub trait Resolver {
    fn resolve(&self, path: &[String]) -> Option<Value>;
}

impl<F> Resolver for F
where
    F: Fn(&[String]) -> Option<Value>,
{
    fn resolve(&self, path: &[String]) -> Option<Value> {
        self(path)
    }
}

/// Resolver that knows nothing: every identifier is free.
#[derive(Debug, Default, Copy, Clone)]
pub struct Unresolved;

impl Resolver for Unresolved {
    fn resolve(&self, _path: &[String]) -> Option<Value> {
        None
    }
}

/// Map-backed resolver keyed by dotted path (`"env.stage"`).
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value);
        self
    }

    pub fn insert(&mut self, path: &str, value: impl Into<Value>) {
        self.values.insert(path.to_string(), value.into());
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Resolver for Bindings {
    fn resolve(&self, path: &[String]) -> Option<Value> {
        self.get(&path.join(".")).cloned()
    }
}

impl FromIterator<(String, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Vec<String> {
        s.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_bindings() {
        let bindings = Bindings::new().with("env.stage", "dev").with("level", 4);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings.resolve(&path("env.stage")), Some(Value::from("dev")));
        assert_eq!(bindings.resolve(&path("level")), Some(Value::Int(4)));
        assert_eq!(bindings.resolve(&path("env")), None);
    }

    #[test]
    fn test_closure() {
        let resolver = |p: &[String]| -> Option<Value> {
            if p.first().map(String::as_str) == Some("user") {
                Some(Value::from(p.len() as i64))
            } else {
                None
            }
        };
        assert_eq!(resolver.resolve(&path("user.id")), Some(Value::Int(2)));
        assert_eq!(resolver.resolve(&path("group")), None);
    }

    #[test]
    fn test_unresolved() {
        assert_eq!(Unresolved.resolve(&path("anything")), None);
    }
}
