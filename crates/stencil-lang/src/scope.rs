use smol_str::SmolStr;

use crate::{
    Shared, SharedCell,
    error::Error,
    value::{Map, ObjectRef, Value},
};

const PARENT: &str = "parent";
const SOURCE: &str = "source";
const KEY: &str = "key";
const DIRECTIVE: &str = "directive";

/// Key-value bag that templates are resolved against.
///
/// A context is an object value. Cloning a context shares it; use
/// [`Context::create_local`] to open a new scope.
#[derive(Debug, Clone)]
pub struct Context(ObjectRef);

impl Default for Context {
    fn default() -> Self {
        Self(Shared::new(SharedCell::new(Map::default())))
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn insert(&self, key: impl Into<SmolStr>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    /// The context as an object value sharing the same entries.
    pub fn as_value(&self) -> Value {
        Value::Object(Shared::clone(&self.0))
    }

    /// Shallow copy with one entry replaced.
    pub fn with_entry(&self, key: impl Into<SmolStr>, value: Value) -> Context {
        let mut map = self.0.borrow().clone();
        map.insert(key.into(), value);
        Context::from(map)
    }

    /// Opens a new scope.
    ///
    /// The result is a shallow copy of this context whose local-variable slot
    /// holds a shallow copy of the current locals (or a new empty object).
    /// Writes to a variable of the new scope are never seen by this one, while
    /// mutations inside a container held by a variable are.
    pub fn create_local(&self, locals_key: &str) -> Context {
        let locals = match self.get(locals_key) {
            Value::Object(vars) => Value::object(vars.borrow().clone()),
            _ => Value::empty_object(),
        };
        self.with_entry(locals_key, locals)
    }

    pub fn local_value(&self, locals_key: &str, name: &str) -> Value {
        self.get(locals_key).get(name)
    }

    /// Writes a local variable. Without a local-variable slot the write is
    /// silently dropped and `false` is returned.
    pub fn set_local_value(&self, locals_key: &str, name: &str, value: Value) -> bool {
        match self.get(locals_key) {
            Value::Object(vars) => {
                vars.borrow_mut().insert(name.into(), value);
                true
            }
            _ => false,
        }
    }

    pub fn resolution_state(&self, state_key: &str) -> Option<ResolutionState> {
        ResolutionState::from_value(&self.get(state_key))
    }
}

impl From<Map> for Context {
    fn from(map: Map) -> Self {
        Self(Shared::new(SharedCell::new(map)))
    }
}

impl TryFrom<Value> for Context {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::None => Ok(Self::default()),
            other => Err(Error::InvalidContext(other.type_name())),
        }
    }
}

/// Builds a context from JSON data.
///
/// Anything other than an object or `null` yields an empty context. Use
/// [`Context::try_from`] on a [`Value`] to reject such input instead.
impl From<serde_json::Value> for Context {
    fn from(json: serde_json::Value) -> Self {
        Context::try_from(Value::from(json)).unwrap_or_default()
    }
}

/// Record of where the engine currently is inside a template.
///
/// Stored in the context as an ordinary object with `parent`, `source`, `key`
/// and `directive` entries, so templates can read it with a path lookup.
#[derive(Debug, Clone)]
pub struct ResolutionState(ObjectRef);

impl ResolutionState {
    /// State for resolving the property or element `key` of `source`.
    pub fn for_property(parent: Option<&ResolutionState>, source: Value, key: Value) -> Self {
        let state = Self::with_parent(parent, source);
        state.0.borrow_mut().insert(KEY.into(), key);
        state
    }

    /// State for executing the directive `id` invoked by `source`.
    pub fn for_directive(parent: Option<&ResolutionState>, source: Value, id: &str) -> Self {
        let state = Self::with_parent(parent, source);
        state.0.borrow_mut().insert(DIRECTIVE.into(), id.into());
        state
    }

    fn with_parent(parent: Option<&ResolutionState>, source: Value) -> Self {
        let mut map = Map::default();
        if let Some(parent) = parent {
            map.insert(PARENT.into(), parent.as_value());
        }
        map.insert(SOURCE.into(), source);
        Self(Shared::new(SharedCell::new(map)))
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(Shared::clone(map))),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Value {
        Value::Object(Shared::clone(&self.0))
    }

    pub fn parent(&self) -> Option<ResolutionState> {
        Self::from_value(&self.as_value().get(PARENT))
    }

    pub fn source(&self) -> Value {
        self.as_value().get(SOURCE)
    }

    pub fn key(&self) -> Value {
        self.as_value().get(KEY)
    }

    pub fn directive(&self) -> Option<String> {
        self.as_value().get(DIRECTIVE).as_str().map(str::to_string)
    }

    /// This state followed by each of its ancestors, nearest first.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    /// Walks up from this state and stops at the first state accepted by `predicate`.
    pub fn find_ancestor<F>(&self, mut predicate: F) -> Option<ResolutionState>
    where
        F: FnMut(&ResolutionState) -> bool,
    {
        self.ancestors().find(|state| predicate(state))
    }
}

pub struct Ancestors {
    next: Option<ResolutionState>,
}

impl Iterator for Ancestors {
    type Item = ResolutionState;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}
