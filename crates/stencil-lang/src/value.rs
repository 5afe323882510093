use std::fmt::{self, Debug, Display, Formatter};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{Shared, SharedCell, coerce, error::Error, number::Number};

/// Insertion-ordered property map of an object value.
pub type Map = IndexMap<SmolStr, Value, FxBuildHasher>;
pub type ArrayRef = Shared<SharedCell<Vec<Value>>>;
pub type ObjectRef = Shared<SharedCell<Map>>;

pub type NativeFunction = dyn Fn(&[Value]) -> Result<Value, Error>;

/// Host or template supplied function value.
#[derive(Clone)]
pub struct Callable(Shared<NativeFunction>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + 'static,
    {
        Self(Shared::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Shared::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({:p})", Shared::as_ptr(&self.0) as *const ())
    }
}

/// A template, a context entry or a resolved result.
///
/// Arrays and objects are shared and interior-mutable, so two values may alias
/// the same container and a container may (indirectly) contain itself.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value. Distinct from [`Value::Null`].
    #[default]
    None,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Callable),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Shared::new(SharedCell::new(items)))
    }

    pub fn object(map: Map) -> Self {
        Value::Object(Shared::new(SharedCell::new(map)))
    }

    pub fn empty_object() -> Self {
        Value::object(Map::default())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + 'static,
    {
        Value::Function(Callable::new(f))
    }

    #[inline(always)]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// `true` for both null and absent values.
    #[inline(always)]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::None | Value::Null)
    }

    #[inline(always)]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Callable> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Type name used by type checks, with arrays and null told apart from objects.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Identity comparison. Only containers and functions have an identity.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Shared::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Shared::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Property of an object value, or [`Value::None`].
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.borrow().get(key).cloned().unwrap_or_default(),
            _ => Value::None,
        }
    }

    /// New container holding the same entries. Other values are returned as is.
    pub fn shallow_copy(&self) -> Value {
        match self {
            Value::Array(items) => Value::array(items.borrow().clone()),
            Value::Object(map) => Value::object(map.borrow().clone()),
            _ => self.clone(),
        }
    }

    /// Renders the value as JSON. Absent values and functions are dropped
    /// from objects and become `null` inside arrays.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        let mut ancestors: SmallVec<[*const (); 16]> = SmallVec::new();
        self.to_json_inner(&mut ancestors)
    }

    fn to_json_inner(
        &self,
        ancestors: &mut SmallVec<[*const (); 16]>,
    ) -> Result<serde_json::Value, Error> {
        match self {
            Value::None | Value::Null | Value::Function(_) => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Number(n) if n.is_int() && n.value().abs() < 9_007_199_254_740_992.0 => {
                Ok(serde_json::Value::from(n.to_int()))
            }
            Value::Number(n) => Ok(serde_json::Number::from_f64(n.value())
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null)),
            Value::String(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Array(items) => {
                let ptr = Shared::as_ptr(items) as *const ();
                if ancestors.contains(&ptr) {
                    return Err(Error::CyclicValue);
                }

                ancestors.push(ptr);
                let items = items.borrow().clone();
                let json = items
                    .iter()
                    .map(|item| item.to_json_inner(ancestors))
                    .collect::<Result<Vec<_>, _>>()?;
                ancestors.pop();

                Ok(serde_json::Value::Array(json))
            }
            Value::Object(map) => {
                let ptr = Shared::as_ptr(map) as *const ();
                if ancestors.contains(&ptr) {
                    return Err(Error::CyclicValue);
                }

                ancestors.push(ptr);
                let entries = map.borrow().clone();
                let mut json = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries.iter() {
                    if matches!(value, Value::None | Value::Function(_)) {
                        continue;
                    }
                    json.insert(key.to_string(), value.to_json_inner(ancestors)?);
                }
                ancestors.pop();

                Ok(serde_json::Value::Object(json))
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Shared::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => {
                if Shared::ptr_eq(a, b) {
                    return true;
                }

                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| value == other))
            }
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            // A container that cannot be borrowed mutably is being formatted further up.
            Value::Array(items) if items.try_borrow_mut().is_err() => write!(f, "[Circular]"),
            Value::Object(map) if map.try_borrow_mut().is_err() => write!(f, "{{Circular}}"),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.borrow().iter()).finish(),
            Value::Function(callable) => write!(f, "{:?}", callable),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", coerce::to_string(self))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::object(map)
    }
}

impl From<Callable> for Value {
    fn from(callable: Callable) -> Self {
        Value::Function(callable)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Value::array(iter.into_iter().collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN).into()),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => items.into_iter().map(Value::from).collect(),
            serde_json::Value::Object(entries) => Value::object(
                entries
                    .into_iter()
                    .map(|(key, value)| (SmolStr::from(key), Value::from(value)))
                    .collect(),
            ),
        }
    }
}
