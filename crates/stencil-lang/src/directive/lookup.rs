use smallvec::SmallVec;

use crate::{
    Shared, SharedCell, StencilResult,
    directive::{Directive, Params, methods},
    engine::Engine,
    error::Error,
    number::Number,
    optimizer::Optimized,
    scope::Context,
    value::{ObjectRef, Value},
};

/// One step of a lookup path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    Key(String),
    Index(Number),
    /// `{name, args}`: call the method or function stored under `name`.
    Call { name: String, args: Vec<Value> },
}

impl PathStep {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(key) => Some(PathStep::Key(key.clone())),
            Value::Number(index) => Some(PathStep::Index(*index)),
            Value::Object(_) => match value.get("name") {
                Value::String(name) => {
                    let args = match value.get("args") {
                        Value::Array(args) => args.borrow().clone(),
                        _ => Vec::new(),
                    };
                    Some(PathStep::Call { name, args })
                }
                _ => None,
            },
            _ => None,
        }
    }
}

/// Follows `path` from `source`, or from the context when `source` is null or
/// absent. Each step is resolved before use. Any step that cannot be followed
/// yields [`Value::None`].
pub fn resolve_path(
    source: &Value,
    path: &[Value],
    context: &Context,
    engine: &Engine,
) -> StencilResult {
    let mut target = if source.is_nullish() {
        context.as_value()
    } else {
        source.clone()
    };

    for step in path {
        if !matches!(target, Value::Array(_) | Value::Object(_) | Value::Function(_)) {
            return Ok(Value::None);
        }

        let resolved = engine.resolve(step, context)?;
        let Some(step) = PathStep::from_value(&resolved) else {
            return Ok(Value::None);
        };
        target = resolve_step(&target, &step)?;
    }

    Ok(target)
}

/// Reads one step. Method calls on arrays run on a shallow copy, so the
/// array itself is never changed.
pub fn resolve_step(parent: &Value, step: &PathStep) -> StencilResult {
    match (parent, step) {
        (Value::Array(items), PathStep::Call { name, args }) => {
            let copy = Shared::new(SharedCell::new(items.borrow().clone()));
            methods::call_array_method(&copy, name, args)
        }
        (Value::Array(items), PathStep::Key(key)) if key == "length" => {
            Ok(Value::from(items.borrow().len()))
        }
        (Value::Array(items), PathStep::Key(key)) => Ok(array_index(key)
            .and_then(|index| items.borrow().get(index).cloned())
            .unwrap_or_default()),
        (Value::Array(items), PathStep::Index(index)) => Ok(index
            .to_index()
            .and_then(|index| items.borrow().get(index).cloned())
            .unwrap_or_default()),
        (Value::Object(map), PathStep::Call { name, args }) => call_property(map, name, args),
        (Value::Object(map), PathStep::Key(key)) => {
            Ok(map.borrow().get(key.as_str()).cloned().unwrap_or_default())
        }
        (Value::Object(map), PathStep::Index(index)) => Ok(map
            .borrow()
            .get(index.to_string().as_str())
            .cloned()
            .unwrap_or_default()),
        _ => Ok(Value::None),
    }
}

/// Calls the function stored under `name`. Anything else yields [`Value::None`].
pub fn call_property(owner: &ObjectRef, name: &str, args: &[Value]) -> StencilResult {
    let property = owner.borrow().get(name).cloned();
    match property {
        Some(Value::Function(callable)) => callable.call(args),
        _ => Ok(Value::None),
    }
}

/// Canonical decimal index such as `"2"`. `"02"` and `"-1"` are not indices.
pub(crate) fn array_index(key: &str) -> Option<usize> {
    key.parse::<usize>()
        .ok()
        .filter(|index| index.to_string() == key)
}

pub struct GetNestedValueParams {
    pub source: Value,
    pub path: Vec<Value>,
    pub default: Value,
}

/// Looks up `path` in `source` (default: the context) and returns a deep copy
/// of what it finds. `default` is resolved only when nothing was found.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetNestedValueDirective;

impl GetNestedValueDirective {
    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<GetNestedValueParams, Error> {
        Ok(GetNestedValueParams {
            source: engine.resolve(&params.get("source"), context)?,
            path: engine.get_array(&params.get("path"), context)?,
            default: params.get("default"),
        })
    }
}

impl Directive for GetNestedValueDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = self.process_params(params, context, engine)?;
        let value = resolve_path(&input.source, &input.path, context, engine)?;

        if value.is_none() && !input.default.is_none() {
            return engine.resolve(&input.default, context);
        }

        Ok(engine.deep_copy(&value))
    }

    fn optimize_template(&self, params: &Params, _engine: &Engine) -> Option<Optimized> {
        Some(params.preserve())
    }
}

/// Looks up `path` inside the local variables. The found value is returned
/// without copying.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetLocalVariableDirective;

impl Directive for GetLocalVariableDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = GetNestedValueDirective.process_params(params, context, engine)?;

        let mut path: SmallVec<[Value; 8]> = SmallVec::with_capacity(input.path.len() + 1);
        path.push(Value::from(engine.options().local_variables_key.clone()));
        path.extend(input.path);

        resolve_path(&input.source, &path, context, engine)
    }

    fn optimize_template(&self, params: &Params, _engine: &Engine) -> Option<Optimized> {
        Some(params.preserve())
    }
}
