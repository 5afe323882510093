use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    Shared, StencilResult, coerce,
    directive::{Directive, Params},
    engine::Engine,
    error::Error,
    optimizer::Optimized,
    scope::Context,
    value::{Map, Value},
};

/// Context key holding the arguments of a callback call.
pub const ARGS_KEY: &str = "$args";

pub type Conversion = Shared<dyn Fn(&Value) -> Value>;

/// Wraps `value` in a function. Each call resolves `value` in a new local
/// scope of the defining context, with the call arguments under `$args`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackDirective;

impl CallbackDirective {
    pub fn cast_to_function(value: Value, context: &Context, engine: &Engine) -> Value {
        let context = context.clone();
        let engine = engine.clone();

        Value::function(move |args| {
            let local = engine.create_local_context(&context);
            local.insert(ARGS_KEY, Value::array(args.to_vec()));
            engine.resolve(&value, &local)
        })
    }
}

impl Directive for CallbackDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        Ok(Self::cast_to_function(params.get("value"), context, engine))
    }
}

pub struct TypeConversionParams {
    pub value: Value,
    pub types: Vec<String>,
}

/// Converts `value` to the first type named in `as`, unless its type is
/// already one of them.
#[derive(Clone)]
pub struct TypeConversionDirective {
    conversions: FxHashMap<SmolStr, Conversion>,
}

impl Default for TypeConversionDirective {
    fn default() -> Self {
        let mut directive = Self {
            conversions: FxHashMap::default(),
        };

        directive
            .insert("string", |value| Value::String(coerce::to_string(value)))
            .insert("number", |value| Value::Number(coerce::to_number(value)))
            .insert("boolean", |value| Value::Bool(coerce::to_boolean(value)))
            .insert("object", to_object)
            .insert("array", to_array)
            .insert("null", |_| Value::Null)
            .insert("undefined", |_| Value::None);

        directive
    }
}

impl TypeConversionDirective {
    /// Adds or replaces the conversion for `type_name`.
    pub fn with_conversion<F>(mut self, type_name: &str, conversion: F) -> Self
    where
        F: Fn(&Value) -> Value + 'static,
    {
        self.insert(type_name, conversion);
        self
    }

    fn insert<F>(&mut self, type_name: &str, conversion: F) -> &mut Self
    where
        F: Fn(&Value) -> Value + 'static,
    {
        self.conversions
            .insert(SmolStr::new(type_name), Shared::new(conversion));
        self
    }

    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<TypeConversionParams, Error> {
        Ok(TypeConversionParams {
            value: engine.resolve(&params.get("value"), context)?,
            types: engine.get_typed_array(&params.get("as"), context, coerce::to_string)?,
        })
    }

    pub fn cast_value_as(
        &self,
        value: Value,
        types: &[String],
        context: &Context,
        engine: &Engine,
    ) -> Value {
        let Some(target) = types.first() else {
            return value;
        };
        if types.iter().any(|name| name == value.type_name()) {
            return value;
        }

        match self.conversions.get(target.as_str()) {
            Some(conversion) => conversion(&value),
            None if target == "function" => CallbackDirective::cast_to_function(value, context, engine),
            None => value,
        }
    }
}

impl Directive for TypeConversionDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = self.process_params(params, context, engine)?;
        Ok(self.cast_value_as(input.value, &input.types, context, engine))
    }
}

fn to_object(value: &Value) -> Value {
    if let Value::String(text) = value
        && let Ok(parsed @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(text)
    {
        return Value::from(parsed);
    }

    let mut map = Map::default();
    map.insert(SmolStr::new_static("value"), value.clone());
    Value::object(map)
}

fn to_array(value: &Value) -> Value {
    if let Value::String(text) = value
        && let Ok(parsed @ serde_json::Value::Array(_)) = serde_json::from_str::<serde_json::Value>(text)
    {
        return Value::from(parsed);
    }

    match value {
        Value::Array(_) => value.clone(),
        _ => Value::array(vec![value.clone()]),
    }
}

/// Returns a copy of `value` without resolving it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralValueDirective;

impl Directive for LiteralValueDirective {
    fn execute(&self, params: &Params, _context: &Context, engine: &Engine) -> StencilResult {
        Ok(engine.deep_copy(&params.get("value")))
    }

    fn optimize_template(&self, params: &Params, _engine: &Engine) -> Option<Optimized> {
        let value = params.get("value");
        if value.is_container() {
            Some(params.preserve())
        } else {
            Some(Optimized::executable(value))
        }
    }
}

/// Resolves `value`, then resolves the result once more. Runs templates
/// that are stored as data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveValueDirective;

impl Directive for ResolveValueDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let value = engine.resolve(&params.get("value"), context)?;
        engine.resolve(&value, context)
    }
}
