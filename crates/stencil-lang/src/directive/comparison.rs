use crate::{
    StencilResult, coerce,
    directive::{Directive, Params},
    engine::Engine,
    scope::Context,
    value::Value,
};

pub type Comparison = fn(&Value, &Value) -> bool;

/// Checks every adjacent pair of `args` and stops at the first failing pair.
/// Fewer than two arguments yield `false`.
#[derive(Debug, Clone, Copy)]
pub struct SerialComparisonDirective {
    compare: Comparison,
}

impl SerialComparisonDirective {
    pub fn new(compare: Comparison) -> Self {
        Self { compare }
    }

    pub fn equal() -> Self {
        Self::new(coerce::loose_eq)
    }

    pub fn strict_equal() -> Self {
        Self::new(coerce::strict_eq)
    }

    pub fn not_equal() -> Self {
        Self::new(|a, b| !coerce::loose_eq(a, b))
    }

    pub fn strict_not_equal() -> Self {
        Self::new(|a, b| !coerce::strict_eq(a, b))
    }

    pub fn less_than() -> Self {
        Self::new(coerce::less_than)
    }

    pub fn less_or_equal() -> Self {
        Self::new(coerce::less_or_equal)
    }

    pub fn greater_than() -> Self {
        Self::new(coerce::greater_than)
    }

    pub fn greater_or_equal() -> Self {
        Self::new(coerce::greater_or_equal)
    }

    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<Vec<Value>, crate::Error> {
        engine.get_array(&params.get("args"), context)
    }
}

impl Directive for SerialComparisonDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let args = self.process_params(params, context, engine)?;
        let Some((first, rest)) = args.split_first() else {
            return Ok(Value::Bool(false));
        };
        if rest.is_empty() {
            return Ok(Value::Bool(false));
        }

        let mut left = engine.resolve(first, context)?;
        for arg in rest {
            let right = engine.resolve(arg, context)?;
            if !(self.compare)(&left, &right) {
                return Ok(Value::Bool(false));
            }
            left = right;
        }

        Ok(Value::Bool(true))
    }
}

pub struct RangeParams {
    pub value: Value,
    pub min: Value,
    pub max: Value,
}

/// `min <= value && value <= max`
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueInRangeDirective;

impl ValueInRangeDirective {
    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<RangeParams, crate::Error> {
        Ok(RangeParams {
            value: engine.resolve(&params.get("value"), context)?,
            min: engine.resolve(&params.get("min"), context)?,
            max: engine.resolve(&params.get("max"), context)?,
        })
    }
}

impl Directive for ValueInRangeDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let range = self.process_params(params, context, engine)?;
        Ok(Value::Bool(
            coerce::less_or_equal(&range.min, &range.value)
                && coerce::less_or_equal(&range.value, &range.max),
        ))
    }
}
