use crate::{
    StencilResult, coerce,
    directive::{Directive, Params},
    engine::Engine,
    scope::Context,
    value::Value,
};

pub type Conversion = fn(&Value) -> Value;
pub type Operation = fn(Value, Value) -> Value;
pub type ExitCheck = fn(&Value) -> bool;

/// Folds `args` left to right with a binary operation.
///
/// Each argument is resolved and converted just before it is used. When the
/// exit check accepts the running result, the remaining arguments are never
/// resolved. No arguments yield [`Value::None`].
#[derive(Debug, Clone, Copy)]
pub struct FoldDirective {
    convert: Conversion,
    operation: Operation,
    exit_when: Option<ExitCheck>,
}

impl FoldDirective {
    pub fn new(convert: Conversion, operation: Operation) -> Self {
        Self {
            convert,
            operation,
            exit_when: None,
        }
    }

    pub fn with_exit(mut self, exit_when: ExitCheck) -> Self {
        self.exit_when = Some(exit_when);
        self
    }

    /// Numbers are added, anything else is concatenated as text.
    pub fn addition() -> Self {
        Self::new(coerce::to_key, |a, b| match (a, b) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (a, b) => Value::String(coerce::to_string(&a) + &coerce::to_string(&b)),
        })
    }

    pub fn subtraction() -> Self {
        Self::new(to_number, |a, b| numeric(a, b, |a, b| a - b))
    }

    pub fn multiplication() -> Self {
        Self::new(to_number, |a, b| numeric(a, b, |a, b| a * b))
    }

    pub fn exponentiation() -> Self {
        Self::new(to_number, |a, b| numeric(a, b, |a, b| a.pow(b)))
    }

    pub fn division() -> Self {
        Self::new(to_number, |a, b| numeric(a, b, |a, b| a / b))
    }

    pub fn remainder() -> Self {
        Self::new(to_number, |a, b| numeric(a, b, |a, b| a % b))
    }

    pub fn and() -> Self {
        Self::new(to_boolean, |a, b| {
            Value::Bool(coerce::to_boolean(&a) && coerce::to_boolean(&b))
        })
        .with_exit(|value| !coerce::to_boolean(value))
    }

    pub fn or() -> Self {
        Self::new(to_boolean, |a, b| {
            Value::Bool(coerce::to_boolean(&a) || coerce::to_boolean(&b))
        })
        .with_exit(coerce::to_boolean)
    }

    /// First argument that is neither null nor absent.
    pub fn coalesce() -> Self {
        Self::new(Value::clone, |a, b| if a.is_nullish() { b } else { a })
            .with_exit(|value| !value.is_nullish())
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

fn to_number(value: &Value) -> Value {
    Value::Number(coerce::to_number(value))
}

fn to_boolean(value: &Value) -> Value {
    Value::Bool(coerce::to_boolean(value))
}

fn numeric(a: Value, b: Value, f: fn(crate::Number, crate::Number) -> crate::Number) -> Value {
    Value::Number(f(coerce::to_number(&a), coerce::to_number(&b)))
}

impl Directive for FoldDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let args = self.process_params(params, context, engine)?;
        let Some((first, rest)) = args.split_first() else {
            return Ok(Value::None);
        };

        let mut result = engine.resolve_typed(first, context, self.convert)?;
        for arg in rest {
            if self.exit_when.is_some_and(|exit| exit(&result)) {
                break;
            }
            let right = engine.resolve_typed(arg, context, self.convert)?;
            result = (self.operation)(result, right);
        }

        Ok(result)
    }
}

/// Boolean negation of `value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegationDirective;

impl Directive for NegationDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        engine.resolve_typed(&params.get("value"), context, |value| {
            Value::Bool(!coerce::to_boolean(value))
        })
    }
}
