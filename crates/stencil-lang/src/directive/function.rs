use crate::{
    StencilResult,
    directive::{Directive, Params},
    engine::Engine,
    optimizer::Optimized,
    scope::Context,
    value::Value,
};

pub struct FunctionCallParams {
    pub target: Value,
    pub args: Vec<Value>,
}

/// Calls the function `target` with the resolved `args`. Anything that is not
/// a function yields [`Value::None`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionCallDirective;

impl FunctionCallDirective {
    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<FunctionCallParams, crate::Error> {
        Ok(FunctionCallParams {
            target: engine.resolve(&params.get("target"), context)?,
            args: engine.resolve_as_array(&params.get("args"), context)?,
        })
    }
}

impl Directive for FunctionCallDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let call = self.process_params(params, context, engine)?;
        match call.target {
            Value::Function(callable) => callable.call(&call.args),
            _ => Ok(Value::None),
        }
    }

    // Host functions may have side effects, so calls always wait for resolution.
    fn optimize_template(&self, params: &Params, _engine: &Engine) -> Option<Optimized> {
        Some(params.preserve())
    }
}
