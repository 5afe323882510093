use crate::{
    StencilResult, coerce,
    directive::{Directive, Params},
    engine::Engine,
    scope::Context,
    value::Value,
};

pub struct IfThenFork {
    pub condition: bool,
    pub then: Value,
    pub otherwise: Value,
}

/// Resolves `then` or `else` depending on `if`. The other branch is never resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct IfThenDirective;

impl IfThenDirective {
    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<IfThenFork, crate::Error> {
        Ok(IfThenFork {
            condition: engine.resolve_typed(&params.get("if"), context, coerce::to_boolean)?,
            then: params.get("then"),
            otherwise: params.get("else"),
        })
    }
}

impl Directive for IfThenDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let fork = self.process_params(params, context, engine)?;
        if fork.condition {
            engine.resolve(&fork.then, context)
        } else {
            engine.resolve(&fork.otherwise, context)
        }
    }
}
