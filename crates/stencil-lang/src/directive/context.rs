use crate::{
    StencilResult,
    directive::{Directive, Params},
    engine::Engine,
    optimizer::Optimized,
    scope::Context,
};

/// Returns the current context, for handing it to host functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextDirective;

impl Directive for ContextDirective {
    fn execute(&self, _params: &Params, context: &Context, _engine: &Engine) -> StencilResult {
        Ok(context.as_value())
    }

    fn optimize_template(&self, params: &Params, _engine: &Engine) -> Option<Optimized> {
        Some(params.preserve())
    }
}
