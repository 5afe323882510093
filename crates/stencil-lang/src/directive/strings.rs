use std::fmt;

use crate::{
    Shared, StencilResult, coerce,
    directive::{Directive, Params},
    engine::Engine,
    optimizer::Optimized,
    scope::Context,
};

pub type ParseString = dyn Fn(&str, &Context) -> StencilResult;
pub type OptimizeParse = dyn Fn(&Params, &Engine) -> Option<Optimized>;

/// Turns `text` into a value with a host supplied parser, such as a string
/// template engine. The parser sees the calling context.
#[derive(Clone)]
pub struct ParseStringDirective {
    parse: Shared<ParseString>,
    optimize: Option<Shared<OptimizeParse>>,
}

impl ParseStringDirective {
    pub fn new<F>(parse: F) -> Self
    where
        F: Fn(&str, &Context) -> StencilResult + 'static,
    {
        Self {
            parse: Shared::new(parse),
            optimize: None,
        }
    }

    /// Lets the optimizer rewrite the invocation, for example to precompile
    /// `text` into a `call` invocation. Without one, or when it returns
    /// `None`, the invocation is kept as written.
    pub fn with_optimizer<F>(mut self, optimize: F) -> Self
    where
        F: Fn(&Params, &Engine) -> Option<Optimized> + 'static,
    {
        self.optimize = Some(Shared::new(optimize));
        self
    }

    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<String, crate::Error> {
        engine.resolve_typed(&params.get("text"), context, coerce::to_string)
    }
}

impl fmt::Debug for ParseStringDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseStringDirective")
            .field("optimize", &self.optimize.is_some())
            .finish()
    }
}

impl Directive for ParseStringDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let text = self.process_params(params, context, engine)?;
        (self.parse)(&text, context)
    }

    fn optimize_template(&self, params: &Params, engine: &Engine) -> Option<Optimized> {
        // The parser reads the context, so running it ahead of time is never safe.
        self.optimize
            .as_ref()
            .and_then(|optimize| optimize(params, engine))
            .or_else(|| Some(params.preserve()))
    }
}
