//! Directive protocol, registry and the standard directive catalog.
use std::fmt;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    Shared, StencilResult,
    copy::deep_copy,
    engine::Engine,
    optimizer::Optimized,
    scope::Context,
    value::{ObjectRef, Value},
};

pub mod comparison;
pub mod conditional;
pub mod context;
pub mod function;
pub mod lookup;
pub mod methods;
pub mod operator;
pub mod presentation;
pub mod script;
pub mod strings;
pub mod transform;
pub mod typing;

pub use comparison::{SerialComparisonDirective, ValueInRangeDirective};
pub use conditional::IfThenDirective;
pub use context::ContextDirective;
pub use function::FunctionCallDirective;
pub use lookup::{GetLocalVariableDirective, GetNestedValueDirective, PathStep};
pub use operator::{FoldDirective, NegationDirective};
pub use presentation::DataViewDirective;
pub use script::{
    ExitPriority, ExitRecord, IterationDirective, LoopExit, LoopRunner, MultiStepDirective,
    RepetitionDirective, ReturnValueDirective, SetLocalValueDirective, SignalDirective,
    StepRunner, SwitchDirective,
};
pub use strings::ParseStringDirective;
pub use transform::MapValuesDirective;
pub use typing::{
    CallbackDirective, LiteralValueDirective, ResolveValueDirective, TypeConversionDirective,
};

/// Handler for one directive id.
///
/// `execute` receives the whole invocation object as `params`, including the
/// marker key. Directives conventionally turn `params` into a typed struct in
/// an inherent `process_params` method before doing any work.
pub trait Directive {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult;

    /// Custom folding for the optimization pass. `None` uses the default fold.
    fn optimize_template(&self, _params: &Params, _engine: &Engine) -> Option<Optimized> {
        None
    }
}

/// Parameters of an invocation: a view over the invocation object.
#[derive(Debug, Clone)]
pub struct Params(ObjectRef);

impl Params {
    pub fn new(object: ObjectRef) -> Self {
        Self(object)
    }

    /// Parameter value, or [`Value::None`] when missing.
    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(Shared::clone(&self.0))
    }

    /// Keeps the invocation unfolded, copied so the result never aliases the template.
    pub fn preserve(&self) -> Optimized {
        Optimized::deferred(deep_copy(&self.as_value()))
    }
}

#[derive(Clone, Default)]
pub struct Registry {
    directives: FxHashMap<SmolStr, Shared<dyn Directive>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every standard directive under its conventional id.
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry
            .register("==", SerialComparisonDirective::equal())
            .register("===", SerialComparisonDirective::strict_equal())
            .register("!=", SerialComparisonDirective::not_equal())
            .register("!==", SerialComparisonDirective::strict_not_equal())
            .register("<", SerialComparisonDirective::less_than())
            .register("<=", SerialComparisonDirective::less_or_equal())
            .register(">", SerialComparisonDirective::greater_than())
            .register(">=", SerialComparisonDirective::greater_or_equal())
            .register("between", ValueInRangeDirective)
            .register("if", IfThenDirective)
            .register("call", FunctionCallDirective)
            .register("get", GetNestedValueDirective)
            .register("getVar", GetLocalVariableDirective)
            .register("+", FoldDirective::addition())
            .register("-", FoldDirective::subtraction())
            .register("*", FoldDirective::multiplication())
            .register("**", FoldDirective::exponentiation())
            .register("/", FoldDirective::division())
            .register("%", FoldDirective::remainder())
            .register("and", FoldDirective::and())
            .register("or", FoldDirective::or())
            .register("coalesce", FoldDirective::coalesce())
            .register("not", NegationDirective)
            .register("break", SignalDirective::default())
            .register("continue", SignalDirective::default())
            .register("return", ReturnValueDirective)
            .register("run", MultiStepDirective::default())
            .register("set", SetLocalValueDirective)
            .register("forEach", IterationDirective::default())
            .register("repeat", RepetitionDirective::default())
            .register("switch", SwitchDirective::default())
            .register("callback", CallbackDirective)
            .register("cast", TypeConversionDirective::default())
            .register("value", LiteralValueDirective)
            .register("resolve", ResolveValueDirective)
            .register("context", ContextDirective);

        registry
    }

    pub fn register<D>(&mut self, id: impl Into<SmolStr>, directive: D) -> &mut Self
    where
        D: Directive + 'static,
    {
        self.directives.insert(id.into(), Shared::new(directive));
        self
    }

    /// Builder form of [`Registry::register`].
    pub fn with<D>(mut self, id: impl Into<SmolStr>, directive: D) -> Self
    where
        D: Directive + 'static,
    {
        self.register(id, directive);
        self
    }

    pub fn remove(&mut self, id: &str) -> Option<Shared<dyn Directive>> {
        self.directives.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Shared<dyn Directive>> {
        self.directives.get(id).map(Shared::clone)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.directives.contains_key(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids = self.directives.keys().map(SmolStr::as_str).collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ids()).finish()
    }
}
