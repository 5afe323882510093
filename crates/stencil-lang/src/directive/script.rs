//! Step sequences and the exit protocol shared by `run`, loops and `switch`.
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    StencilResult, coerce,
    directive::{
        Directive, Params,
        lookup::{self, PathStep},
        methods,
    },
    engine::Engine,
    error::Error,
    optimizer::Optimized,
    scope::Context,
    value::Value,
};

/// How far an exit reaches out of a loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitPriority {
    #[default]
    None,
    /// Ends the current pass.
    BreakPass,
    /// Ends the whole loop.
    ExitLoop,
    /// Ends the loop and replaces its result with the carried value.
    ReturnValue,
}

/// Outcome of a step sequence. Completed sequences carry no directive id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitRecord {
    pub directive_id: Option<SmolStr>,
    pub value: Value,
}

impl ExitRecord {
    pub fn is_exit(&self) -> bool {
        self.directive_id.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopExit {
    pub directive_id: Option<SmolStr>,
    pub value: Value,
    pub priority: ExitPriority,
}

/// Resolves steps in order until one invokes an exit directive.
#[derive(Debug, Clone, Default)]
pub struct StepRunner {
    exit_ids: SmallVec<[SmolStr; 4]>,
}

impl StepRunner {
    pub fn new<I, S>(exit_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            exit_ids: exit_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_exit_id(&self, id: &str) -> bool {
        self.exit_ids.iter().any(|exit| exit == id)
    }

    /// The exit step is resolved like any other step; its result becomes the
    /// carried value.
    pub fn run_steps(
        &self,
        steps: &[Value],
        context: &Context,
        engine: &Engine,
    ) -> Result<ExitRecord, Error> {
        for step in steps {
            let directive_id = engine.directive_id_for(step);
            let value = engine.resolve(step, context)?;

            if let Some(id) = directive_id
                && self.is_exit_id(&id)
            {
                return Ok(ExitRecord {
                    directive_id: Some(id),
                    value,
                });
            }
        }

        Ok(ExitRecord::default())
    }
}

/// [`StepRunner`] whose exits are ranked by an [`ExitPriority`] table.
#[derive(Debug, Clone)]
pub struct LoopRunner {
    steps: StepRunner,
    priorities: FxHashMap<SmolStr, ExitPriority>,
}

impl Default for LoopRunner {
    fn default() -> Self {
        Self::new([
            ("continue", ExitPriority::BreakPass),
            ("break", ExitPriority::ExitLoop),
            ("return", ExitPriority::ReturnValue),
        ])
    }
}

impl LoopRunner {
    pub fn new<I, S>(priorities: I) -> Self
    where
        I: IntoIterator<Item = (S, ExitPriority)>,
        S: Into<SmolStr>,
    {
        let priorities = priorities
            .into_iter()
            .map(|(id, priority)| (id.into(), priority))
            .collect::<FxHashMap<_, _>>();
        let steps = StepRunner::new(
            priorities
                .iter()
                .filter(|(_, priority)| **priority >= ExitPriority::BreakPass)
                .map(|(id, _)| id.clone()),
        );

        Self { steps, priorities }
    }

    pub fn priority_of(&self, id: &str) -> ExitPriority {
        self.priorities.get(id).copied().unwrap_or_default()
    }

    pub fn run_pass(
        &self,
        steps: &[Value],
        context: &Context,
        engine: &Engine,
    ) -> Result<LoopExit, Error> {
        let record = self.steps.run_steps(steps, context, engine)?;
        let priority = record
            .directive_id
            .as_deref()
            .map_or(ExitPriority::None, |id| self.priority_of(id));

        Ok(LoopExit {
            directive_id: record.directive_id,
            value: record.value,
            priority,
        })
    }

    /// Result of a finished loop: the value carried by a returning exit, or
    /// `fallback` resolved in the loop scope.
    pub fn finish(
        &self,
        last: Option<LoopExit>,
        fallback: &Value,
        context: &Context,
        engine: &Engine,
    ) -> StencilResult {
        match last {
            Some(exit) if exit.priority >= ExitPriority::ReturnValue => Ok(exit.value),
            _ => engine.resolve(fallback, context),
        }
    }
}

pub struct MultiStepParams {
    pub steps: Vec<Value>,
}

/// Runs `steps` in a new local scope. The value of the first exit step
/// (`return` by default) is the result.
#[derive(Debug, Clone)]
pub struct MultiStepDirective {
    runner: StepRunner,
}

impl Default for MultiStepDirective {
    fn default() -> Self {
        Self::new(["return"])
    }
}

impl MultiStepDirective {
    pub fn new<I, S>(exit_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            runner: StepRunner::new(exit_ids),
        }
    }

    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<MultiStepParams, Error> {
        Ok(MultiStepParams {
            steps: engine.get_array(&params.get("steps"), context)?,
        })
    }
}

impl Directive for MultiStepDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = self.process_params(params, context, engine)?;
        let local = engine.create_local_context(context);
        Ok(self.runner.run_steps(&input.steps, &local, engine)?.value)
    }
}

/// Marker step such as `break` or `continue`. Yields a copy of its fixed value.
#[derive(Debug, Clone, Default)]
pub struct SignalDirective {
    value: Value,
}

impl SignalDirective {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Directive for SignalDirective {
    fn execute(&self, _params: &Params, _context: &Context, engine: &Engine) -> StencilResult {
        Ok(engine.deep_copy(&self.value))
    }

    // Step runners recognize exits by their directive id, so signals stay in place.
    fn optimize_template(&self, params: &Params, _engine: &Engine) -> Option<Optimized> {
        Some(params.preserve())
    }
}

/// Resolves `value`. Used as the exit step of sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnValueDirective;

impl Directive for ReturnValueDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        engine.resolve(&params.get("value"), context)
    }

    fn optimize_template(&self, params: &Params, _engine: &Engine) -> Option<Optimized> {
        Some(params.preserve())
    }
}

pub struct SetLocalValueParams {
    pub path: Vec<Value>,
    pub value: Value,
}

/// Writes `value` at `path` inside the local variables.
///
/// All steps but the last are looked up like `get` does. When the last step
/// is a method call it is invoked on the live target, so
/// `["list", {"name": "push", "args": [1]}]` appends to the variable `list`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetLocalValueDirective;

impl SetLocalValueDirective {
    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<SetLocalValueParams, Error> {
        Ok(SetLocalValueParams {
            path: engine.get_array(&params.get("path"), context)?,
            value: params.get("value"),
        })
    }

    fn set_property(target: &Value, step: &PathStep, value: Value) -> Result<(), Error> {
        match (target, step) {
            (Value::Array(items), PathStep::Call { name, args }) => {
                methods::call_array_method(items, name, args)?;
            }
            (Value::Array(items), PathStep::Index(index)) => {
                if let Some(index) = index.to_index() {
                    methods::set_element(&mut items.borrow_mut(), index, value)?;
                }
            }
            (Value::Array(items), PathStep::Key(key)) => {
                if let Some(index) = lookup::array_index(key) {
                    methods::set_element(&mut items.borrow_mut(), index, value)?;
                }
            }
            (Value::Object(map), PathStep::Call { name, args }) => {
                lookup::call_property(map, name, args)?;
            }
            (Value::Object(map), PathStep::Key(key)) => {
                map.borrow_mut().insert(SmolStr::new(key), value);
            }
            (Value::Object(map), PathStep::Index(index)) => {
                map.borrow_mut().insert(SmolStr::new(index.to_string()), value);
            }
            _ => {}
        }

        Ok(())
    }
}

impl Directive for SetLocalValueDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = self.process_params(params, context, engine)?;
        let Some((last, parents)) = input.path.split_last() else {
            return Ok(Value::None);
        };

        let mut parent_path: SmallVec<[Value; 8]> = SmallVec::with_capacity(input.path.len());
        parent_path.push(Value::from(engine.options().local_variables_key.clone()));
        parent_path.extend(parents.iter().cloned());

        let target = lookup::resolve_path(&context.as_value(), &parent_path, context, engine)?;
        if !target.is_container() {
            return Ok(Value::None);
        }

        let step = engine.resolve(last, context)?;
        if let Some(step) = PathStep::from_value(&step) {
            let value = engine.resolve(&input.value, context)?;
            Self::set_property(&target, &step, value)?;
        }

        Ok(Value::None)
    }

    // Folding would drop the write.
    fn optimize_template(&self, params: &Params, _engine: &Engine) -> Option<Optimized> {
        Some(params.preserve())
    }
}

/// Local variable names bound by the loop directives.
pub const INDEX_VAR: &str = "$index";
pub const KEY_VAR: &str = "$key";
pub const VALUE_VAR: &str = "$value";

pub struct IterationParams {
    pub collection: Value,
    pub steps: Vec<Value>,
    pub fallback: Value,
}

/// Runs `steps` once per element of `for`, binding `$index`/`$value` for
/// arrays and `$key`/`$value` for objects. Anything else yields
/// [`Value::None`] without running a pass.
#[derive(Debug, Clone, Default)]
pub struct IterationDirective {
    runner: LoopRunner,
}

impl IterationDirective {
    pub fn new(runner: LoopRunner) -> Self {
        Self { runner }
    }

    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<IterationParams, Error> {
        Ok(IterationParams {
            steps: engine.get_array(&params.get("steps"), context)?,
            collection: engine.execute_directive_for(&params.get("for"), context)?,
            fallback: params.get("return"),
        })
    }
}

impl Directive for IterationDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = self.process_params(params, context, engine)?;
        if !input.collection.is_container() {
            return Ok(Value::None);
        }

        let local = engine.create_local_context(context);
        let mut last = None;

        match &input.collection {
            Value::Array(items) => {
                let mut index = 0;
                // The body may grow or shrink the array, so the length is read every pass.
                loop {
                    let item = items.borrow().get(index).cloned();
                    let Some(item) = item else {
                        break;
                    };
                    engine.set_local_value(&local, INDEX_VAR, Value::from(index));
                    engine.set_local_value(&local, VALUE_VAR, item);

                    let exit = self.runner.run_pass(&input.steps, &local, engine)?;
                    let stop = exit.priority >= ExitPriority::ExitLoop;
                    last = Some(exit);
                    if stop {
                        break;
                    }
                    index += 1;
                }
            }
            Value::Object(map) => {
                let keys = map.borrow().keys().cloned().collect::<Vec<_>>();
                for key in keys {
                    let item = map.borrow().get(&key).cloned();
                    let Some(item) = item else {
                        continue;
                    };
                    engine.set_local_value(&local, KEY_VAR, Value::from(key));
                    engine.set_local_value(&local, VALUE_VAR, item);

                    let exit = self.runner.run_pass(&input.steps, &local, engine)?;
                    let stop = exit.priority >= ExitPriority::ExitLoop;
                    last = Some(exit);
                    if stop {
                        break;
                    }
                }
            }
            _ => {}
        }

        self.runner.finish(last, &input.fallback, &local, engine)
    }
}

pub struct RepetitionParams {
    pub from: f64,
    pub to: f64,
    pub rate: f64,
    pub steps: Vec<Value>,
    pub fallback: Value,
}

/// Runs `steps` for every index from `from` to `to`, both inclusive, binding
/// `$index`. The direction follows the bounds and only the magnitude of
/// `rate` is used, with zero treated as one.
#[derive(Debug, Clone, Default)]
pub struct RepetitionDirective {
    runner: LoopRunner,
}

impl RepetitionDirective {
    pub fn new(runner: LoopRunner) -> Self {
        Self { runner }
    }

    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<RepetitionParams, Error> {
        Ok(RepetitionParams {
            steps: engine.get_array(&params.get("steps"), context)?,
            from: Self::resolve_number(&params.get("from"), context, engine, 1.0)?,
            to: Self::resolve_number(&params.get("to"), context, engine, 1.0)?,
            rate: Self::resolve_number(&params.get("rate"), context, engine, 1.0)?,
            fallback: params.get("return"),
        })
    }

    /// Numbers are used as is. Anything else is coerced, with `default`
    /// replacing values that are not numeric.
    fn resolve_number(value: &Value, context: &Context, engine: &Engine, default: f64) -> Result<f64, Error> {
        match engine.resolve(value, context)? {
            Value::Number(n) => Ok(n.value()),
            other => {
                let n = coerce::to_number(&other);
                Ok(if n.is_nan() { default } else { n.value() })
            }
        }
    }

    /// Calls `callback` for each index until it returns `false`.
    pub fn for_range<F>(start: f64, end: f64, rate: f64, mut callback: F) -> Result<(), Error>
    where
        F: FnMut(f64) -> Result<bool, Error>,
    {
        let rate = rate.abs();
        let rate = if rate > 0.0 { rate } else { 1.0 };

        let mut index = start;
        if start <= end {
            while index <= end {
                if !callback(index)? {
                    break;
                }
                index += rate;
            }
        } else {
            while index >= end {
                if !callback(index)? {
                    break;
                }
                index -= rate;
            }
        }

        Ok(())
    }
}

impl Directive for RepetitionDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = self.process_params(params, context, engine)?;
        let local = engine.create_local_context(context);
        let mut last = None;

        Self::for_range(input.from, input.to, input.rate, |index| {
            engine.set_local_value(&local, INDEX_VAR, Value::from(index));
            let exit = self.runner.run_pass(&input.steps, &local, engine)?;
            let proceed = exit.priority < ExitPriority::ExitLoop;
            last = Some(exit);
            Ok(proceed)
        })?;

        self.runner.finish(last, &input.fallback, &local, engine)
    }
}

pub struct SwitchFork {
    pub value: Value,
    pub cases: Vec<Value>,
}

pub struct CaseBlock {
    pub case: Option<Value>,
    pub steps: Vec<Value>,
}

/// Runs the case blocks from the first one whose `case` strictly equals
/// `value`, falling through every later block until an exit step (`break` or
/// `return` by default). Without a match, the first block lacking a `case`
/// runs on its own.
#[derive(Debug, Clone)]
pub struct SwitchDirective {
    runner: StepRunner,
}

impl Default for SwitchDirective {
    fn default() -> Self {
        Self::new(["break", "return"])
    }
}

impl SwitchDirective {
    pub fn new<I, S>(exit_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            runner: StepRunner::new(exit_ids),
        }
    }

    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<SwitchFork, Error> {
        Ok(SwitchFork {
            value: engine.resolve(&params.get("value"), context)?,
            cases: engine.get_array(&params.get("cases"), context)?,
        })
    }

    /// An array is a block of steps, an object has `steps` and an optional
    /// `case`, and any other value is a single step.
    pub fn case_block(
        &self,
        source: &Value,
        context: &Context,
        engine: &Engine,
    ) -> Result<CaseBlock, Error> {
        match source {
            Value::Array(items) => Ok(CaseBlock {
                case: None,
                steps: items.borrow().clone(),
            }),
            Value::Object(map) => {
                let steps = engine.get_array(&source.get("steps"), context)?;
                let case = map.borrow().get("case").cloned();
                let case = match case {
                    Some(case) => Some(engine.resolve(&case, context)?),
                    None => None,
                };
                Ok(CaseBlock { case, steps })
            }
            Value::None => Ok(CaseBlock {
                case: None,
                steps: Vec::new(),
            }),
            other => Ok(CaseBlock {
                case: None,
                steps: vec![other.clone()],
            }),
        }
    }
}

impl Directive for SwitchDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = self.process_params(params, context, engine)?;
        let local = engine.create_local_context(context);
        let mut matched = false;
        let mut default_block = None;

        for item in input.cases.iter() {
            let block = self.case_block(item, &local, engine)?;

            if !matched {
                if block.case.is_none() {
                    default_block.get_or_insert(block);
                    continue;
                }
                matched = block
                    .case
                    .as_ref()
                    .is_some_and(|case| coerce::strict_eq(case, &input.value));
            }

            if matched {
                let exit = self.runner.run_steps(&block.steps, &local, engine)?;
                if exit.is_exit() {
                    return Ok(exit.value);
                }
            }
        }

        match default_block {
            Some(block) if !matched => Ok(self.runner.run_steps(&block.steps, &local, engine)?.value),
            _ => Ok(Value::None),
        }
    }
}
