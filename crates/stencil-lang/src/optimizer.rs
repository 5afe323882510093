use std::cell::Cell;

use rustc_hash::FxHashSet;

use crate::{
    Shared,
    copy::deep_copy,
    directive::Params,
    engine::Engine,
    error::Error,
    scope::Context,
    value::{Map, Value},
};

/// Outcome of optimizing a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimized {
    pub value: Value,
    /// `true` when `value` is the final result for every context.
    pub executable: bool,
}

impl Optimized {
    pub fn executable(value: Value) -> Self {
        Self {
            value,
            executable: true,
        }
    }

    /// A template that still needs a context to resolve.
    pub fn deferred(value: Value) -> Self {
        Self {
            value,
            executable: false,
        }
    }
}

/// Context-free partial evaluation of templates.
///
/// Every subtree that does not depend on the context is resolved ahead of
/// time. Resolving the optimized template later gives the same result as
/// resolving the original one.
#[derive(Debug)]
pub struct Optimizer<'a> {
    engine: &'a Engine,
    depth: Cell<u32>,
}

impl<'a> Optimizer<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            depth: Cell::new(0),
        }
    }

    pub fn optimize(&self, template: &Value) -> Result<Optimized, Error> {
        match template {
            Value::Array(_) | Value::Object(_) => {
                let depth = self.depth.get();
                if depth >= self.engine.options.max_depth {
                    return Err(Error::RecursionError(self.engine.options.max_depth));
                }

                self.depth.set(depth + 1);
                let result = match template {
                    Value::Array(items) => self.optimize_array(&items.borrow().clone()),
                    _ => self.optimize_object(template),
                };
                self.depth.set(depth);
                result
            }
            _ => Ok(Optimized::executable(template.clone())),
        }
    }

    fn optimize_array(&self, items: &[Value]) -> Result<Optimized, Error> {
        let mut executable = true;
        let mut folded = Vec::with_capacity(items.len());

        for item in items {
            let optimized = self.optimize(item)?;
            executable &= optimized.executable;
            folded.push(optimized.value);
        }

        Ok(Optimized {
            value: Value::array(folded),
            executable,
        })
    }

    fn optimize_object(&self, template: &Value) -> Result<Optimized, Error> {
        let invocation = self.engine.invocation(template);

        if let Some(invocation) = &invocation {
            if let Some(optimized) = invocation
                .directive
                .optimize_template(&invocation.params, self.engine)
            {
                return Ok(optimized);
            }
        }

        let entries = match template {
            Value::Object(map) => map.borrow().clone(),
            _ => return Ok(Optimized::executable(template.clone())),
        };

        let mut executable = true;
        let mut folded = Map::with_capacity_and_hasher(entries.len(), Default::default());
        for (key, value) in entries.iter() {
            let optimized = self.optimize(value)?;
            executable &= optimized.executable;
            folded.insert(key.clone(), optimized.value);
        }
        let folded = Value::object(folded);

        match invocation {
            Some(invocation) if executable => {
                let Value::Object(params) = &folded else {
                    return Ok(Optimized::deferred(folded));
                };
                let result = invocation.directive.execute(
                    &Params::new(Shared::clone(params)),
                    &Context::new(),
                    self.engine,
                )?;

                if self.is_inert(&result) {
                    tracing::debug!(directive = %invocation.id, "folded directive");
                    Ok(Optimized::executable(result))
                } else {
                    // Folding would turn returned data into code on the next resolution.
                    tracing::debug!(directive = %invocation.id, "fold result holds invocations, kept");
                    Ok(Optimized::deferred(folded))
                }
            }
            Some(_) => Ok(Optimized::deferred(folded)),
            // A marker folded into a registered id would run as code on the next resolution.
            None if self.engine.invocation(&folded).is_some() => {
                tracing::debug!("folded marker names a directive, kept");
                Ok(Optimized::deferred(deep_copy(template)))
            }
            None => Ok(Optimized {
                value: folded,
                executable,
            }),
        }
    }

    /// `true` when resolving `value` again would return an equal value.
    fn is_inert(&self, value: &Value) -> bool {
        let mut seen = FxHashSet::default();
        self.is_inert_inner(value, &mut seen)
    }

    fn is_inert_inner(&self, value: &Value, seen: &mut FxHashSet<*const ()>) -> bool {
        match value {
            Value::Array(items) => {
                if !seen.insert(Shared::as_ptr(items) as *const ()) {
                    return true;
                }
                let items = items.borrow().clone();
                items.iter().all(|item| self.is_inert_inner(item, seen))
            }
            Value::Object(map) => {
                if !seen.insert(Shared::as_ptr(map) as *const ()) {
                    return true;
                }
                if self.engine.invocation(value).is_some() {
                    return false;
                }
                let entries = map.borrow().clone();
                entries.values().all(|item| self.is_inert_inner(item, seen))
            }
            _ => true,
        }
    }
}
