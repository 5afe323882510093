use std::cell::Cell;
use std::fmt;

use smol_str::SmolStr;

use crate::{
    Shared, StencilResult,
    copy::deep_copy,
    directive::{Directive, Params, Registry},
    error::Error,
    optimizer::{Optimized, Optimizer},
    scope::{Context, ResolutionState},
    value::{Map, ObjectRef, Value},
};

#[derive(Debug, Clone)]
pub struct Options {
    /// Marker key that turns an object into a directive invocation.
    pub directive_key: SmolStr,
    /// Context key holding the local variables of the current scope.
    pub local_variables_key: SmolStr,
    /// Context key holding the current [`ResolutionState`].
    pub resolution_state_key: SmolStr,
    /// Maximum nesting of containers and directive calls during one resolution.
    pub max_depth: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            directive_key: SmolStr::new_static("$use"),
            local_variables_key: SmolStr::new_static("$vars"),
            resolution_state_key: SmolStr::new_static("$resolving"),
            #[cfg(debug_assertions)]
            max_depth: 160,
            #[cfg(not(debug_assertions))]
            max_depth: 640,
        }
    }
}

/// A recognized directive invocation: the marker id, its handler and the
/// invocation object itself as parameters.
#[derive(Clone)]
pub struct Invocation {
    pub id: SmolStr,
    pub directive: Shared<dyn Directive>,
    pub params: Params,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("id", &self.id)
            .field("params", &self.params)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    registry: Shared<Registry>,
    pub(crate) options: Options,
    depth: Shared<Cell<u32>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Registry::standard())
    }
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self::with_options(registry, Options::default())
    }

    pub fn with_options(registry: Registry, options: Options) -> Self {
        Self {
            registry: Shared::new(registry),
            options,
            depth: Shared::new(Cell::new(0)),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn set_max_depth(&mut self, max_depth: u32) {
        self.options.max_depth = max_depth;
    }

    pub fn set_directive_key(&mut self, key: impl Into<SmolStr>) {
        self.options.directive_key = key.into();
    }

    pub fn set_local_variables_key(&mut self, key: impl Into<SmolStr>) {
        self.options.local_variables_key = key.into();
    }

    pub fn set_resolution_state_key(&mut self, key: impl Into<SmolStr>) {
        self.options.resolution_state_key = key.into();
    }

    /// Marker id carried by `value`, whether or not it is registered.
    pub fn directive_id_for(&self, value: &Value) -> Option<SmolStr> {
        match value {
            Value::Object(map) => match map.borrow().get(self.options.directive_key.as_str()) {
                Some(Value::String(id)) => Some(SmolStr::new(id)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Recognizes `value` as a call to a registered directive.
    ///
    /// This is the only place where objects are probed for the marker key.
    pub fn invocation(&self, value: &Value) -> Option<Invocation> {
        let Value::Object(map) = value else {
            return None;
        };
        let id = self.directive_id_for(value)?;
        let directive = self.registry.get(&id)?;

        Some(Invocation {
            id,
            directive,
            params: Params::new(Shared::clone(map)),
        })
    }

    /// Resolves every directive invocation inside `value`.
    ///
    /// Primitives and functions are returned unchanged. Arrays and plain
    /// objects are copied with each entry resolved. An invocation is handed to
    /// its directive and the directive's result is returned as is.
    pub fn resolve(&self, value: &Value, context: &Context) -> StencilResult {
        if !value.is_container() {
            return Ok(value.clone());
        }

        self.enter_scope()?;
        let result = self.resolve_container(value, context);
        self.exit_scope();
        result
    }

    fn resolve_container(&self, value: &Value, context: &Context) -> StencilResult {
        if let Some(invocation) = self.invocation(value) {
            return self.execute_invocation(value, &invocation, context);
        }

        let parent = self.resolution_state(context);
        match value {
            Value::Array(items) => {
                let items = items.borrow().clone();
                let mut resolved = Vec::with_capacity(items.len());

                for (index, item) in items.iter().enumerate() {
                    let state = ResolutionState::for_property(parent.as_ref(), value.clone(), index.into());
                    resolved.push(self.resolve(item, &self.descend(context, state))?);
                }

                Ok(Value::array(resolved))
            }
            Value::Object(map) => {
                let entries = map.borrow().clone();
                let mut resolved = Map::with_capacity_and_hasher(entries.len(), Default::default());

                for (key, item) in entries.iter() {
                    let state =
                        ResolutionState::for_property(parent.as_ref(), value.clone(), key.clone().into());
                    resolved.insert(key.clone(), self.resolve(item, &self.descend(context, state))?);
                }

                Ok(Value::object(resolved))
            }
            _ => Ok(value.clone()),
        }
    }

    fn execute_invocation(
        &self,
        source: &Value,
        invocation: &Invocation,
        context: &Context,
    ) -> StencilResult {
        tracing::trace!(directive = %invocation.id, "executing directive");

        let parent = self.resolution_state(context);
        let state = ResolutionState::for_directive(parent.as_ref(), source.clone(), &invocation.id);
        invocation
            .directive
            .execute(&invocation.params, &self.descend(context, state), self)
    }

    fn descend(&self, context: &Context, state: ResolutionState) -> Context {
        context.with_entry(self.options.resolution_state_key.clone(), state.as_value())
    }

    /// Resolves `value` and converts the result.
    pub fn resolve_typed<T, F>(&self, value: &Value, context: &Context, convert: F) -> Result<T, Error>
    where
        F: FnOnce(&Value) -> T,
    {
        self.resolve(value, context).map(|resolved| convert(&resolved))
    }

    /// Evaluates one directive layer. Anything that is not an invocation,
    /// arrays included, is returned as is.
    pub fn execute_directive_for(&self, value: &Value, context: &Context) -> StencilResult {
        match self.invocation(value) {
            Some(invocation) => {
                self.enter_scope()?;
                let result = self.execute_invocation(value, &invocation, context);
                self.exit_scope();
                result
            }
            None => Ok(value.clone()),
        }
    }

    /// Evaluates one directive layer and treats the result as a list: arrays
    /// are used as is, absent values give an empty list and anything else is
    /// wrapped.
    pub fn get_array(&self, value: &Value, context: &Context) -> Result<Vec<Value>, Error> {
        match self.execute_directive_for(value, context)? {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::None => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    pub fn get_typed_array<T, F>(
        &self,
        value: &Value,
        context: &Context,
        convert: F,
    ) -> Result<Vec<T>, Error>
    where
        F: Fn(&Value) -> T,
    {
        self.get_array(value, context)?
            .iter()
            .map(|item| self.resolve_typed(item, context, &convert))
            .collect()
    }

    /// [`Engine::get_array`] with every item resolved.
    pub fn resolve_as_array(&self, value: &Value, context: &Context) -> Result<Vec<Value>, Error> {
        self.get_array(value, context)?
            .iter()
            .map(|item| self.resolve(item, context))
            .collect()
    }

    /// Evaluates one directive layer and treats the result as a lookup table.
    ///
    /// Objects are used as is, arrays are keyed by index, a string `s` becomes
    /// `{s: s}` and anything else becomes `{value: result}`.
    pub fn get_value_map(&self, value: &Value, context: &Context) -> Result<ObjectRef, Error> {
        let map = match self.execute_directive_for(value, context)? {
            Value::Object(map) => return Ok(map),
            Value::Array(items) => items
                .borrow()
                .iter()
                .enumerate()
                .map(|(index, item)| (SmolStr::new(index.to_string()), item.clone()))
                .collect::<Map>(),
            Value::String(s) => {
                let mut map = Map::default();
                map.insert(SmolStr::new(&s), Value::String(s));
                map
            }
            other => {
                let mut map = Map::default();
                map.insert(SmolStr::new_static("value"), other);
                map
            }
        };

        Ok(Shared::new(crate::SharedCell::new(map)))
    }

    /// Opens a new local-variable scope. See [`Context::create_local`].
    pub fn create_local_context(&self, context: &Context) -> Context {
        context.create_local(&self.options.local_variables_key)
    }

    pub fn get_local_value(&self, context: &Context, name: &str) -> Value {
        context.local_value(&self.options.local_variables_key, name)
    }

    /// Writes a local variable. Ignored when the context has no local scope.
    pub fn set_local_value(&self, context: &Context, name: &str, value: Value) {
        if !context.set_local_value(&self.options.local_variables_key, name, value) {
            tracing::debug!(name, "no local scope, variable write dropped");
        }
    }

    pub fn resolution_state(&self, context: &Context) -> Option<ResolutionState> {
        context.resolution_state(&self.options.resolution_state_key)
    }

    pub fn deep_copy(&self, value: &Value) -> Value {
        deep_copy(value)
    }

    /// Runs the optimization pass. See [`Optimizer`].
    pub fn optimize(&self, template: &Value) -> Result<Optimized, Error> {
        Optimizer::new(self).optimize(template)
    }

    #[inline(always)]
    fn enter_scope(&self) -> Result<(), Error> {
        let depth = self.depth.get();
        if depth >= self.options.max_depth {
            tracing::warn!(max_depth = self.options.max_depth, "recursion limit exceeded");
            return Err(Error::RecursionError(self.options.max_depth));
        }

        self.depth.set(depth + 1);
        Ok(())
    }

    #[inline(always)]
    fn exit_scope(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn engine() -> Engine {
        Engine::default()
    }

    fn template(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn test_default_options() {
        let engine = Engine::default();
        assert_eq!(engine.options().directive_key, "$use");
        assert_eq!(engine.options().local_variables_key, "$vars");
        assert_eq!(engine.options().resolution_state_key, "$resolving");
        assert!(engine.options().max_depth > 0);
    }

    #[rstest]
    fn test_set_keys(mut engine: Engine) {
        engine.set_directive_key("@do");
        engine.set_local_variables_key("@locals");
        engine.set_resolution_state_key("@state");
        engine.set_max_depth(8);

        assert_eq!(engine.options().directive_key, "@do");
        assert_eq!(engine.options().local_variables_key, "@locals");
        assert_eq!(engine.options().resolution_state_key, "@state");
        assert_eq!(engine.options().max_depth, 8);
    }

    #[rstest]
    #[case::string(json!("text"))]
    #[case::number(json!(1.5))]
    #[case::null(json!(null))]
    #[case::boolean(json!(false))]
    fn test_resolve_primitives_unchanged(engine: Engine, #[case] value: serde_json::Value) {
        let value = template(value);
        assert_eq!(engine.resolve(&value, &Context::new()).unwrap(), value);
    }

    #[rstest]
    fn test_resolve_copies_plain_structures(engine: Engine) {
        let value = template(json!({"a": [1, {"b": 2}], "c": null}));
        let resolved = engine.resolve(&value, &Context::new()).unwrap();

        assert_eq!(resolved, value);
        assert!(!resolved.ptr_eq(&value));
        assert!(!resolved.get("a").ptr_eq(&value.get("a")));
    }

    #[rstest]
    fn test_resolve_keeps_absent_array_items(engine: Engine) {
        let value = template(json!([{"$use": "get", "path": ["missing"]}, 1]));
        let resolved = engine.resolve(&value, &Context::new()).unwrap();

        assert_eq!(resolved, Value::array(vec![Value::None, Value::from(1)]));
    }

    #[rstest]
    #[case::unregistered(json!({"$use": "nope", "a": 1}))]
    #[case::non_string_marker(json!({"$use": 5, "a": 1}))]
    fn test_unknown_marker_is_plain_data(engine: Engine, #[case] value: serde_json::Value) {
        let value = template(value);
        assert_eq!(engine.resolve(&value, &Context::new()).unwrap(), value);
    }

    #[rstest]
    fn test_directive_result_is_not_resolved_again(engine: Engine) {
        let value = template(json!({"$use": "value", "value": {"$use": "+", "args": [1, 2]}}));
        let resolved = engine.resolve(&value, &Context::new()).unwrap();

        assert_eq!(resolved, template(json!({"$use": "+", "args": [1, 2]})));
    }

    #[rstest]
    fn test_custom_directive_key(mut engine: Engine) {
        engine.set_directive_key("@do");
        let value = template(json!({"@do": "+", "args": [1, 2], "$use": "ignored"}));

        assert_eq!(engine.resolve(&value, &Context::new()).unwrap(), Value::from(3));
    }

    #[rstest]
    fn test_directive_id_for_unregistered(engine: Engine) {
        let value = template(json!({"$use": "custom"}));
        assert_eq!(engine.directive_id_for(&value).as_deref(), Some("custom"));
        assert!(engine.invocation(&value).is_none());
    }

    #[rstest]
    fn test_execute_directive_for_stops_after_one_layer(engine: Engine) {
        let value = template(json!({"$use": "value", "value": [{"$use": "+", "args": [1, 2]}]}));
        let result = engine.execute_directive_for(&value, &Context::new()).unwrap();
        assert_eq!(result, template(json!([{"$use": "+", "args": [1, 2]}])));

        let plain = template(json!([{"$use": "+", "args": [1, 2]}]));
        assert!(engine.execute_directive_for(&plain, &Context::new()).unwrap().ptr_eq(&plain));
    }

    #[rstest]
    #[case::array(json!([1, 2]), vec![Value::from(1), Value::from(2)])]
    #[case::single(json!("a"), vec![Value::from("a")])]
    #[case::absent(json!({"$use": "get", "path": ["missing"]}), vec![])]
    #[case::null(json!(null), vec![Value::Null])]
    fn test_get_array(engine: Engine, #[case] value: serde_json::Value, #[case] expected: Vec<Value>) {
        assert_eq!(engine.get_array(&template(value), &Context::new()).unwrap(), expected);
    }

    #[rstest]
    fn test_resolve_as_array(engine: Engine) {
        let value = template(json!([{"$use": "+", "args": [1, 2]}, "x"]));
        assert_eq!(
            engine.resolve_as_array(&value, &Context::new()).unwrap(),
            vec![Value::from(3), Value::from("x")]
        );
    }

    #[rstest]
    fn test_get_typed_array(engine: Engine) {
        let value = template(json!(["1", 2, {"$use": "+", "args": ["1", "0"]}]));
        let numbers = engine
            .get_typed_array(&value, &Context::new(), crate::coerce::to_number)
            .unwrap()
            .into_iter()
            .map(|n| n.value())
            .collect::<Vec<_>>();
        assert_eq!(numbers, vec![1.0, 2.0, 10.0]);
    }

    #[rstest]
    #[case::object(json!({"a": 1}), json!({"a": 1}))]
    #[case::array(json!(["x", "y"]), json!({"0": "x", "1": "y"}))]
    #[case::string(json!("key"), json!({"key": "key"}))]
    #[case::number(json!(3), json!({"value": 3}))]
    fn test_get_value_map(engine: Engine, #[case] value: serde_json::Value, #[case] expected: serde_json::Value) {
        let map = engine.get_value_map(&template(value), &Context::new()).unwrap();
        assert_eq!(Value::Object(map), template(expected));
    }

    #[rstest]
    fn test_resolution_state_stack(engine: Engine) {
        let value = template(json!({
            "name": "Bob",
            "item": {
                "ownerName": {"$use": "get", "path": ["$resolving", "parent", "parent", "source", "name"]}
            }
        }));

        let resolved = engine.resolve(&value, &Context::new()).unwrap();
        assert_eq!(resolved, template(json!({"name": "Bob", "item": {"ownerName": "Bob"}})));
    }

    #[rstest]
    fn test_resolution_state_records_index(engine: Engine) {
        let value = template(json!([
            "a",
            {"$use": "get", "path": ["$resolving", "parent", "key"]}
        ]));

        let resolved = engine.resolve(&value, &Context::new()).unwrap();
        assert_eq!(resolved, template(json!(["a", 1])));
    }

    #[rstest]
    fn test_recursion_limit(mut engine: Engine) {
        engine.set_max_depth(4);
        let value = template(json!([[[[["deep"]]]]]));

        assert_eq!(
            engine.resolve(&value, &Context::new()),
            Err(Error::RecursionError(4))
        );

        let shallow = template(json!([["ok"]]));
        assert_eq!(engine.resolve(&shallow, &Context::new()).unwrap(), shallow);
    }

    #[rstest]
    fn test_recursion_limit_on_self_resolving_template(engine: Engine) {
        let value = template(json!({"$use": "resolve", "value": {"$use": "get", "path": ["loop"]}}));
        let context = Context::new();
        context.insert("loop", value.clone());

        assert!(matches!(
            engine.resolve(&value, &context),
            Err(Error::RecursionError(_))
        ));
    }

    #[rstest]
    fn test_host_errors_propagate(engine: Engine) {
        let context = Context::new();
        context.insert("fail", Value::function(|_| Err(Error::user_defined("host failure"))));
        let value = template(json!({"$use": "call", "target": {"$use": "get", "path": ["fail"]}}));

        assert_eq!(
            engine.resolve(&value, &context),
            Err(Error::user_defined("host failure"))
        );
    }

    #[rstest]
    fn test_local_values_without_scope(engine: Engine) {
        let context = Context::new();
        engine.set_local_value(&context, "x", Value::from(1));
        assert_eq!(engine.get_local_value(&context, "x"), Value::None);

        let local = engine.create_local_context(&context);
        engine.set_local_value(&local, "x", Value::from(1));
        assert_eq!(engine.get_local_value(&local, "x"), Value::from(1));
    }

    #[test]
    fn test_version() {
        assert!(!Engine::version().is_empty());
    }
}
