use smol_str::SmolStr;

use crate::{
    StencilResult, coerce,
    directive::{
        Directive, Params,
        methods,
        script::{INDEX_VAR, KEY_VAR, VALUE_VAR},
    },
    engine::Engine,
    error::Error,
    scope::Context,
    value::{Map, Value},
};

pub struct MapValuesParams {
    pub source: Value,
    pub get_key: Value,
    pub get_value: Value,
}

/// Copies `source` while rewriting its keys with `getKey` and its values with
/// `getValue`. Both templates see `$value` and either `$index` or `$key`.
///
/// Array keys must resolve to an index and object keys to a non-empty value,
/// otherwise the entry is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapValuesDirective;

impl MapValuesDirective {
    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<MapValuesParams, Error> {
        Ok(MapValuesParams {
            source: engine.resolve(&params.get("source"), context)?,
            get_key: params.get("getKey"),
            get_value: params.get("getValue"),
        })
    }

    fn map_value(&self, input: &MapValuesParams, item: Value, context: &Context, engine: &Engine) -> StencilResult {
        if input.get_value.is_nullish() {
            Ok(item)
        } else {
            engine.resolve(&input.get_value, context)
        }
    }
}

impl Directive for MapValuesDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = self.process_params(params, context, engine)?;
        let local = engine.create_local_context(context);

        match &input.source {
            Value::Array(items) => {
                let items = items.borrow().clone();
                let mut results: Vec<Value> = Vec::with_capacity(items.len());

                for (index, item) in items.into_iter().enumerate() {
                    engine.set_local_value(&local, INDEX_VAR, Value::from(index));
                    engine.set_local_value(&local, VALUE_VAR, item.clone());

                    let position = if input.get_key.is_nullish() {
                        Some(index)
                    } else {
                        let key = engine.resolve(&input.get_key, &local)?;
                        coerce::to_number(&key).to_index()
                    };
                    let Some(position) = position else {
                        continue;
                    };

                    let value = self.map_value(&input, item, &local, engine)?;
                    methods::set_element(&mut results, position, value)?;
                }

                Ok(Value::array(results))
            }
            Value::Object(map) => {
                let entries = map.borrow().clone();
                let mut results = Map::with_capacity_and_hasher(entries.len(), Default::default());

                for (key, item) in entries {
                    engine.set_local_value(&local, KEY_VAR, Value::from(key.clone()));
                    engine.set_local_value(&local, VALUE_VAR, item.clone());

                    let key = if input.get_key.is_nullish() {
                        key
                    } else {
                        match engine.resolve(&input.get_key, &local)? {
                            Value::None | Value::Null => continue,
                            Value::String(s) if s.is_empty() => continue,
                            other => SmolStr::new(coerce::to_string(&other)),
                        }
                    };

                    let value = self.map_value(&input, item, &local, engine)?;
                    results.insert(key, value);
                }

                Ok(Value::object(results))
            }
            _ => Ok(Value::None),
        }
    }
}
