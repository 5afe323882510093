use crate::{
    StencilResult, coerce,
    directive::{Directive, Params},
    engine::Engine,
    error::Error,
    scope::Context,
    value::{Map, Value},
};

pub struct DataViewParams {
    pub data: Map,
    pub template: Value,
    pub template_key: Option<String>,
}

/// Resolves `template` (alias `via`) against the variables in `data`.
///
/// The template is resolved once in the calling scope, which unwraps literal
/// templates and fetches templates stored in the context, and once more in a
/// new scope seeded from `data`. When `templateKey` is given the template is
/// also bound under that name, so it can refer to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataViewDirective;

impl DataViewDirective {
    pub fn process_params(
        &self,
        params: &Params,
        context: &Context,
        engine: &Engine,
    ) -> Result<DataViewParams, Error> {
        let data = match engine.resolve(&params.get("data"), context)? {
            Value::Object(map) => map.borrow().clone(),
            _ => Map::default(),
        };
        let template = match params.get("template") {
            Value::None => params.get("via"),
            template => template,
        };

        Ok(DataViewParams {
            data,
            template: engine.resolve(&template, context)?,
            template_key: engine.resolve_typed(&params.get("templateKey"), context, |key| {
                (!key.is_nullish()).then(|| coerce::to_string(key))
            })?,
        })
    }
}

impl Directive for DataViewDirective {
    fn execute(&self, params: &Params, context: &Context, engine: &Engine) -> StencilResult {
        let input = self.process_params(params, context, engine)?;
        let local = engine.create_local_context(context);

        for (name, value) in input.data {
            engine.set_local_value(&local, &name, value);
        }
        if let Some(key) = &input.template_key {
            engine.set_local_value(&local, key, input.template.clone());
        }

        engine.resolve(&input.template, &local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Registry;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn engine() -> Engine {
        Engine::new(Registry::standard().with("present", DataViewDirective))
    }

    fn wrap_text() -> serde_json::Value {
        json!({"$use": "+", "args": ["[", {"$use": "getVar", "path": ["text"]}, "]"]})
    }

    #[rstest]
    fn test_embedded_template(engine: Engine) {
        let template = Value::from(json!({
            "$use": "present",
            "data": {"text": "wrapped"},
            "template": {"$use": "value", "value": wrap_text()}
        }));

        assert_eq!(engine.resolve(&template, &Context::new()).unwrap(), Value::from("[wrapped]"));
    }

    #[rstest]
    fn test_template_from_context(engine: Engine) {
        let template = Value::from(json!({
            "$use": "present",
            "data": {"text": "wrapped"},
            "via": {"$use": "get", "path": ["wrapText"]}
        }));
        let context = Context::from(json!({"wrapText": wrap_text()}));

        assert_eq!(engine.resolve(&template, &context).unwrap(), Value::from("[wrapped]"));
    }

    #[rstest]
    fn test_reuses_sibling_template(engine: Engine) {
        let source = Value::from(json!([
            {
                "$use": "present",
                "data": {"text": "wrapped"},
                "template": {"$use": "value", "value": wrap_text()}
            },
            {
                "$use": "present",
                "data": {"text": "copy"},
                "template": {"$use": "get", "path": ["source", 0, "template", "value"]}
            }
        ]));
        let context = Context::new();
        context.insert("source", source.clone());

        assert_eq!(
            engine.resolve(&source, &context).unwrap(),
            Value::from(json!(["[wrapped]", "[copy]"]))
        );
    }

    #[rstest]
    fn test_data_does_not_leak(engine: Engine) {
        let context = Context::from(json!({"$vars": {"text": "outer"}}));
        let template = Value::from(json!({
            "$use": "present",
            "data": {"text": "inner"},
            "template": {"$use": "value", "value": {"$use": "getVar", "path": ["text"]}}
        }));

        assert_eq!(engine.resolve(&template, &context).unwrap(), Value::from("inner"));
        assert_eq!(context.local_value("$vars", "text"), Value::from("outer"));
    }

    #[rstest]
    fn test_template_key_binds_template(engine: Engine) {
        let template = Value::from(json!({
            "$use": "present",
            "data": {"n": 1},
            "templateKey": "self",
            "template": {"$use": "value", "value": {"$use": "getVar", "path": ["self", "$use"]}}
        }));

        assert_eq!(engine.resolve(&template, &Context::new()).unwrap(), Value::from("getVar"));
    }

    #[rstest]
    fn test_non_object_data(engine: Engine) {
        let template = Value::from(json!({
            "$use": "present",
            "data": [1, 2],
            "template": {"$use": "value", "value": {"$use": "getVar", "path": ["0"]}}
        }));

        assert_eq!(engine.resolve(&template, &Context::new()).unwrap(), Value::None);
    }
}
