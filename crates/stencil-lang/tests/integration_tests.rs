use std::cell::Cell;

use rstest::{fixture, rstest};
use serde_json::json;
use stencil_lang::{Context, Engine, Error, Registry, Shared, Value, deep_copy};

#[fixture]
fn engine() -> Engine {
    Engine::default()
}

fn context(json: serde_json::Value) -> Context {
    Context::try_from(Value::from(json)).unwrap()
}

fn push(list: &str, item: serde_json::Value) -> serde_json::Value {
    json!({"$use": "set", "path": [list, {"name": "push", "args": [item]}]})
}

fn var(name: &str) -> serde_json::Value {
    json!({"$use": "getVar", "path": [name]})
}

#[rstest]
#[case::cast_number(
    json!({"$use": "cast", "value": "12", "as": "number"}),
    json!({}),
    Ok(json!(12)))]
#[case::cast_json_object(
    json!({"$use": "cast", "value": "{\"a\": 1}", "as": "object"}),
    json!({}),
    Ok(json!({"a": 1})))]
#[case::cast_wraps_text(
    json!({"$use": "cast", "value": "plain", "as": "object"}),
    json!({}),
    Ok(json!({"value": "plain"})))]
#[case::cast_json_array(
    json!({"$use": "cast", "value": "[1, 2]", "as": "array"}),
    json!({}),
    Ok(json!([1, 2])))]
#[case::get_nested(
    json!({"$use": "get", "path": ["user", "name"]}),
    json!({"user": {"name": "Joe"}}),
    Ok(json!("Joe")))]
#[case::get_at(
    json!({"$use": "get", "path": ["chars", {"name": "at", "args": [-1]}]}),
    json!({"chars": ["x", "y", "z"]}),
    Ok(json!("z")))]
#[case::get_find_with_callback(
    json!({"$use": "get", "path": ["people", {"name": "find", "args": [{
        "$use": "callback",
        "value": {"$use": "==", "args": [{"$use": "get", "path": ["$args", 0, "name"]}, "Max"]}
    }]}]}),
    json!({"people": [{"name": "Sam"}, {"name": "Max"}]}),
    Ok(json!({"name": "Max"})))]
#[case::get_flat_source(
    json!({"$use": "get", "source": [["a"], {"$use": "get", "path": ["value"]}, "c"], "path": {"name": "flat"}}),
    json!({"value": ["b"]}),
    Ok(json!(["a", "b", "c"])))]
#[case::get_as_lookup_table(
    json!({"$use": "get", "path": {"$use": "get", "path": ["value"]}, "source": {"on": "active", "off": "inactive"}}),
    json!({"value": "on"}),
    Ok(json!("active")))]
#[case::get_default(
    json!({"$use": "get", "path": {"$use": "get", "path": ["value"]}, "source": {"on": "active"}, "default": "error"}),
    json!({"value": "?"}),
    Ok(json!("error")))]
#[case::if_then(
    json!({"$use": "if", "if": {"$use": "get", "path": ["flag"]}, "then": "yes", "else": "no"}),
    json!({"flag": true}),
    Ok(json!("yes")))]
#[case::if_else(
    json!({"$use": "if", "if": {"$use": "get", "path": ["flag"]}, "then": "yes", "else": "no"}),
    json!({"flag": 0}),
    Ok(json!("no")))]
#[case::literal(
    json!({"$use": "value", "value": {"$use": "get", "path": ["x"]}}),
    json!({"x": 1}),
    Ok(json!({"$use": "get", "path": ["x"]})))]
#[case::not_equal(
    json!({"$use": "!=", "args": [1, 2, 1]}),
    json!({}),
    Ok(json!(true)))]
#[case::ascending(
    json!({"$use": "<", "args": [1, 2, 3]}),
    json!({}),
    Ok(json!(true)))]
#[case::not_ascending(
    json!({"$use": "<", "args": [1, 1, 3]}),
    json!({}),
    Ok(json!(false)))]
#[case::negation(
    json!({"$use": "not", "value": {"$use": "get", "path": ["x"]}}),
    json!({"x": ""}),
    Ok(json!(true)))]
#[case::resolve_from_context(
    json!({"$use": "resolve", "value": {"$use": "get", "path": ["template"]}}),
    json!({"template": {"$use": "+", "args": [1, 2]}}),
    Ok(json!(3)))]
#[case::resolve_literal(
    json!({"$use": "resolve", "value": {"$use": "value", "value": {"$use": "*", "args": [2, 3]}}}),
    json!({}),
    Ok(json!(6)))]
#[case::coalesce(
    json!({"$use": "coalesce", "args": [null, {"$use": "get", "path": ["missing"]}, "fallback"]}),
    json!({}),
    Ok(json!("fallback")))]
#[case::between(
    json!({"$use": "between", "value": 5, "min": 1, "max": 10}),
    json!({}),
    Ok(json!(true)))]
#[case::repeat(
    json!({"$use": "run", "steps": [
        {"$use": "set", "path": ["list"], "value": []},
        {"$use": "repeat", "from": 2, "to": 6, "rate": 2, "steps": [push("list", var("$index"))]},
        {"$use": "return", "value": var("list")}
    ]}),
    json!({}),
    Ok(json!([2, 4, 6])))]
#[case::for_each(
    json!({"$use": "run", "steps": [
        {"$use": "set", "path": ["list"], "value": []},
        {"$use": "forEach", "for": {"$use": "get", "path": ["items"]}, "steps": [
            push("list", json!({"$use": "+", "args": [var("$value"), 1]}))
        ]},
        {"$use": "return", "value": var("list")}
    ]}),
    json!({"items": [1, 2, 3]}),
    Ok(json!([2, 3, 4])))]
#[case::for_each_break(
    json!({"$use": "run", "steps": [
        {"$use": "set", "path": ["list"], "value": []},
        {"$use": "forEach", "for": [1, 2, 3], "steps": [
            push("list", var("$value")),
            {"$use": "break"}
        ]},
        {"$use": "return", "value": var("list")}
    ]}),
    json!({}),
    Ok(json!([1])))]
fn test_resolve(
    engine: Engine,
    #[case] template: serde_json::Value,
    #[case] context_json: serde_json::Value,
    #[case] expected: Result<serde_json::Value, Error>,
) {
    let result = engine.resolve(&Value::from(template), &context(context_json));
    assert_eq!(result, expected.map(Value::from));
}

#[rstest]
fn test_scope_isolation(engine: Engine) {
    let template = json!({"$use": "run", "steps": [
        {"$use": "set", "path": ["x"], "value": 1},
        {"$use": "set", "path": ["inner"], "value": {"$use": "run", "steps": [
            {"$use": "set", "path": ["x"], "value": 2},
            {"$use": "return", "value": var("x")}
        ]}},
        {"$use": "return", "value": {"$use": "+", "args": [var("x"), var("inner")]}}
    ]});

    assert_eq!(
        engine.resolve(&Value::from(template), &Context::new()).unwrap(),
        Value::from(3)
    );
}

#[rstest]
fn test_scope_writes_stay_local(engine: Engine) {
    let context = context(json!({"$vars": {"x": 1}}));
    let template = json!({"$use": "run", "steps": [
        {"$use": "set", "path": ["x"], "value": 2},
        {"$use": "return", "value": var("x")}
    ]});

    assert_eq!(engine.resolve(&Value::from(template), &context).unwrap(), Value::from(2));
    assert_eq!(context.local_value("$vars", "x"), Value::from(1));
}

#[rstest]
fn test_switch_fallthrough(engine: Engine) {
    let case = |label: &str, item: i32, stop: bool| {
        let mut steps = vec![push("list", json!(item))];
        if stop {
            steps.push(json!({"$use": "break"}));
        }
        json!({"case": label, "steps": steps})
    };
    let template = json!({"$use": "run", "steps": [
        {"$use": "set", "path": ["list"], "value": []},
        {"$use": "switch", "value": "b", "cases": [
            case("a", 1, false),
            case("b", 2, false),
            case("c", 3, true),
            case("d", 4, false)
        ]},
        {"$use": "return", "value": var("list")}
    ]});

    assert_eq!(
        engine.resolve(&Value::from(template), &Context::new()).unwrap(),
        Value::from(json!([2, 3]))
    );
}

#[rstest]
fn test_switch_first_default_only(engine: Engine) {
    let template = json!({"$use": "run", "steps": [
        {"$use": "set", "path": ["list"], "value": []},
        {"$use": "switch", "value": "z", "cases": [
            {"case": "a", "steps": [push("list", json!(1))]},
            [push("list", json!(-1))],
            {"case": "b", "steps": [push("list", json!(2))]},
            [push("list", json!(-2))]
        ]},
        {"$use": "return", "value": var("list")}
    ]});

    assert_eq!(
        engine.resolve(&Value::from(template), &Context::new()).unwrap(),
        Value::from(json!([-1]))
    );
}

#[rstest]
fn test_comparison_stops_at_first_failure(engine: Engine) {
    let calls = Shared::new(Cell::new(0));
    let counter = Shared::clone(&calls);
    let context = Context::new();
    context.insert(
        "count",
        Value::function(move |_| {
            counter.set(counter.get() + 1);
            Ok(Value::from(5))
        }),
    );
    let template = json!({"$use": "<", "args": [1, 1, {"$use": "call", "target": {"$use": "get", "path": ["count"]}}]});

    assert_eq!(engine.resolve(&Value::from(template), &context).unwrap(), Value::from(false));
    assert_eq!(calls.get(), 0);
}

#[rstest]
fn test_get_result_is_detached(engine: Engine) {
    let context = context(json!({"item": {"name": "it"}}));
    let value = engine
        .resolve(&Value::from(json!({"$use": "get", "path": ["item"]})), &context)
        .unwrap();

    if let Value::Object(item) = context.get("item") {
        item.borrow_mut().insert("name".into(), Value::from("not"));
    }

    assert_eq!(value, Value::from(json!({"name": "it"})));
}

#[rstest]
fn test_resolution_state_ancestry(engine: Engine) {
    let template = json!({
        "name": "Bob",
        "item": {"ownerName": {"$use": "get", "path": ["$resolving", "parent", "parent", "source", "name"]}}
    });

    assert_eq!(
        engine.resolve(&Value::from(template), &Context::new()).unwrap(),
        Value::from(json!({"name": "Bob", "item": {"ownerName": "Bob"}}))
    );
}

#[rstest]
fn test_resolve_leaves_template_untouched(engine: Engine) {
    let template = Value::from(json!({"sum": {"$use": "+", "args": [1, 2]}, "list": [1, {"$use": "not", "value": true}]}));
    let snapshot = deep_copy(&template);

    engine.resolve(&template, &Context::new()).unwrap();

    assert_eq!(template, snapshot);
}

#[test]
fn test_cyclic_copy() {
    let value = Value::from(json!({"name": "node"}));
    if let Value::Object(map) = &value {
        map.borrow_mut().insert("self".into(), value.clone());
    }

    let copy = deep_copy(&value);

    assert!(copy.get("self").ptr_eq(&copy));
    assert!(!copy.get("self").ptr_eq(&value));
}

#[rstest]
#[case::pure(json!({"total": {"$use": "+", "args": [1, {"$use": "*", "args": [2, 3]}]}, "flag": {"$use": "not", "value": false}}))]
#[case::conditional(json!([{"$use": "if", "if": {"$use": ">", "args": [2, 1]}, "then": "big", "else": "small"}]))]
#[case::literal(json!({"$use": "value", "value": 7}))]
fn test_optimize_pure_templates(engine: Engine, #[case] template: serde_json::Value) {
    let template = Value::from(template);
    let optimized = engine.optimize(&template).unwrap();
    let context = context(json!({"x": 1}));

    assert!(optimized.executable);
    assert_eq!(
        engine.resolve(&optimized.value, &context).unwrap(),
        engine.resolve(&template, &context).unwrap()
    );
}

#[rstest]
fn test_optimize_keeps_context_dependent_parts(engine: Engine) {
    let template = Value::from(json!({
        "greeting": {"$use": "+", "args": ["Hi ", {"$use": "get", "path": ["name"]}]},
        "constant": {"$use": "+", "args": [1, 2]}
    }));
    let optimized = engine.optimize(&template).unwrap();
    let context = context(json!({"name": "Ann"}));

    assert!(!optimized.executable);
    assert_eq!(optimized.value.get("constant"), Value::from(3));
    assert_eq!(
        engine.resolve(&optimized.value, &context).unwrap(),
        Value::from(json!({"greeting": "Hi Ann", "constant": 3}))
    );
}

#[rstest]
fn test_optimize_preserves_object_literals(engine: Engine) {
    let template = Value::from(json!({"$use": "value", "value": {"$use": "get", "path": ["x"]}}));
    let optimized = engine.optimize(&template).unwrap();

    assert!(!optimized.executable);
    assert_eq!(optimized.value, template);
}

#[rstest]
#[case::get(json!({"$use": {"$use": "value", "value": "get"}, "path": ["x"]}))]
#[case::not(json!({"$use": {"$use": "value", "value": "not"}, "value": true}))]
#[case::nested(json!({"items": [{"$use": {"$use": "+", "args": ["ge", "t"]}, "path": ["x"]}]}))]
fn test_optimize_keeps_computed_markers_as_data(engine: Engine, #[case] template: serde_json::Value) {
    let template = Value::from(template);
    let optimized = engine.optimize(&template).unwrap();
    let context = context(json!({"x": 5}));

    assert_eq!(
        engine.resolve(&optimized.value, &context).unwrap(),
        engine.resolve(&template, &context).unwrap()
    );
}

#[rstest]
#[case::set_index(json!({"$use": "set", "path": ["out", 1e20], "value": 1}))]
#[case::set_far_index(json!({"$use": "set", "path": ["out", 1e12], "value": 1}))]
#[case::map_key(json!({"$use": "map", "source": [1], "getKey": 1e20}))]
fn test_out_of_range_index_is_an_error(#[case] template: serde_json::Value) {
    let engine = Engine::new(
        Registry::standard().with("map", stencil_lang::directive::transform::MapValuesDirective),
    );
    let result = engine.resolve(&Value::from(template), &context(json!({"$vars": {"out": []}})));

    assert!(matches!(result, Err(Error::Runtime(_))));
}

#[rstest]
fn test_flat_on_self_containing_array(engine: Engine) {
    let context = context(json!({"$vars": {"out": [1, [2]]}}));
    if let Value::Array(items) = context.local_value("$vars", "out") {
        items.borrow_mut().push(Value::Array(Shared::clone(&items)));
    }

    let result = engine.resolve(
        &Value::from(json!({"$use": "set", "path": ["out", {"name": "flat", "args": [10]}]})),
        &context,
    );

    assert_eq!(result, Err(Error::CyclicValue));
}

#[test]
fn test_custom_keys() {
    let mut engine = Engine::default();
    engine.set_directive_key("@do");
    engine.set_local_variables_key("@locals");

    let template = json!({"@do": "run", "steps": [
        {"@do": "set", "path": ["x"], "value": 4},
        {"@do": "return", "value": {"@do": "getVar", "path": ["x"]}}
    ]});

    assert_eq!(
        engine.resolve(&Value::from(template), &Context::new()).unwrap(),
        Value::from(4)
    );
}

#[test]
fn test_empty_registry_copies_everything() {
    let engine = Engine::new(Registry::new());
    let template = Value::from(json!({"$use": "get", "path": ["x"]}));
    let resolved = engine.resolve(&template, &Context::new()).unwrap();

    assert_eq!(resolved, template);
    assert!(!resolved.ptr_eq(&template));
}
