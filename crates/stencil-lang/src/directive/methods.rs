//! Built-in methods available to path steps that call a method on an array.
use itertools::Itertools;
use smallvec::SmallVec;

use crate::{
    StencilResult, coerce,
    error::Error,
    value::{ArrayRef, Callable, Value},
};

/// Calls the method `name` on `items`. Mutating methods such as `push`
/// change `items` in place. Unknown methods yield [`Value::None`].
pub fn call_array_method(items: &ArrayRef, name: &str, args: &[Value]) -> StencilResult {
    let arg = |index: usize| args.get(index).cloned().unwrap_or_default();

    match name {
        "at" => {
            let items = items.borrow();
            let position = coerce::to_number(&arg(0));
            let position = if position.is_nan() { 0.0 } else { position.value().trunc() };
            let index = if position < 0.0 { items.len() as f64 + position } else { position };

            if index < 0.0 || index >= items.len() as f64 {
                Ok(Value::None)
            } else {
                Ok(items[index as usize].clone())
            }
        }
        "concat" => {
            let mut result = items.borrow().clone();
            for arg in args {
                match arg {
                    Value::Array(other) => result.extend(other.borrow().iter().cloned()),
                    other => result.push(other.clone()),
                }
            }
            Ok(Value::array(result))
        }
        "every" => {
            let callback = callback(name, args)?;
            for (index, item) in snapshot(items).into_iter().enumerate() {
                if !coerce::to_boolean(&invoke(&callback, items, item, index)?) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "some" => {
            let callback = callback(name, args)?;
            for (index, item) in snapshot(items).into_iter().enumerate() {
                if coerce::to_boolean(&invoke(&callback, items, item, index)?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "filter" => {
            let callback = callback(name, args)?;
            let mut kept = Vec::new();
            for (index, item) in snapshot(items).into_iter().enumerate() {
                if coerce::to_boolean(&invoke(&callback, items, item.clone(), index)?) {
                    kept.push(item);
                }
            }
            Ok(Value::array(kept))
        }
        "find" | "findIndex" => {
            let callback = callback(name, args)?;
            for (index, item) in snapshot(items).into_iter().enumerate() {
                if coerce::to_boolean(&invoke(&callback, items, item.clone(), index)?) {
                    return Ok(if name == "find" { item } else { Value::from(index) });
                }
            }
            Ok(if name == "find" { Value::None } else { Value::from(-1) })
        }
        "map" => {
            let callback = callback(name, args)?;
            snapshot(items)
                .into_iter()
                .enumerate()
                .map(|(index, item)| invoke(&callback, items, item, index))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::array)
        }
        "flat" => {
            let depth = match arg(0) {
                Value::None => 1.0,
                depth => coerce::to_number(&depth).value(),
            };
            let mut result = Vec::new();
            let mut seen = SmallVec::new();
            flatten(items, depth, &mut seen, &mut result)?;
            Ok(Value::array(result))
        }
        "includes" => {
            let needle = arg(0);
            Ok(Value::Bool(
                items.borrow().iter().any(|item| same_value_zero(item, &needle)),
            ))
        }
        "indexOf" => {
            let needle = arg(0);
            Ok(items
                .borrow()
                .iter()
                .position(|item| coerce::strict_eq(item, &needle))
                .map_or(Value::from(-1), Value::from))
        }
        "lastIndexOf" => {
            let needle = arg(0);
            Ok(items
                .borrow()
                .iter()
                .rposition(|item| coerce::strict_eq(item, &needle))
                .map_or(Value::from(-1), Value::from))
        }
        "join" => {
            let separator = match arg(0) {
                Value::None => ",".to_string(),
                separator => coerce::to_string(&separator),
            };
            Ok(Value::String(
                snapshot(items)
                    .iter()
                    .map(|item| match item {
                        Value::None | Value::Null => String::new(),
                        item => coerce::to_string(item),
                    })
                    .join(&separator),
            ))
        }
        "slice" => {
            let snapshot = snapshot(items);
            let len = snapshot.len();
            let start = match arg(0) {
                Value::None => 0,
                start => coerce::to_number(&start).to_relative_index(len),
            };
            let end = match arg(1) {
                Value::None => len,
                end => coerce::to_number(&end).to_relative_index(len),
            };
            Ok(Value::array(if start < end {
                snapshot[start..end].to_vec()
            } else {
                Vec::new()
            }))
        }
        "push" => {
            let mut items = items.borrow_mut();
            items.extend(args.iter().cloned());
            Ok(Value::from(items.len()))
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or_default()),
        "shift" => {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                Ok(Value::None)
            } else {
                Ok(items.remove(0))
            }
        }
        "unshift" => {
            let mut items = items.borrow_mut();
            items.splice(0..0, args.iter().cloned());
            Ok(Value::from(items.len()))
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(Value::Array(crate::Shared::clone(items)))
        }
        _ => Ok(Value::None),
    }
}

/// Longest array an indexed write may grow.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Stores `value` at `index`, padding the gap with [`Value::None`].
///
/// Writes that would grow the array past [`MAX_ARRAY_LENGTH`] fail.
pub fn set_element(items: &mut Vec<Value>, index: usize, value: Value) -> Result<(), Error> {
    if index >= items.len() {
        let len = index
            .checked_add(1)
            .filter(|len| *len <= MAX_ARRAY_LENGTH)
            .ok_or_else(|| Error::Runtime(format!("array index {} is out of range", index)))?;
        items.resize(len, Value::None);
    }
    items[index] = value;
    Ok(())
}

fn snapshot(items: &ArrayRef) -> Vec<Value> {
    items.borrow().clone()
}

fn callback(method: &str, args: &[Value]) -> Result<Callable, Error> {
    match args.first() {
        Some(Value::Function(callable)) => Ok(callable.clone()),
        other => Err(Error::Runtime(format!(
            "{} expects a function, got {}",
            method,
            other.map_or("undefined", Value::type_name)
        ))),
    }
}

fn invoke(callback: &Callable, items: &ArrayRef, item: Value, index: usize) -> StencilResult {
    callback.call(&[item, Value::from(index), Value::Array(crate::Shared::clone(items))])
}

fn flatten(
    items: &ArrayRef,
    depth: f64,
    seen: &mut SmallVec<[*const (); 8]>,
    result: &mut Vec<Value>,
) -> Result<(), Error> {
    let ptr = crate::Shared::as_ptr(items) as *const ();
    if seen.contains(&ptr) {
        return Err(Error::CyclicValue);
    }

    seen.push(ptr);
    for item in snapshot(items) {
        match item {
            Value::Array(inner) if depth >= 1.0 => flatten(&inner, depth - 1.0, seen, result)?,
            item => result.push(item),
        }
    }
    seen.pop();

    Ok(())
}

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => coerce::strict_eq(a, b),
    }
}
