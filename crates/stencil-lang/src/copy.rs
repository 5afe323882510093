use rustc_hash::FxHashMap;

use crate::{Shared, SharedCell, value::Value};

/// Copies every array and object reachable from `value`.
///
/// Each source container is copied exactly once, so aliasing inside the
/// source is preserved in the copy and self-referential values terminate.
/// Functions and primitives are shared as is.
pub fn deep_copy(value: &Value) -> Value {
    DeepCopier::default().copy(value)
}

#[derive(Default)]
struct DeepCopier {
    copies: FxHashMap<*const (), Value>,
}

impl DeepCopier {
    fn copy(&mut self, value: &Value) -> Value {
        match value {
            Value::Array(items) => {
                let key = Shared::as_ptr(items) as *const ();
                if let Some(copy) = self.copies.get(&key) {
                    return copy.clone();
                }

                let target = Shared::new(SharedCell::new(Vec::with_capacity(items.borrow().len())));
                self.copies.insert(key, Value::Array(Shared::clone(&target)));

                let source = items.borrow().clone();
                for item in source.iter() {
                    let item = self.copy(item);
                    target.borrow_mut().push(item);
                }

                Value::Array(target)
            }
            Value::Object(map) => {
                let key = Shared::as_ptr(map) as *const ();
                if let Some(copy) = self.copies.get(&key) {
                    return copy.clone();
                }

                let target = Shared::new(SharedCell::new(crate::Map::default()));
                self.copies.insert(key, Value::Object(Shared::clone(&target)));

                let source = map.borrow().clone();
                for (name, item) in source.iter() {
                    let item = self.copy(item);
                    target.borrow_mut().insert(name.clone(), item);
                }

                Value::Object(target)
            }
            _ => value.clone(),
        }
    }
}
