//! `stencil-lang` resolves data-driven templates.
//!
//! A template is plain data: strings, numbers, arrays and objects. An object
//! carrying the directive key (`"$use"` by default) is a directive invocation.
//! Resolving a template executes its invocations against a context and copies
//! everything else.
//!
//! ## Examples
//!
//! ```rust
//! use stencil_lang::{Context, Engine, Value};
//! use serde_json::json;
//!
//! let engine = Engine::default();
//! let template = Value::from(json!({
//!     "greeting": {"$use": "+", "args": ["Hello, ", {"$use": "get", "path": ["name"]}]}
//! }));
//! let context = Context::try_from(Value::from(json!({"name": "Bob"}))).unwrap();
//!
//! let resolved = engine.resolve(&template, &context).unwrap();
//! assert_eq!(resolved, Value::from(json!({"greeting": "Hello, Bob"})));
//!
//! // Fold everything that does not depend on the context.
//! let optimized = engine.optimize(&Value::from(json!([
//!     {"$use": "if", "if": true, "then": 1},
//!     {"$use": "get", "path": ["name"]}
//! ]))).unwrap();
//! assert!(!optimized.executable);
//! ```
pub mod coerce;
mod copy;
pub mod directive;
mod engine;
mod error;
mod number;
mod optimizer;
mod scope;
mod value;

pub use copy::deep_copy;
pub use directive::{Directive, Params, Registry};
pub use engine::{Engine, Invocation, Options};
pub use error::Error;
pub use number::Number;
pub use optimizer::{Optimized, Optimizer};
pub use scope::{Ancestors, Context, ResolutionState};
pub use value::{ArrayRef, Callable, Map, NativeFunction, ObjectRef, Value};

pub type Shared<T> = std::rc::Rc<T>;
pub type SharedCell<T> = std::cell::RefCell<T>;

pub type StencilResult = Result<Value, Error>;
