//! Weave definitions and the resolved weave model
//!
//! A [`WeaveDefinition`] is what the definition frontends produce: aspects with their named
//! pointcuts, advice and introduction bindings, and join point controllers. Resolving it checks
//! every reference and compiles every pattern into a [`WeaveModel`], which then answers the
//! transformers' "is this advised?" questions without ever failing.

mod definition;
mod errors;
mod expression;
mod pattern;
mod registry;
mod weave_model;

pub use definition::*;
pub use errors::*;
pub use expression::Expression;
pub use pattern::{ClassPattern, FieldPattern, MethodPattern};
pub use registry::*;
pub use weave_model::*;
