//! Editable classes
//!
//!   - __Class__ is represented using [`BinaryClass`]
//!   - __Method__ is represented using [`MethodInfo`], and new ones are described with
//!     [`MethodSpec`]
//!   - __Field__ is represented using [`FieldInfo`], and new ones are described with
//!     [`FieldSpec`]

mod class;
mod field;
mod method;

pub use class::*;
pub use field::*;
pub use method::*;
