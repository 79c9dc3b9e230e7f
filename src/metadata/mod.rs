//! Structural facts about classes and their members
//!
//! Pattern matching never looks at class files directly. Instead, it consumes:
//!
//!   - [`MethodMetaData`] and [`FieldMetaData`], built from a compiled class, from a source
//!     declaration, or from reflection, all normalized to the same [`TypeName`] spelling
//!   - [`ClassMetaData`] and [`InterfaceMetaData`], which chain up to the supertypes so that
//!     hierarchical patterns can walk them
//!
//! Class and interface metadata is memoized in a [`MetaDataCache`], resolving supertypes through
//! a [`ClassLoader`].

mod cache;
mod class;
mod loader;
mod member;
mod source;
mod type_name;

pub use cache::*;
pub use class::*;
pub use loader::*;
pub use member::*;
pub use source::{ReflectedField, ReflectedMethod, SourceField, SourceMethod};
pub use type_name::*;

/// Prefix of every field and method name the weaver generates
pub const RESERVED_PREFIX: &str = "___jw$";
