//! Load-time weaver for JVM class files
//!
//! Classes are handed to a [`Preprocessor`] as raw bytes as they are loaded. The preprocessor
//! parses them into an editable [`jvm::model::BinaryClass`], asks the resolved
//! [`model::WeaveModel`] which join points are advised, and runs a fixed [`transform::Pipeline`]
//! of rewriting passes before serializing the class back to bytes.
//!
//! The generated code calls into a small runtime library (join point classes, introduction
//! registry, identity and metadata interfaces) whose call shapes are listed in
//! [`transform::runtime`].

mod errors;
pub mod jvm;
pub mod metadata;
pub mod model;
mod preprocessor;
mod settings;
pub mod transform;
pub mod util;

pub use errors::*;
pub use preprocessor::*;
pub use settings::*;
