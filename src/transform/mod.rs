//! The weaving passes
//!
//! A [`Pipeline`] is a fixed list of passes. Each pass can have an interface stage (adding
//! interfaces, fields, and method skeletons) and a code stage (rewriting method bodies). A run
//! applies every interface stage in order, then every code stage in order, so code stages see
//! every member added by any pass.
//!
//! The standard passes, in order:
//!
//!  1. [`SerialVersionUid`]: pin the default `serialVersionUID` of serializable classes
//!  2. [`MemberFieldAdvice`]: wrap instance field accesses with join point calls
//!  3. [`StaticFieldAdvice`]: wrap static field accesses with join point calls
//!  4. [`CallerSideAdvice`]: wrap advised call sites
//!  5. [`MemberMethodAdvice`]: route advised instance methods through join points
//!  6. [`StaticMethodAdvice`]: route advised static methods through join points
//!  7. [`AddInterfaces`]: add introduced interfaces
//!  8. [`AddImplementations`]: add methods delegating to introduction implementations
//!  9. [`MetaDataStorage`]: attachable per-instance metadata
//!  10. [`Identity`]: per-instance identity
//!
//! Passes never advise a member twice. The pipeline skips passes recorded as having produced the
//! bytes it is given, and each pass also recognizes its own generated members.

mod callers;
pub mod codegen;
mod context;
mod fields;
mod identity;
mod implementations;
mod interfaces;
mod methods;
pub mod naming;
pub mod runtime;
mod serial;
mod storage;

pub use callers::*;
pub use context::*;
pub use fields::*;
pub use identity::*;
pub use implementations::*;
pub use interfaces::*;
pub use methods::*;
pub use serial::*;
pub use storage::*;

use crate::jvm::model::BinaryClass;
use crate::{Error, Settings};
use log::debug;

/// Pass adding to the structure of a class
pub trait InterfaceTransformer {
    fn transform_interface(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error>;
}

/// Pass rewriting method bodies
pub trait CodeTransformer {
    fn transform_code(&self, context: &mut Context<'_>, class: &mut BinaryClass)
        -> Result<(), Error>;
}

/// One pass of the pipeline, exposing whichever stages it has
pub trait Transformer: Send + Sync {
    /// Name used in logs and in the record of transformed classes
    fn name(&self) -> &'static str;

    fn interface_stage(&self) -> Option<&dyn InterfaceTransformer> {
        None
    }

    fn code_stage(&self) -> Option<&dyn CodeTransformer> {
        None
    }
}

pub struct Pipeline {
    passes: Vec<Box<dyn Transformer>>,
}

impl Pipeline {
    pub fn new(passes: Vec<Box<dyn Transformer>>) -> Pipeline {
        Pipeline { passes }
    }

    /// The ten standard passes (metadata storage and identity only if enabled)
    pub fn standard(settings: &Settings) -> Pipeline {
        let mut passes: Vec<Box<dyn Transformer>> = vec![
            Box::new(SerialVersionUid),
            Box::new(MemberFieldAdvice),
            Box::new(StaticFieldAdvice),
            Box::new(CallerSideAdvice),
            Box::new(MemberMethodAdvice),
            Box::new(StaticMethodAdvice),
            Box::new(AddInterfaces),
            Box::new(AddImplementations),
        ];
        if settings.metadata_storage {
            passes.push(Box::new(MetaDataStorage));
        }
        if settings.identity {
            passes.push(Box::new(Identity));
        }
        Pipeline { passes }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Run every interface stage, then every code stage
    pub fn run(&self, context: &mut Context<'_>, class: &mut BinaryClass) -> Result<(), Error> {
        let pending: Vec<&dyn Transformer> = self
            .passes
            .iter()
            .map(|pass| pass.as_ref())
            .filter(|pass| {
                let done = context.is_transformed(pass.name());
                if done {
                    debug!("{}: '{}' is already transformed", pass.name(), class.name());
                }
                !done
            })
            .collect();

        for pass in &pending {
            if let Some(stage) = pass.interface_stage() {
                stage.transform_interface(context, class)?;
            }
        }
        for pass in &pending {
            if let Some(stage) = pass.code_stage() {
                stage.transform_code(context, class)?;
            }
            context.mark_transformed(pass.name());
        }
        Ok(())
    }
}
