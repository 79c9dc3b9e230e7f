use super::{Context, InterfaceTransformer, Transformer};
use crate::jvm::model::BinaryClass;
use crate::model::DefinitionError;
use crate::Error;
use log::debug;

/// Adds the interfaces of the introductions bound to a class
pub struct AddInterfaces;

impl Transformer for AddInterfaces {
    fn name(&self) -> &'static str {
        "add-interfaces"
    }

    fn interface_stage(&self) -> Option<&dyn InterfaceTransformer> {
        Some(self)
    }
}

impl InterfaceTransformer for AddInterfaces {
    fn transform_interface(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        if class.is_interface() {
            return Ok(());
        }
        let model = context.model();
        let snapshot = context.class_metadata();
        let mut added = false;
        for name in model.introduction_names(&snapshot) {
            let introduction = model
                .introduction(name)
                .ok_or_else(|| DefinitionError::UnknownIntroduction(name.to_owned()))?;
            let interface = introduction.interface.replace('.', "/");
            if class.add_interface(&interface)? {
                debug!("{}: '{}' now implements {}", self.name(), class.name(), interface);
                added = true;
            }
        }
        if added {
            context.mark_advised();
        }
        Ok(())
    }
}
