use super::codegen::{insert_in_constructors, CodeBuilder, FieldRef};
use super::{naming, runtime, CodeTransformer, Context, InterfaceTransformer, Transformer};
use crate::jvm::code::{BranchInstruction, Instruction, InvokeType};
use crate::jvm::model::{BinaryClass, FieldSpec, MethodSpec};
use crate::jvm::{FieldAccessFlags, MethodAccessFlags};
use crate::Error;
use log::debug;

/// Gives every instance of an advised class an identity string, generated by the runtime when
/// the instance is constructed
pub struct Identity;

const IDENTITY_ADDED: &str = "identity.added";
const STRING_DESCRIPTOR: &str = "Ljava/lang/String;";

impl Transformer for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn interface_stage(&self) -> Option<&dyn InterfaceTransformer> {
        Some(self)
    }

    fn code_stage(&self) -> Option<&dyn CodeTransformer> {
        Some(self)
    }
}

fn uuid_field(class_name: &str) -> FieldRef<'_> {
    FieldRef {
        class: class_name,
        name: naming::UUID_FIELD,
        descriptor: STRING_DESCRIPTOR,
        is_static: false,
    }
}

impl InterfaceTransformer for Identity {
    fn transform_interface(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        if class.is_interface() || !context.has_advice() {
            return Ok(());
        }
        let added = class.add_field(FieldSpec {
            access_flags: FieldAccessFlags::PRIVATE,
            name: naming::UUID_FIELD.to_owned(),
            descriptor: STRING_DESCRIPTOR.to_owned(),
            constant_value: None,
        })?;
        if !added {
            return Ok(());
        }

        let class_name = class.name().to_owned();
        let mut code = CodeBuilder::new(&mut class.constants);
        code.push(Instruction::ALoad(0));
        code.get_field(uuid_field(&class_name))?;
        code.branch(BranchInstruction::AReturn);
        let getter = code.into_body();
        class.add_method(MethodSpec {
            access_flags: MethodAccessFlags::PUBLIC,
            name: naming::GET_UUID_METHOD.to_owned(),
            descriptor: format!("(){}", STRING_DESCRIPTOR),
            body: Some(getter),
            exceptions: vec![],
        })?;
        class.add_interface(runtime::IDENTIFIABLE)?;
        debug!("{}: added an identity to '{}'", self.name(), class_name);

        context.put_metadata(IDENTITY_ADDED, true);
        context.mark_advised();
        Ok(())
    }
}

impl CodeTransformer for Identity {
    fn transform_code(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        if context.metadata::<bool>(IDENTITY_ADDED) != Some(&true) {
            return Ok(());
        }
        let class_name = class.name().to_owned();
        let missing = insert_in_constructors(class, |code| {
            code.push(Instruction::ALoad(0));
            code.push(Instruction::ALoad(0));
            let (generate, descriptor) = runtime::GENERATE_IDENTITY;
            code.invoke(InvokeType::Static, runtime::IDENTITY, generate, descriptor)?;
            code.put_field(uuid_field(&class_name))
        })?;
        if let Some(descriptor) = missing.first() {
            return Err(Error::Fault {
                pass: self.name(),
                message: format!(
                    "constructor {} of {} calls no other constructor",
                    descriptor, class_name
                ),
            });
        }
        Ok(())
    }
}
