use super::codegen::{insert_in_constructors, CodeBuilder, FieldRef};
use super::{naming, runtime, CodeTransformer, Context, InterfaceTransformer, Transformer};
use crate::jvm::code::{BranchInstruction, Instruction, InvokeType, MethodBody};
use crate::jvm::model::{BinaryClass, FieldSpec, MethodSpec};
use crate::jvm::{
    self, BinaryName, ConstantsPool, FieldAccessFlags, MethodAccessFlags, UnqualifiedName,
};
use crate::Error;
use log::debug;

/// Gives advised classes a map of runtime attachable metadata
///
/// Adds a `java.util.Map` field, created in every constructor, with a getter and a setter, and
/// the `MetaDataEnhanceable` interface exposing them.
pub struct MetaDataStorage;

/// Context key set when the interface stage added the map field
const STORAGE_ADDED: &str = "metadata-storage.added";

const MAP_DESCRIPTOR: &str = "Ljava/util/Map;";
const GET_METADATA_DESCRIPTOR: &str = "(Ljava/lang/Object;)Ljava/lang/Object;";
const ADD_METADATA_DESCRIPTOR: &str = "(Ljava/lang/Object;Ljava/lang/Object;)V";

impl Transformer for MetaDataStorage {
    fn name(&self) -> &'static str {
        "metadata-storage"
    }

    fn interface_stage(&self) -> Option<&dyn InterfaceTransformer> {
        Some(self)
    }

    fn code_stage(&self) -> Option<&dyn CodeTransformer> {
        Some(self)
    }
}

fn map_field(class_name: &str) -> FieldRef<'_> {
    FieldRef {
        class: class_name,
        name: naming::METADATA_FIELD,
        descriptor: MAP_DESCRIPTOR,
        is_static: false,
    }
}

impl InterfaceTransformer for MetaDataStorage {
    fn transform_interface(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        if class.is_interface() || !context.has_advice() {
            return Ok(());
        }
        let added = class.add_field(FieldSpec {
            access_flags: FieldAccessFlags::PRIVATE | FieldAccessFlags::TRANSIENT,
            name: naming::METADATA_FIELD.to_owned(),
            descriptor: MAP_DESCRIPTOR.to_owned(),
            constant_value: None,
        })?;
        if !added {
            return Ok(());
        }

        let class_name = class.name().to_owned();
        let getter = accessor(&mut class.constants, &class_name, false)?;
        class.add_method(MethodSpec {
            access_flags: MethodAccessFlags::PUBLIC,
            name: naming::GET_METADATA_METHOD.to_owned(),
            descriptor: GET_METADATA_DESCRIPTOR.to_owned(),
            body: Some(getter),
            exceptions: vec![],
        })?;
        let setter = accessor(&mut class.constants, &class_name, true)?;
        class.add_method(MethodSpec {
            access_flags: MethodAccessFlags::PUBLIC,
            name: naming::ADD_METADATA_METHOD.to_owned(),
            descriptor: ADD_METADATA_DESCRIPTOR.to_owned(),
            body: Some(setter),
            exceptions: vec![],
        })?;
        class.add_interface(runtime::METADATA_ENHANCEABLE)?;
        debug!("{}: added metadata storage to '{}'", self.name(), class_name);

        context.put_metadata(STORAGE_ADDED, true);
        context.mark_advised();
        Ok(())
    }
}

/// `return metaData.get(key)` or `metaData.put(key, value)`
fn accessor(
    constants: &mut ConstantsPool,
    class_name: &str,
    is_setter: bool,
) -> Result<MethodBody, jvm::Error> {
    let mut code = CodeBuilder::new(constants);
    code.push(Instruction::ALoad(0));
    code.get_field(map_field(class_name))?;
    code.push(Instruction::ALoad(1));
    if is_setter {
        code.push(Instruction::ALoad(2));
        code.invoke(
            InvokeType::Interface(0),
            BinaryName::MAP.as_str(),
            UnqualifiedName::PUT.as_str(),
            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
        )?;
        code.push(Instruction::Pop);
        code.branch(BranchInstruction::Return);
    } else {
        code.invoke(
            InvokeType::Interface(0),
            BinaryName::MAP.as_str(),
            UnqualifiedName::GET.as_str(),
            "(Ljava/lang/Object;)Ljava/lang/Object;",
        )?;
        code.branch(BranchInstruction::AReturn);
    }
    Ok(code.into_body())
}

impl CodeTransformer for MetaDataStorage {
    fn transform_code(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        if context.metadata::<bool>(STORAGE_ADDED) != Some(&true) {
            return Ok(());
        }
        let class_name = class.name().to_owned();
        let missing = insert_in_constructors(class, |code| {
            code.push(Instruction::ALoad(0));
            code.new_object(BinaryName::HASHMAP.as_str(), "()V", |_| Ok(()))?;
            code.put_field(map_field(&class_name))
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
