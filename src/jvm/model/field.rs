use crate::jvm::class_file::{Attribute, ConstantValue, Serialize};
use crate::jvm::{ConstantIndex, ConstantsPool, Error, FieldAccessFlags, Utf8ConstantIndex};
use byteorder::WriteBytesExt;

/// Field of a [`BinaryClass`](super::BinaryClass)
///
/// Attributes are kept in their raw form.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlags,
    name: String,
    descriptor: String,
    name_index: Utf8ConstantIndex,
    descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl FieldInfo {
    pub(crate) fn from_raw(
        field: crate::jvm::class_file::Field,
        constants: &ConstantsPool,
    ) -> Result<FieldInfo, Error> {
        Ok(FieldInfo {
            access_flags: field.access_flags,
            name: constants.utf8(field.name_index)?.to_owned(),
            descriptor: constants.utf8(field.descriptor_index)?.to_owned(),
            name_index: field.name_index,
            descriptor_index: field.descriptor_index,
            attributes: field.attributes,
        })
    }

    pub(crate) fn from_spec(
        spec: FieldSpec,
        constants: &mut ConstantsPool,
    ) -> Result<FieldInfo, Error> {
        let mut attributes = vec![];
        if let Some(constant) = spec.constant_value {
            attributes.push(constants.get_attribute(ConstantValue(constant))?);
        }
        Ok(FieldInfo {
            access_flags: spec.access_flags,
            name_index: constants.get_utf8(spec.name.as_str())?,
            descriptor_index: constants.get_utf8(spec.descriptor.as_str())?,
            name: spec.name,
            descriptor: spec.descriptor,
            attributes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}

impl Serialize for FieldInfo {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// Field to add to a class
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub access_flags: FieldAccessFlags,
    pub name: String,
    pub descriptor: String,

    /// Initial value of a `static final` field (`ConstantValue` attribute)
    pub constant_value: Option<ConstantIndex>,
}
