use crate::jvm::class_file::{Attribute, Deserialize, Serialize};
use crate::jvm::{ConstantsPool, Error, FieldAccessFlags, MethodAccessFlags, Utf8ConstantIndex};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5
#[derive(Debug, Clone)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

macro_rules! member_format {
    ($member:ident) => {
        impl $member {
            pub fn read<R: ReadBytesExt>(
                reader: &mut R,
                constants: &ConstantsPool,
            ) -> Result<$member, Error> {
                let access_flags = Deserialize::deserialize(reader)?;
                let name_index = constants.utf8_index(u16::deserialize(reader)?)?;
                let descriptor_index = constants.utf8_index(u16::deserialize(reader)?)?;
                let attributes = Attribute::read_all(reader, constants)?;
                Ok($member {
                    access_flags,
                    name_index,
                    descriptor_index,
                    attributes,
                })
            }
        }

        impl Serialize for $member {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.access_flags.serialize(writer)?;
                self.name_index.serialize(writer)?;
                self.descriptor_index.serialize(writer)?;
                self.attributes.serialize(writer)?;
                Ok(())
            }
        }
    };
}

member_format!(Field);
member_format!(Method);
