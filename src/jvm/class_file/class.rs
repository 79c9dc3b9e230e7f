use crate::jvm::class_file::{
    Attribute, ConstantsPool, Deserialize, Field, Method, Serialize, Version,
};
use crate::jvm::{ClassAccessFlags, ClassConstantIndex, Error};
use byteorder::WriteBytesExt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` (and `module-info`) have no superclass
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a complete class file
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = Cursor::new(bytes);

        let magic = u32::deserialize(&mut reader)?;
        if magic.to_be_bytes() != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::deserialize(&mut reader)?;
        let constants = ConstantsPool::deserialize(&mut reader)?;
        let access_flags = ClassAccessFlags::deserialize(&mut reader)?;
        let this_class = constants.class_index(u16::deserialize(&mut reader)?)?;
        let super_class = match u16::deserialize(&mut reader)? {
            0 => None,
            idx => Some(constants.class_index(idx)?),
        };

        let interface_count = u16::deserialize(&mut reader)?;
        let interfaces = (0..interface_count)
            .map(|_| constants.class_index(u16::deserialize(&mut reader)?))
            .collect::<Result<_, _>>()?;
        let field_count = u16::deserialize(&mut reader)?;
        let fields = (0..field_count)
            .map(|_| Field::read(&mut reader, &constants))
            .collect::<Result<_, _>>()?;
        let method_count = u16::deserialize(&mut reader)?;
        let methods = (0..method_count)
            .map(|_| Method::read(&mut reader, &constants))
            .collect::<Result<_, _>>()?;
        let attributes = Attribute::read_all(&mut reader, &constants)?;

        let leftover = bytes.len() - reader.position() as usize;
        if leftover != 0 {
            return Err(Error::TrailingBytes(leftover));
        }

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serialize into a fresh buffer
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut class_file = fs::File::create(path)?;
        self.serialize(&mut class_file)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            None => 0u16.serialize(writer)?,
            Some(super_class) => super_class.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
