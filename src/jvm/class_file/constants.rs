use crate::jvm::class_file::{Attribute, AttributeLike, Deserialize, Serialize};
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::result::Result;

/// Class file constants pool
///
/// The pool is append only: entries read from an existing class file keep their indices, and
/// new entries are only ever pushed at the end. Every `get_*` method is a get-or-insert, so
/// asking twice for the same symbolic reference yields the same index.
#[derive(Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    fieldrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    methodrefs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    utf8s: HashMap<String, Utf8ConstantIndex>,
}

/// Resolved field or method reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_interface: bool,
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::starting_at(Offset(1)),
            classes: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            name_and_types: HashMap::new(),
            utf8s: HashMap::new(),
        }
    }

    /// Number of slots used, including the unusable slot 0 (this is the `constant_pool_count`)
    pub fn count(&self) -> u16 {
        self.constants.next_offset().0 as u16
    }

    /// Iterate over the constants and their indices
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.constants.next_offset().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }
        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Record a constant in the dedup tables (first occurrence wins)
    fn index_constant(&mut self, index: ConstantIndex, constant: &Constant) {
        match constant {
            Constant::Utf8(string) => {
                self.utf8s
                    .entry(string.clone())
                    .or_insert(Utf8ConstantIndex(index));
            }
            Constant::Class(name) => {
                self.classes.entry(*name).or_insert(ClassConstantIndex(index));
            }
            Constant::String(utf8) => {
                self.strings.entry(*utf8).or_insert(StringConstantIndex(index));
            }
            Constant::Integer(i) => {
                self.integers.entry(*i).or_insert(index);
            }
            Constant::Float(f) => {
                self.floats.entry(f.to_bits()).or_insert(index);
            }
            Constant::Long(l) => {
                self.longs.entry(*l).or_insert(index);
            }
            Constant::Double(d) => {
                self.doubles.entry(d.to_bits()).or_insert(index);
            }
            Constant::NameAndType { name, descriptor } => {
                self.name_and_types
                    .entry((*name, *descriptor))
                    .or_insert(NameAndTypeConstantIndex(index));
            }
            Constant::FieldRef(class, name_and_type) => {
                self.fieldrefs
                    .entry((*class, *name_and_type))
                    .or_insert(FieldRefConstantIndex(index));
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                self.methodrefs
                    .entry((*class, *name_and_type, *is_interface))
                    .or_insert(MethodRefConstantIndex(index));
            }
            _ => (),
        }
    }

    /// Get a constant by index
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        self.constants
            .get(Offset(index.0 as usize))
            .ok_or(Error::BadConstantIndex(index.0))
    }

    fn unexpected(index: ConstantIndex, expected: &'static str) -> Error {
        Error::UnexpectedConstant {
            index: index.0,
            expected,
        }
    }

    /// Look up a UTF-8 constant
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Utf8(string) => Ok(string),
            Constant::RawUtf8(_) => Err(Error::BadModifiedUtf8 { index: index.0 .0 }),
            _ => Err(Self::unexpected(index.0, "Utf8")),
        }
    }

    /// Look up the binary name of a class constant (arrays come back as descriptors)
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(Self::unexpected(index.0, "Class")),
        }
    }

    /// Look up the string value of a string constant
    pub fn string(&self, index: ConstantIndex) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::String(utf8) => self.utf8(*utf8),
            _ => Err(Self::unexpected(index, "String")),
        }
    }

    /// Look up the name and descriptor of a name & type constant
    pub fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.get(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Self::unexpected(index.0, "NameAndType")),
        }
    }

    /// Resolve a field reference, method reference, or interface method reference
    pub fn member_ref(&self, index: ConstantIndex) -> Result<MemberRef<'_>, Error> {
        let (class, name_and_type, is_interface) = match self.get(index)? {
            Constant::FieldRef(class, name_and_type) => (*class, *name_and_type, false),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => (*class, *name_and_type, *is_interface),
            _ => return Err(Self::unexpected(index, "FieldRef or MethodRef")),
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            class: self.class_name(class)?,
            name,
            descriptor,
            is_interface,
        })
    }

    /// Method descriptor of an `invokedynamic` call site
    pub fn invoke_dynamic_descriptor(
        &self,
        index: InvokeDynamicConstantIndex,
    ) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::InvokeDynamic {
                method_descriptor, ..
            } => Ok(self.name_and_type(*method_descriptor)?.1),
            _ => Err(Self::unexpected(index.0, "InvokeDynamic")),
        }
    }

    /// Check that an index read from a class file points to a UTF-8 constant
    pub fn utf8_index(&self, index: u16) -> Result<Utf8ConstantIndex, Error> {
        let index = ConstantIndex(index);
        match self.get(index)? {
            Constant::Utf8(_) | Constant::RawUtf8(_) => Ok(Utf8ConstantIndex(index)),
            _ => Err(Self::unexpected(index, "Utf8")),
        }
    }

    /// Check that an index read from a class file points to a class constant
    pub fn class_index(&self, index: u16) -> Result<ClassConstantIndex, Error> {
        let index = ConstantIndex(index);
        match self.get(index)? {
            Constant::Class(_) => Ok(ClassConstantIndex(index)),
            _ => Err(Self::unexpected(index, "Class")),
        }
    }

    /// Check that an index read from a class file points to a field reference
    pub fn field_ref_index(&self, index: u16) -> Result<FieldRefConstantIndex, Error> {
        let index = ConstantIndex(index);
        match self.get(index)? {
            Constant::FieldRef(..) => Ok(FieldRefConstantIndex(index)),
            _ => Err(Self::unexpected(index, "FieldRef")),
        }
    }

    /// Check that an index read from a class file points to a method reference
    pub fn method_ref_index(&self, index: u16) -> Result<MethodRefConstantIndex, Error> {
        let index = ConstantIndex(index);
        match self.get(index)? {
            Constant::MethodRef { .. } => Ok(MethodRefConstantIndex(index)),
            _ => Err(Self::unexpected(index, "MethodRef")),
        }
    }

    /// Check that an index read from a class file points to a dynamic call site
    pub fn invoke_dynamic_index(&self, index: u16) -> Result<InvokeDynamicConstantIndex, Error> {
        let index = ConstantIndex(index);
        match self.get(index)? {
            Constant::InvokeDynamic { .. } => Ok(InvokeDynamicConstantIndex(index)),
            _ => Err(Self::unexpected(index, "InvokeDynamic")),
        }
    }

    /// Check that an index read from a class file points to something `ldc` can load
    pub fn loadable_index(&self, index: u16) -> Result<ConstantIndex, Error> {
        let index = ConstantIndex(index);
        if self.get(index)?.is_loadable() {
            Ok(index)
        } else {
            Err(Self::unexpected(index, "loadable constant"))
        }
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, Error> {
        let cow = utf8.into();

        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            Ok(*idx)
        } else {
            let owned = cow.into_owned();
            let constant = Constant::Utf8(owned.clone());
            let idx = Utf8ConstantIndex(self.push_constant(constant)?);
            self.utf8s.insert(owned, idx);
            Ok(idx)
        }
    }

    /// Get or insert a class constant (`name` is a binary name or an array descriptor)
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        if let Some(idx) = self.classes.get(&name) {
            Ok(*idx)
        } else {
            let idx = ClassConstantIndex(self.push_constant(Constant::Class(name))?);
            self.classes.insert(name, idx);
            Ok(idx)
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(&mut self, string: &str) -> Result<StringConstantIndex, Error> {
        let utf8 = self.get_utf8(string)?;
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            let idx = StringConstantIndex(self.push_constant(Constant::String(utf8))?);
            self.strings.insert(utf8, idx);
            Ok(idx)
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        let key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
            self.name_and_types.insert(key, idx);
            Ok(idx)
        }
    }

    /// Get or insert a `CONSTANT_Fieldref_info`
    pub fn get_field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRefConstantIndex, Error> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        let key = (class, name_and_type);
        if let Some(idx) = self.fieldrefs.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::FieldRef(class, name_and_type);
            let idx = FieldRefConstantIndex(self.push_constant(constant)?);
            self.fieldrefs.insert(key, idx);
            Ok(idx)
        }
    }

    /// Get or insert a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    pub fn get_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, Error> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        let key = (class, name_and_type, is_interface);
        if let Some(idx) = self.methodrefs.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            };
            let idx = MethodRefConstantIndex(self.push_constant(constant)?);
            self.methodrefs.insert(key, idx);
            Ok(idx)
        }
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.integers.get(&integer) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Integer(integer))?;
        self.integers.insert(integer, idx);
        Ok(idx)
    }

    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.floats.get(&float.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Float(float))?;
        self.floats.insert(float.to_bits(), idx);
        Ok(idx)
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.longs.get(&long) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Long(long))?;
        self.longs.insert(long, idx);
        Ok(idx)
    }

    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.doubles.get(&double.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Double(double))?;
        self.doubles.insert(double.to_bits(), idx);
        Ok(idx)
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        attribute.serialize(&mut info)?;

        Ok(Attribute { name_index, info })
    }
}

impl Serialize for ConstantsPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.count().serialize(writer)?;
        for (_, constant) in self.constants.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ConstantsPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::deserialize(reader)? as usize;
        let mut pool = ConstantsPool::new();
        while pool.constants.next_offset().0 < count {
            let index = ConstantIndex(pool.constants.next_offset().0 as u16);
            let constant = Constant::read(index, reader)?;
            pool.index_constant(index, &constant);
            pool.constants.push(constant);
        }
        if pool.constants.next_offset().0 != count {
            return Err(Error::BadConstantIndex(count as u16));
        }
        Ok(pool)
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Modified UTF-8 bytes that don't decode to a Rust string (eg. unpaired surrogates)
    ///
    /// These are kept byte for byte so that they round trip.
    RawUtf8(Vec<u8>),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Can this constant be pushed with `ldc`, `ldc_w`, or `ldc2_w`?
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::Class(_)
                | Constant::String(_)
                | Constant::MethodHandle { .. }
                | Constant::MethodType { .. }
                | Constant::Dynamic { .. }
        )
    }

    fn read<R: ReadBytesExt>(index: ConstantIndex, reader: &mut R) -> Result<Constant, Error> {
        fn idx<R: ReadBytesExt>(reader: &mut R) -> Result<ConstantIndex, Error> {
            Ok(ConstantIndex(u16::deserialize(reader)?))
        }

        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)? as usize;
                let bytes = super::read_bytes(reader, len)?;
                match decode_modified_utf8(&bytes) {
                    Some(string) => Constant::Utf8(string),
                    None => Constant::RawUtf8(bytes),
                }
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex(idx(reader)?)),
            8 => Constant::String(Utf8ConstantIndex(idx(reader)?)),
            9 => Constant::FieldRef(
                ClassConstantIndex(idx(reader)?),
                NameAndTypeConstantIndex(idx(reader)?),
            ),
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex(idx(reader)?),
                name_and_type: NameAndTypeConstantIndex(idx(reader)?),
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex(idx(reader)?),
                descriptor: Utf8ConstantIndex(idx(reader)?),
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: idx(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex(idx(reader)?),
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex(idx(reader)?),
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex(idx(reader)?),
            },
            19 => Constant::Module(Utf8ConstantIndex(idx(reader)?)),
            20 => Constant::Package(Utf8ConstantIndex(idx(reader)?)),
            _ => {
                return Err(Error::BadConstantTag {
                    index: index.0,
                    tag,
                })
            }
        };
        Ok(constant)
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::RawUtf8(bytes) => {
                1u8.serialize(writer)?;
                (bytes.len() as u16).serialize(writer)?;
                writer.write_all(bytes)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        let code: u32 = c as u32;
        if code == 0 || (0x80..0x800).contains(&code) {
            buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
            buffer.push((code & 0x3F) as u8 | 0b1000_0000);
        } else if code < 0x80 {
            buffer.push(code as u8);
        } else if code < 0x10000 {
            push_three_byte_unit(&mut buffer, code);
        } else {
            let shifted = code - 0x10000;
            push_three_byte_unit(&mut buffer, 0xD800 | (shifted >> 10));
            push_three_byte_unit(&mut buffer, 0xDC00 | (shifted & 0x3FF));
        }
    }
    buffer
}

fn push_three_byte_unit(buffer: &mut Vec<u8>, unit: u32) {
    buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
    buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
    buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
}

/// Decode modified UTF-8, returning `None` if the bytes are not well formed or encode unpaired
/// surrogates
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u32;
        let continuation = |at: usize| -> Option<u32> {
            bytes
                .get(at)
                .filter(|b| *b & 0b1100_0000 == 0b1000_0000)
                .map(|b| (*b & 0x3F) as u32)
        };
        if b0 == 0 {
            return None;
        } else if b0 < 0x80 {
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0b1110_0000 == 0b1100_0000 {
            let b1 = continuation(i + 1)?;
            units.push((((b0 & 0x1F) << 6) | b1) as u16);
            i += 2;
        } else if b0 & 0b1111_0000 == 0b1110_0000 {
            let b1 = continuation(i + 1)?;
            let b2 = continuation(i + 2)?;
            units.push((((b0 & 0x0F) << 12) | (b1 << 6) | b2) as u16);
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}


/// Long and double constants take two pool entries; the entry after them is unusable
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

macro_rules! typed_index {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
        pub struct $name(pub(crate) ConstantIndex);

        impl From<$name> for ConstantIndex {
            fn from(index: $name) -> ConstantIndex {
                index.0
            }
        }

        impl Serialize for $name {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.0.serialize(writer)
            }
        }
    };
}

typed_index!(Utf8ConstantIndex);
typed_index!(StringConstantIndex);
typed_index!(NameAndTypeConstantIndex);
typed_index!(
    /// Index of a class constant (or of an array type)
    ClassConstantIndex
);
typed_index!(FieldRefConstantIndex);
typed_index!(
    /// Index of a method or interface method reference
    MethodRefConstantIndex
);
typed_index!(InvokeDynamicConstantIndex);

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let kind = match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                return Err(Error::MalformedAttribute {
                    name: "CONSTANT_MethodHandle",
                    reason: format!("reference kind {}", other),
                })
            }
        };
        Ok(kind)
    }
}
