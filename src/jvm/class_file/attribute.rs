use crate::jvm::class_file::{read_bytes, Deserialize, Serialize};
use crate::jvm::{ClassConstantIndex, ConstantIndex, ConstantsPool, Error, Utf8ConstantIndex};
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Attributes are kept as raw bytes unless something needs to look inside them, so attributes
/// this crate knows nothing about survive a read/write cycle untouched.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Read one attribute, checking that its name is a UTF-8 constant
    pub fn read<R: ReadBytesExt>(
        reader: &mut R,
        constants: &ConstantsPool,
    ) -> Result<Attribute, Error> {
        let name_index = constants.utf8_index(u16::deserialize(reader)?)?;
        let len = u32::deserialize(reader)? as usize;
        let info = read_bytes(reader, len)?;
        Ok(Attribute { name_index, info })
    }

    /// Read a `u16`-counted list of attributes
    pub fn read_all<R: ReadBytesExt>(
        reader: &mut R,
        constants: &ConstantsPool,
    ) -> Result<Vec<Attribute>, Error> {
        let count = u16::deserialize(reader)?;
        (0..count)
            .map(|_| Attribute::read(reader, constants))
            .collect()
    }

    pub fn name<'a>(&self, constants: &'a ConstantsPool) -> Result<&'a str, Error> {
        constants.utf8(self.name_index)
    }

    pub fn is<A: AttributeLike>(&self, constants: &ConstantsPool) -> bool {
        matches!(self.name(constants), Ok(name) if name == A::NAME)
    }

    /// Decode the attribute body, rejecting bodies with leftover bytes
    pub fn decode<A: AttributeLike>(&self, constants: &ConstantsPool) -> Result<A, Error> {
        let mut cursor = Cursor::new(&self.info[..]);
        let attribute = A::read_info(&mut cursor, constants)?;
        if (cursor.position() as usize) != self.info.len() {
            return Err(Error::MalformedAttribute {
                name: A::NAME,
                reason: format!(
                    "{} trailing bytes",
                    self.info.len() - cursor.position() as usize
                ),
            });
        }
        Ok(attribute)
    }

    /// Find and decode the first attribute of a given kind
    pub fn find<A: AttributeLike>(
        attributes: &[Attribute],
        constants: &ConstantsPool,
    ) -> Result<Option<A>, Error> {
        attributes
            .iter()
            .find(|attr| attr.is::<A>(constants))
            .map(|attr| attr.decode(constants))
            .transpose()
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes and read back out of them.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;

    /// Parse the attribute body (everything after the length)
    fn read_info<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error>;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.2
#[derive(Debug, Clone, Copy)]
pub struct ConstantValue(pub ConstantIndex);

impl Serialize for ConstantValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl AttributeLike for ConstantValue {
    const NAME: &'static str = "ConstantValue";

    fn read_info<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error> {
        Ok(ConstantValue(constants.loadable_index(u16::deserialize(reader)?)?))
    }
}

/// Exceptions declared by a method
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.5
#[derive(Debug, Clone)]
pub struct Exceptions(pub Vec<ClassConstantIndex>);

impl Serialize for Exceptions {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl AttributeLike for Exceptions {
    const NAME: &'static str = "Exceptions";

    fn read_info<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error> {
        let count = u16::deserialize(reader)?;
        let classes = (0..count)
            .map(|_| constants.class_index(u16::deserialize(reader)?))
            .collect::<Result<_, _>>()?;
        Ok(Exceptions(classes))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";

    fn read_info<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error> {
        let max_stack = u16::deserialize(reader)?;
        let max_locals = u16::deserialize(reader)?;
        let code_len = u32::deserialize(reader)? as usize;
        let code_array = BytecodeArray(read_bytes(reader, code_len)?);
        let handler_count = u16::deserialize(reader)?;
        let exception_table = (0..handler_count)
            .map(|_| ExceptionHandler::read(reader, constants))
            .collect::<Result<_, _>>()?;
        let attributes = Attribute::read_all(reader, constants)?;
        Ok(Code {
            max_stack,
            max_locals,
            code_array,
            exception_table,
            attributes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: BytecodeIndex,

    /// End of exception handler range (exclusive)
    pub end_pc: BytecodeIndex,

    /// Start of the exception handler
    pub handler_pc: BytecodeIndex,

    /// Exception class caught (`None` catches everything, as for `finally`)
    pub catch_type: Option<ClassConstantIndex>,
}

impl ExceptionHandler {
    fn read<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error> {
        let start_pc = BytecodeIndex(u16::deserialize(reader)?);
        let end_pc = BytecodeIndex(u16::deserialize(reader)?);
        let handler_pc = BytecodeIndex(u16::deserialize(reader)?);
        let catch_type = match u16::deserialize(reader)? {
            0 => None,
            idx => Some(constants.class_index(idx)?),
        };
        Ok(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        })
    }
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        match self.catch_type {
            None => 0u16.serialize(writer)?,
            Some(class) => class.serialize(writer)?,
        }
        Ok(())
    }
}

/// Encoded bytecode instructions
#[derive(Debug, Clone)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

/// Index into `BytecodeArray`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone)]
pub struct LineNumberTable(pub Vec<LineNumber>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: BytecodeIndex,
    pub line_number: u16,
}

impl Serialize for LineNumberTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.0.len() as u16).serialize(writer)?;
        for entry in &self.0 {
            entry.start_pc.serialize(writer)?;
            entry.line_number.serialize(writer)?;
        }
        Ok(())
    }
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";

    fn read_info<R: ReadBytesExt>(reader: &mut R, _: &ConstantsPool) -> Result<Self, Error> {
        let count = u16::deserialize(reader)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(LineNumber {
                start_pc: BytecodeIndex(u16::deserialize(reader)?),
                line_number: u16::deserialize(reader)?,
            });
        }
        Ok(LineNumberTable(entries))
    }
}

/// Entry in either the `LocalVariableTable` or the `LocalVariableTypeTable` (the last field is
/// a descriptor in the first and a generic signature in the second)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: BytecodeIndex,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

impl LocalVariable {
    fn read_table<R: ReadBytesExt>(
        reader: &mut R,
        constants: &ConstantsPool,
    ) -> Result<Vec<LocalVariable>, Error> {
        let count = u16::deserialize(reader)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(LocalVariable {
                start_pc: BytecodeIndex(u16::deserialize(reader)?),
                length: u16::deserialize(reader)?,
                name_index: constants.utf8_index(u16::deserialize(reader)?)?,
                descriptor_index: constants.utf8_index(u16::deserialize(reader)?)?,
                index: u16::deserialize(reader)?,
            });
        }
        Ok(entries)
    }
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)?;
        Ok(())
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, Clone)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

impl Serialize for LocalVariableTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl AttributeLike for LocalVariableTable {
    const NAME: &'static str = "LocalVariableTable";

    fn read_info<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error> {
        Ok(LocalVariableTable(LocalVariable::read_table(reader, constants)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.14
#[derive(Debug, Clone)]
pub struct LocalVariableTypeTable(pub Vec<LocalVariable>);

impl Serialize for LocalVariableTypeTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl AttributeLike for LocalVariableTypeTable {
    const NAME: &'static str = "LocalVariableTypeTable";

    fn read_info<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error> {
        Ok(LocalVariableTypeTable(LocalVariable::read_table(
            reader, constants,
        )?))
    }
}

/// These types are from [this hierarchy][0]
///
/// The class parameter is a constant index in the class file and a class name once decoded
/// into a method body. The uninitialized parameter is the offset of the `new` instruction in
/// the class file and a label in a method body.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called by `<init>` has not been called
    Uninitialized(U),
}

impl<Cls, U> VerificationType<Cls, U> {
    pub fn map<Cls2, U2, E>(
        &self,
        map_class: impl Fn(&Cls) -> Result<Cls2, E>,
        map_uninitialized: impl Fn(&U) -> Result<U2, E>,
    ) -> Result<VerificationType<Cls2, U2>, E> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)?),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit)?)
            }
        })
    }
}

impl<Cls, A> Width for VerificationType<Cls, A> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

/// Verification type as it appears in a `StackMapTable`
pub type RawVerificationType = VerificationType<ClassConstantIndex, u16>;

impl Serialize for RawVerificationType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl RawVerificationType {
    fn read<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error> {
        let verification_type = match u8::deserialize(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(constants.class_index(u16::deserialize(reader)?)?),
            8 => VerificationType::Uninitialized(u16::deserialize(reader)?),
            tag => {
                return Err(Error::MalformedAttribute {
                    name: StackMapTable::NAME,
                    reason: format!("verification type tag {}", tag),
                })
            }
        };
        Ok(verification_type)
    }

    fn read_list<R: ReadBytesExt>(
        count: usize,
        reader: &mut R,
        constants: &ConstantsPool,
    ) -> Result<Vec<Self>, Error> {
        (0..count)
            .map(|_| RawVerificationType::read(reader, constants))
            .collect()
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";

    fn read_info<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error> {
        let count = u16::deserialize(reader)?;
        let frames = (0..count)
            .map(|_| StackMapFrame::read(reader, constants))
            .collect::<Result<_, _>>()?;
        Ok(StackMapTable(frames))
    }
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

#[derive(Debug, Clone)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: RawVerificationType,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<RawVerificationType>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<RawVerificationType>,
        stack: Vec<RawVerificationType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    fn read<R: ReadBytesExt>(reader: &mut R, constants: &ConstantsPool) -> Result<Self, Error> {
        let frame = match u8::deserialize(reader)? {
            tag @ 0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            tag @ 64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: (tag - 64) as u16,
                stack: RawVerificationType::read(reader, constants)?,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: u16::deserialize(reader)?,
                stack: RawVerificationType::read(reader, constants)?,
            },
            tag @ 248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
            },
            tag @ 252..=254 => {
                let offset_delta = u16::deserialize(reader)?;
                let locals =
                    RawVerificationType::read_list((tag - 251) as usize, reader, constants)?;
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => {
                let offset_delta = u16::deserialize(reader)?;
                let local_count = u16::deserialize(reader)? as usize;
                let locals = RawVerificationType::read_list(local_count, reader, constants)?;
                let stack_count = u16::deserialize(reader)? as usize;
                let stack = RawVerificationType::read_list(stack_count, reader, constants)?;
                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
            tag => {
                return Err(Error::MalformedAttribute {
                    name: StackMapTable::NAME,
                    reason: format!("reserved frame type {}", tag),
                })
            }
        };
        Ok(frame)
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}
