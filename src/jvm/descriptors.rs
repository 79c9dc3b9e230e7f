use super::{BinaryName, Error};
use crate::util::Width;
use std::fmt::Display;
use std::iter::Peekable;
use std::str::Chars;

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    fn from_descriptor_char(c: char) -> Option<BaseType> {
        Some(match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        })
    }

    /// Character standing for the type in descriptors
    pub const fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    /// Java keyword for the type, which is also its reflection name
    pub const fn keyword(self) -> &'static str {
        match self {
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Short => "short",
            BaseType::Boolean => "boolean",
        }
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    ObjectArray(ArrayType<BinaryName>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Array type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }
}

impl RefType {
    /// Name to put in a `CONSTANT_Class_info` for this type
    ///
    /// Objects use their binary name while arrays use their full descriptor.
    pub fn class_constant_name(&self) -> String {
        match self {
            RefType::Object(name) => name.as_str().to_owned(),
            RefType::ObjectArray(_) | RefType::PrimitiveArray(_) => {
                let mut descriptor = String::new();
                self.write_descriptor(&mut descriptor);
                descriptor
            }
        }
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            RefType::Object(name) => {
                out.push('L');
                out.push_str(name.as_str());
                out.push(';');
            }
            RefType::ObjectArray(array) => {
                out.push_str(&"[".repeat(array.dimensions()));
                out.push('L');
                out.push_str(array.element_type.as_str());
                out.push(';');
            }
            RefType::PrimitiveArray(array) => {
                out.push_str(&"[".repeat(array.dimensions()));
                out.push(array.element_type.descriptor_char());
            }
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl FieldType {
    pub const fn object(class_name: BinaryName) -> FieldType {
        FieldType::Ref(RefType::Object(class_name))
    }

    /// Array whose elements have the given type
    pub fn array(element: FieldType) -> FieldType {
        FieldType::Ref(match element {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(array)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: array.additional_dimensions + 1,
                element_type: array.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(array)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: array.additional_dimensions + 1,
                element_type: array.element_type,
            }),
        })
    }

    /// Field descriptor (`I`, `[Ljava/lang/String;`)
    pub fn descriptor(&self) -> String {
        match self {
            FieldType::Base(base_type) => base_type.descriptor_char().to_string(),
            FieldType::Ref(reference) => {
                let mut descriptor = String::new();
                reference.write_descriptor(&mut descriptor);
                descriptor
            }
        }
    }

    /// Class constant name, if the type has one (primitives don't)
    pub fn class_constant_name(&self) -> Option<String> {
        match self {
            FieldType::Base(_) => None,
            FieldType::Ref(reference) => Some(reference.class_constant_name()),
        }
    }

    /// Name reflection reports for the type (`int`, `java.lang.String`, `[Ljava.lang.String;`)
    pub fn reflection_name(&self) -> String {
        match self {
            FieldType::Base(base_type) => base_type.keyword().to_owned(),
            FieldType::Ref(RefType::Object(name)) => name.to_dotted(),
            FieldType::Ref(array) => array.class_constant_name().replace('/', "."),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,

    /// `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Local slots taken by the parameters (and `this`, if there is one)
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this = if has_this_param { 1 } else { 0 };
        this + self.parameters.iter().map(|parameter| parameter.width()).sum::<usize>()
    }

    /// Number of stack slots taken by the return value
    pub fn return_width(&self) -> usize {
        self.return_type.as_ref().map_or(0, |typ| typ.width())
    }
}

/// Reads descriptors one character at a time
struct DescriptorReader<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl<'a> DescriptorReader<'a> {
    fn new(source: &'a str) -> DescriptorReader<'a> {
        DescriptorReader {
            source,
            chars: source.chars().peekable(),
        }
    }

    fn error(&self, message: impl Display) -> Error {
        Error::BadDescriptor(format!("{}: {}", self.source, message))
    }

    fn field_type(&mut self) -> Result<FieldType, Error> {
        match self.chars.next() {
            Some('L') => self.class_name().map(FieldType::object),
            Some('[') => self.field_type().map(FieldType::array),
            Some(c) => BaseType::from_descriptor_char(c)
                .map(FieldType::Base)
                .ok_or_else(|| self.error(format!("invalid type character '{}'", c))),
            None => Err(self.error("missing field type")),
        }
    }

    fn class_name(&mut self) -> Result<BinaryName, Error> {
        let mut name = String::new();
        loop {
            match self.chars.next() {
                Some(';') => break,
                Some(c) => name.push(c),
                None => return Err(self.error(format!("missing terminator for 'L{}'", name))),
            }
        }
        BinaryName::from_internal(name).map_err(|msg| self.error(msg))
    }

    fn method(&mut self) -> Result<MethodDescriptor, Error> {
        if self.chars.next() != Some('(') {
            return Err(self.error("expected '(' for method"));
        }
        let mut parameters = vec![];
        while self.chars.next_if_eq(&')').is_none() {
            parameters.push(self.field_type()?);
        }
        let return_type = if self.chars.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(self.field_type()?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    fn finish<T>(mut self, parsed: T) -> Result<T, Error> {
        match self.chars.next() {
            None => Ok(parsed),
            Some(c) => Err(self.error(format!("unexpected leftover input '{}'", c))),
        }
    }
}

/// Parse a field descriptor (`I`, `Ljava/lang/String;`, `[[J`)
pub fn parse_field_descriptor(descriptor: &str) -> Result<FieldType, Error> {
    let mut reader = DescriptorReader::new(descriptor);
    let field_type = reader.field_type()?;
    reader.finish(field_type)
}

/// Parse a method descriptor (`(ILjava/lang/String;)V`)
pub fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor, Error> {
    let mut reader = DescriptorReader::new(descriptor);
    let method = reader.method()?;
    reader.finish(method)
}
