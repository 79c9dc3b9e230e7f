use super::source::{ReflectedField, ReflectedMethod, SourceField, SourceMethod};
use super::TypeName;
use crate::jvm::model::{FieldInfo, MethodInfo};
use crate::jvm::{
    parse_field_descriptor, parse_method_descriptor, ConstantsPool, Error, FieldAccessFlags,
    MethodAccessFlags,
};
use std::fmt;

/// Method modifiers that survive into metadata (the ones a source declaration can express)
const METHOD_MODIFIERS: MethodAccessFlags = MethodAccessFlags::from_bits_truncate(
    MethodAccessFlags::PUBLIC.bits()
        | MethodAccessFlags::PRIVATE.bits()
        | MethodAccessFlags::PROTECTED.bits()
        | MethodAccessFlags::STATIC.bits()
        | MethodAccessFlags::FINAL.bits()
        | MethodAccessFlags::SYNCHRONIZED.bits()
        | MethodAccessFlags::NATIVE.bits()
        | MethodAccessFlags::ABSTRACT.bits()
        | MethodAccessFlags::STRICT.bits(),
);

const FIELD_MODIFIERS: FieldAccessFlags = FieldAccessFlags::from_bits_truncate(
    FieldAccessFlags::PUBLIC.bits()
        | FieldAccessFlags::PRIVATE.bits()
        | FieldAccessFlags::PROTECTED.bits()
        | FieldAccessFlags::STATIC.bits()
        | FieldAccessFlags::FINAL.bits()
        | FieldAccessFlags::VOLATILE.bits()
        | FieldAccessFlags::TRANSIENT.bits(),
);

/// Signature snapshot of a method, independent of where it was read from
///
/// Constructors are always named `<init>` and return `void`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodMetaData {
    name: String,
    return_type: TypeName,
    parameter_types: Vec<TypeName>,
    exception_types: Vec<TypeName>,
    modifiers: MethodAccessFlags,
}

impl MethodMetaData {
    pub fn new(
        name: impl Into<String>,
        return_type: TypeName,
        parameter_types: Vec<TypeName>,
        exception_types: Vec<TypeName>,
        modifiers: MethodAccessFlags,
    ) -> MethodMetaData {
        let name = name.into();
        let return_type = if name == "<init>" {
            TypeName::void()
        } else {
            return_type
        };
        MethodMetaData {
            name,
            return_type,
            parameter_types,
            exception_types,
            modifiers: modifiers & METHOD_MODIFIERS,
        }
    }

    /// From a method of a compiled class
    pub fn from_method(
        method: &MethodInfo,
        constants: &ConstantsPool,
    ) -> Result<MethodMetaData, Error> {
        let exceptions = method
            .exceptions(constants)?
            .iter()
            .map(|class| TypeName::new(class.replace('/', "."), 0))
            .collect();
        let mut metadata = MethodMetaData::from_descriptor(
            method.name(),
            method.descriptor(),
            method.access_flags,
        )?;
        metadata.exception_types = exceptions;
        Ok(metadata)
    }

    /// From a name and descriptor alone, as seen at a call site
    pub fn from_descriptor(
        name: &str,
        descriptor: &str,
        modifiers: MethodAccessFlags,
    ) -> Result<MethodMetaData, Error> {
        let descriptor = parse_method_descriptor(descriptor)?;
        Ok(MethodMetaData::new(
            name,
            TypeName::from_return_type(&descriptor),
            descriptor
                .parameters
                .iter()
                .map(TypeName::from_field_type)
                .collect(),
            vec![],
            modifiers,
        ))
    }

    /// From a parsed source declaration
    pub fn from_source(method: &SourceMethod) -> Result<MethodMetaData, String> {
        let name = if method.is_constructor {
            "<init>"
        } else {
            method.name.as_str()
        };
        let context = |err: String| format!("{} in method '{}'", err, method.name);
        let return_type = match &method.return_type {
            Some(typ) if !method.is_constructor => TypeName::from_source(typ).map_err(context)?,
            _ => TypeName::void(),
        };
        Ok(MethodMetaData::new(
            name,
            return_type,
            parse_all(&method.parameter_types, TypeName::from_source).map_err(context)?,
            parse_all(&method.exception_types, TypeName::from_source).map_err(context)?,
            super::source::method_modifiers(&method.modifiers).map_err(context)?,
        ))
    }

    /// From a reflected method or constructor
    pub fn from_reflection(method: &ReflectedMethod) -> Result<MethodMetaData, String> {
        let name = if method.is_constructor {
            "<init>"
        } else {
            method.name.as_str()
        };
        let context = |err: String| format!("{} in method '{}'", err, method.name);
        let return_type = if method.is_constructor {
            TypeName::void()
        } else {
            TypeName::from_reflection(&method.return_type).map_err(context)?
        };
        Ok(MethodMetaData::new(
            name,
            return_type,
            parse_all(&method.parameter_types, TypeName::from_reflection).map_err(context)?,
            parse_all(&method.exception_types, TypeName::from_reflection).map_err(context)?,
            MethodAccessFlags::from_bits_truncate(method.modifiers),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> &TypeName {
        &self.return_type
    }

    pub fn parameter_types(&self) -> &[TypeName] {
        &self.parameter_types
    }

    pub fn exception_types(&self) -> &[TypeName] {
        &self.exception_types
    }

    pub fn modifiers(&self) -> MethodAccessFlags {
        self.modifiers
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// JVM descriptor rebuilt from the types
    pub fn descriptor(&self) -> String {
        let mut descriptor = String::from("(");
        for parameter in &self.parameter_types {
            descriptor.extend(parameter.descriptor());
        }
        descriptor.push(')');
        descriptor.push_str(self.return_type.descriptor().as_deref().unwrap_or("V"));
        descriptor
    }

    /// Source-like signature, for instance `void foo(int,java.lang.String)`
    pub fn signature(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for MethodMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (idx, parameter) in self.parameter_types.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", parameter)?;
        }
        f.write_str(")")
    }
}

/// Signature snapshot of a field
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldMetaData {
    name: String,
    field_type: TypeName,
    modifiers: FieldAccessFlags,
}

impl FieldMetaData {
    pub fn new(name: impl Into<String>, field_type: TypeName, modifiers: FieldAccessFlags) -> Self {
        FieldMetaData {
            name: name.into(),
            field_type,
            modifiers: modifiers & FIELD_MODIFIERS,
        }
    }

    pub fn from_field(field: &FieldInfo) -> Result<FieldMetaData, Error> {
        FieldMetaData::from_descriptor(field.name(), field.descriptor(), field.access_flags)
    }

    pub fn from_descriptor(
        name: &str,
        descriptor: &str,
        modifiers: FieldAccessFlags,
    ) -> Result<FieldMetaData, Error> {
        let field_type = parse_field_descriptor(descriptor)?;
        Ok(FieldMetaData::new(
            name,
            TypeName::from_field_type(&field_type),
            modifiers,
        ))
    }

    pub fn from_source(field: &SourceField) -> Result<FieldMetaData, String> {
        let context = |err: String| format!("{} in field '{}'", err, field.name);
        Ok(FieldMetaData::new(
            field.name.as_str(),
            TypeName::from_source(&field.field_type).map_err(context)?,
            super::source::field_modifiers(&field.modifiers).map_err(context)?,
        ))
    }

    pub fn from_reflection(field: &ReflectedField) -> Result<FieldMetaData, String> {
        let context = |err: String| format!("{} in field '{}'", err, field.name);
        Ok(FieldMetaData::new(
            field.name.as_str(),
            TypeName::from_reflection(&field.field_type).map_err(context)?,
            FieldAccessFlags::from_bits_truncate(field.modifiers),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &TypeName {
        &self.field_type
    }

    pub fn modifiers(&self) -> FieldAccessFlags {
        self.modifiers
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(FieldAccessFlags::STATIC)
    }

    /// Source-like signature, for instance `int count`
    pub fn signature(&self) -> String {
        format!("{} {}", self.field_type, self.name)
    }
}

fn parse_all(
    names: &[String],
    parse: impl Fn(&str) -> Result<TypeName, String>,
) -> Result<Vec<TypeName>, String> {
    names.iter().map(|name| parse(name)).collect()
}
