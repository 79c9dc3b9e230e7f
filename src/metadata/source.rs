//! Member descriptions handed over by the source model and by runtime reflection
//!
//! Neither frontend is part of the weaver. They only need to fill in these plain records, and
//! [`MethodMetaData`](super::MethodMetaData) / [`FieldMetaData`](super::FieldMetaData) take it
//! from there.

use crate::jvm::{FieldAccessFlags, MethodAccessFlags};

/// Method or constructor declaration parsed from source
#[derive(Clone, Debug, Default)]
pub struct SourceMethod {
    pub name: String,

    /// Type as written (`String []`); `None` for constructors
    pub return_type: Option<String>,
    pub parameter_types: Vec<String>,
    pub exception_types: Vec<String>,

    /// Modifier keywords (`public`, `static`, ...)
    pub modifiers: Vec<String>,
    pub is_constructor: bool,
}

/// Field declaration parsed from source
#[derive(Clone, Debug, Default)]
pub struct SourceField {
    pub name: String,
    pub field_type: String,
    pub modifiers: Vec<String>,
}

/// Method or constructor as reported by reflection
///
/// Type names use reflection syntax (`int`, `java.lang.String`, `[Ljava.lang.String;`) and
/// `modifiers` holds the `java.lang.reflect.Modifier` bits.
#[derive(Clone, Debug, Default)]
pub struct ReflectedMethod {
    pub name: String,
    pub return_type: String,
    pub parameter_types: Vec<String>,
    pub exception_types: Vec<String>,
    pub modifiers: u16,
    pub is_constructor: bool,
}

/// Field as reported by reflection
#[derive(Clone, Debug, Default)]
pub struct ReflectedField {
    pub name: String,
    pub field_type: String,
    pub modifiers: u16,
}

pub(crate) fn method_modifiers(keywords: &[String]) -> Result<MethodAccessFlags, String> {
    let mut flags = MethodAccessFlags::empty();
    for keyword in keywords {
        flags |= match keyword.as_str() {
            "public" => MethodAccessFlags::PUBLIC,
            "private" => MethodAccessFlags::PRIVATE,
            "protected" => MethodAccessFlags::PROTECTED,
            "static" => MethodAccessFlags::STATIC,
            "final" => MethodAccessFlags::FINAL,
            "synchronized" => MethodAccessFlags::SYNCHRONIZED,
            "native" => MethodAccessFlags::NATIVE,
            "abstract" => MethodAccessFlags::ABSTRACT,
            "strictfp" => MethodAccessFlags::STRICT,
            "default" => MethodAccessFlags::empty(),
            other => return Err(format!("Unknown method modifier '{}'", other)),
        };
    }
    Ok(flags)
}

pub(crate) fn field_modifiers(keywords: &[String]) -> Result<FieldAccessFlags, String> {
    let mut flags = FieldAccessFlags::empty();
    for keyword in keywords {
        flags |= match keyword.as_str() {
            "public" => FieldAccessFlags::PUBLIC,
            "private" => FieldAccessFlags::PRIVATE,
            "protected" => FieldAccessFlags::PROTECTED,
            "static" => FieldAccessFlags::STATIC,
            "final" => FieldAccessFlags::FINAL,
            "volatile" => FieldAccessFlags::VOLATILE,
            "transient" => FieldAccessFlags::TRANSIENT,
            other => return Err(format!("Unknown field modifier '{}'", other)),
        };
    }
    Ok(flags)
}
