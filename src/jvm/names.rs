use std::borrow::Cow;
use std::fmt;

/// Name of a method or field
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Name of a class or interface in internal form (`java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct BinaryName(Cow<'static, str>);

/// Check that each segment of a class name is a legal unqualified name
fn check_class_name(name: &str) -> Result<(), String> {
    for segment in name.split('/') {
        if segment.is_empty() {
            return Err(format!("Class name '{}' has an empty segment", name));
        }
        if segment.contains(&['.', ';', '['][..]) {
            return Err(format!("Class name '{}' contains an illegal character", name));
        }
    }
    Ok(())
}

impl UnqualifiedName {
    const fn known(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub const INIT: Self = Self::known("<init>");
    pub const CLINIT: Self = Self::known("<clinit>");

    pub const BOOLEANVALUE: Self = Self::known("booleanValue");
    pub const BYTEVALUE: Self = Self::known("byteValue");
    pub const CHARVALUE: Self = Self::known("charValue");
    pub const DOUBLEVALUE: Self = Self::known("doubleValue");
    pub const FLOATVALUE: Self = Self::known("floatValue");
    pub const FORNAME: Self = Self::known("forName");
    pub const GET: Self = Self::known("get");
    pub const INTVALUE: Self = Self::known("intValue");
    pub const LONGVALUE: Self = Self::known("longValue");
    pub const PUT: Self = Self::known("put");
    pub const SERIALVERSIONUID: Self = Self::known("serialVersionUID");
    pub const SET: Self = Self::known("set");
    pub const SHORTVALUE: Self = Self::known("shortValue");
}

impl BinaryName {
    const fn known(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    /// Class name in internal form, as found in descriptors and class constants
    pub fn from_internal(name: String) -> Result<BinaryName, String> {
        check_class_name(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }

    /// Class name in the dotted form used by reflection and weave definitions
    pub fn from_dotted(name: &str) -> Result<BinaryName, String> {
        BinaryName::from_internal(name.replace('.', "/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_dotted(&self) -> String {
        self.0.replace('/', ".")
    }

    pub const BOOLEAN: Self = Self::known("java/lang/Boolean");
    pub const BYTE: Self = Self::known("java/lang/Byte");
    pub const CHARACTER: Self = Self::known("java/lang/Character");
    pub const CLASS: Self = Self::known("java/lang/Class");
    pub const DOUBLE: Self = Self::known("java/lang/Double");
    pub const FLOAT: Self = Self::known("java/lang/Float");
    pub const HASHMAP: Self = Self::known("java/util/HashMap");
    pub const INTEGER: Self = Self::known("java/lang/Integer");
    pub const LONG: Self = Self::known("java/lang/Long");
    pub const MAP: Self = Self::known("java/util/Map");
    pub const OBJECT: Self = Self::known("java/lang/Object");
    pub const SERIALIZABLE: Self = Self::known("java/io/Serializable");
    pub const SHORT: Self = Self::known("java/lang/Short");
    pub const STRING: Self = Self::known("java/lang/String");
    pub const THREADLOCAL: Self = Self::known("java/lang/ThreadLocal");
}

/// Displays the dotted form (`java.lang.Object`)
impl fmt::Display for BinaryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}
