use crate::jvm::{parse_field_descriptor, FieldType, MethodDescriptor, RefType};
use std::fmt;

/// Type as it appears in metadata and patterns: the dotted element type plus array dimensions
///
/// Every source of type names normalizes into this shape, so `[Ljava/lang/String;` (descriptor),
/// `[Ljava.lang.String;` (reflection), and `java.lang.String []` (source) all become
/// `java.lang.String[]`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    element: String,
    dimensions: usize,
}

const PRIMITIVES: [&str; 9] = [
    "void", "boolean", "byte", "char", "short", "int", "long", "float", "double",
];

/// `java.lang` classes that source text commonly leaves unqualified
const JAVA_LANG: [&str; 16] = [
    "Object",
    "String",
    "Class",
    "Boolean",
    "Byte",
    "Character",
    "Short",
    "Integer",
    "Long",
    "Float",
    "Double",
    "Number",
    "Throwable",
    "Exception",
    "RuntimeException",
    "Error",
];

impl TypeName {
    pub fn new(element: impl Into<String>, dimensions: usize) -> TypeName {
        TypeName {
            element: element.into(),
            dimensions,
        }
    }

    pub fn void() -> TypeName {
        TypeName::new("void", 0)
    }

    /// Element type (for `int[][]`, this is `int`)
    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn is_primitive(&self) -> bool {
        self.dimensions == 0 && PRIMITIVES.contains(&self.element.as_str())
    }

    pub fn is_void(&self) -> bool {
        self.dimensions == 0 && self.element == "void"
    }

    /// From a parsed field descriptor
    pub fn from_field_type(field_type: &FieldType) -> TypeName {
        match field_type {
            FieldType::Base(base) => TypeName::new(base.keyword(), 0),
            FieldType::Ref(RefType::Object(class)) => TypeName::new(class.to_dotted(), 0),
            FieldType::Ref(RefType::ObjectArray(array)) => {
                TypeName::new(array.element_type.to_dotted(), array.dimensions())
            }
            FieldType::Ref(RefType::PrimitiveArray(array)) => {
                TypeName::new(array.element_type.keyword(), array.dimensions())
            }
        }
    }

    /// From a field descriptor (`I`, `[Ljava/lang/String;`)
    pub fn from_descriptor(descriptor: &str) -> Result<TypeName, String> {
        parse_field_descriptor(descriptor)
            .map(|typ| TypeName::from_field_type(&typ))
            .map_err(|err| format!("{:?}", err))
    }

    /// Return type of a method descriptor (`void` for no return)
    pub fn from_return_type(descriptor: &MethodDescriptor) -> TypeName {
        descriptor
            .return_type
            .as_ref()
            .map_or_else(TypeName::void, TypeName::from_field_type)
    }

    /// From a reflection name (`int`, `java.lang.String`, `[I`, `[Ljava.lang.String;`)
    pub fn from_reflection(name: &str) -> Result<TypeName, String> {
        if !name.starts_with('[') {
            return TypeName::from_source(name);
        }
        let dimensions = name.chars().take_while(|c| *c == '[').count();
        let element = &name[dimensions..];
        let element = match element {
            "Z" => "boolean",
            "B" => "byte",
            "C" => "char",
            "S" => "short",
            "I" => "int",
            "J" => "long",
            "F" => "float",
            "D" => "double",
            _ => element
                .strip_prefix('L')
                .and_then(|rest| rest.strip_suffix(';'))
                .ok_or_else(|| format!("Malformed array type name '{}'", name))?,
        };
        Ok(TypeName::new(element.replace('/', "."), dimensions))
    }

    /// From source text (`int`, `String []`, `java.lang.Object...`, `com.acme.Item[][]`)
    ///
    /// Well known `java.lang` classes may be left unqualified.
    pub fn from_source(text: &str) -> Result<TypeName, String> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let (mut rest, mut dimensions) = match compact.strip_suffix("...") {
            Some(rest) => (rest, 1),
            None => (compact.as_str(), 0),
        };
        while let Some(inner) = rest.strip_suffix("[]") {
            rest = inner;
            dimensions += 1;
        }
        if rest.is_empty() || rest.contains(&['[', ']', '/', ';'][..]) {
            return Err(format!("Malformed type name '{}'", text));
        }
        let element = if JAVA_LANG.contains(&rest) {
            format!("java.lang.{}", rest)
        } else {
            rest.to_owned()
        };
        Ok(TypeName::new(element, dimensions))
    }

    /// Field descriptor for the type (`None` for `void`)
    pub fn descriptor(&self) -> Option<String> {
        if self.is_void() {
            return None;
        }
        let mut descriptor = "[".repeat(self.dimensions);
        match self.element.as_str() {
            "boolean" => descriptor.push('Z'),
            "byte" => descriptor.push('B'),
            "char" => descriptor.push('C'),
            "short" => descriptor.push('S'),
            "int" => descriptor.push('I'),
            "long" => descriptor.push('J'),
            "float" => descriptor.push('F'),
            "double" => descriptor.push('D'),
            class => {
                descriptor.push('L');
                descriptor.push_str(&class.replace('.', "/"));
                descriptor.push(';');
            }
        }
        Some(descriptor)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.element)?;
        for _ in 0..self.dimensions {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_source_agrees() {
        let expected = TypeName::new("java.lang.String", 2);
        assert_eq!(TypeName::from_descriptor("[[Ljava/lang/String;").unwrap(), expected);
        assert_eq!(TypeName::from_reflection("[[Ljava.lang.String;").unwrap(), expected);
        assert_eq!(TypeName::from_source("String [][]").unwrap(), expected);
        assert_eq!(TypeName::from_source("java.lang.String[]...").unwrap(), expected);
        assert_eq!(expected.to_string(), "java.lang.String[][]");
    }

    #[test]
    fn primitives() {
        let ints = TypeName::from_reflection("[I").unwrap();
        assert_eq!(ints, TypeName::from_source("int[]").unwrap());
        assert_eq!(ints.descriptor().as_deref(), Some("[I"));
        assert!(TypeName::from_source("long").unwrap().is_primitive());
        assert!(!ints.is_primitive());
        assert_eq!(TypeName::void().descriptor(), None);
    }

    #[test]
    fn malformed_names() {
        assert!(TypeName::from_source("[]").is_err());
        assert!(TypeName::from_source("java/lang/String").is_err());
        assert!(TypeName::from_reflection("[Ljava.lang.String").is_err());
        assert!(TypeName::from_descriptor("Q").is_err());
    }
}
