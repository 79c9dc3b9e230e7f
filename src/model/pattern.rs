//! Class, method, and field patterns
//!
//! Class patterns are dotted names where `*` matches within one segment and `..` matches any
//! number of segments. A lone `*` matches every class, and a trailing `+` extends the match to
//! every class that inherits from (or implements) a matching type.
//!
//! Member patterns compare types exactly, after normalizing them through [`TypeName`]. Only the
//! member name may contain `*`.

use super::DefinitionError;
use crate::metadata::{ClassMetaData, FieldMetaData, MethodMetaData, TypeName};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    /// One package or class segment, possibly with `*`
    Glob(String),

    /// Zero or more segments
    Any,
}

#[derive(Clone, Debug)]
pub struct ClassPattern {
    source: String,
    segments: Vec<Segment>,
    hierarchical: bool,
}

impl ClassPattern {
    pub fn parse(pattern: &str, hierarchical: bool) -> Result<ClassPattern, DefinitionError> {
        let trimmed = pattern.trim();
        let (body, plus) = match trimmed.strip_suffix('+') {
            Some(body) => (body.trim_end(), true),
            None => (trimmed, false),
        };
        let malformed = |reason: &str| DefinitionError::MalformedPattern {
            pattern: pattern.to_owned(),
            reason: reason.to_owned(),
        };
        if body.is_empty() {
            return Err(malformed("empty class pattern"));
        }

        let mut segments = vec![];
        for part in body.split('.') {
            if part.is_empty() {
                if segments.last() != Some(&Segment::Any) {
                    segments.push(Segment::Any);
                }
            } else if part
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '*')
            {
                segments.push(Segment::Glob(part.to_owned()));
            } else {
                return Err(malformed("unexpected character in class pattern"));
            }
        }
        if segments.last() == Some(&Segment::Any) {
            return Err(malformed("class pattern can't end with '..'"));
        }

        Ok(ClassPattern {
            source: pattern.to_owned(),
            segments,
            hierarchical: hierarchical || plus,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_hierarchical(&self) -> bool {
        self.hierarchical
    }

    /// Match a dotted class name, ignoring the hierarchy
    pub fn matches_name(&self, class_name: &str) -> bool {
        let parts: Vec<&str> = class_name.split('.').collect();
        if let [Segment::Glob(only)] = self.segments.as_slice() {
            if only == "*" {
                return true;
            }
        }
        match_segments(&self.segments, &parts)
    }

    /// Match a class, walking its ancestors and interfaces if the pattern is hierarchical
    pub fn matches_class(&self, class: &ClassMetaData) -> bool {
        if self.hierarchical {
            class.any_in_hierarchy(&mut |name| self.matches_name(name))
        } else {
            self.matches_name(class.name())
        }
    }
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> bool {
    match segments.split_first() {
        None => parts.is_empty(),
        Some((Segment::Any, rest)) => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        Some((Segment::Glob(glob), rest)) => match parts.split_first() {
            Some((part, parts)) => glob_matches(glob, part) && match_segments(rest, parts),
            None => false,
        },
    }
}

/// `*` matches any (possibly empty) run of characters, everything else matches itself
pub(crate) fn glob_matches(glob: &str, text: &str) -> bool {
    let glob: Vec<char> = glob.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut g, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if g < glob.len() && glob[g] == '*' {
            backtrack = Some((g, t));
            g += 1;
        } else if g < glob.len() && glob[g] == text[t] {
            g += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            g = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    glob[g..].iter().all(|c| *c == '*')
}

/// `<return> <name>(<param>, ...)`
#[derive(Clone, Debug)]
pub struct MethodPattern {
    return_type: TypeName,
    name: String,
    parameters: Vec<TypeName>,
}

impl MethodPattern {
    pub fn parse(pattern: &str) -> Result<MethodPattern, DefinitionError> {
        let malformed = |reason: String| DefinitionError::MalformedPattern {
            pattern: pattern.to_owned(),
            reason,
        };
        let open = pattern
            .find('(')
            .ok_or_else(|| malformed(String::from("missing '('")))?;
        let close = pattern
            .rfind(')')
            .filter(|close| *close > open)
            .ok_or_else(|| malformed(String::from("missing ')'")))?;
        if !pattern[close + 1..].trim().is_empty() {
            return Err(malformed(String::from("trailing text after ')'")));
        }

        let (return_type, name) = split_type_and_name(pattern[..open].trim())
            .ok_or_else(|| malformed(String::from("expected '<return type> <name>'")))?;
        let parameters = pattern[open + 1..close].trim();
        let parameters = if parameters.is_empty() {
            vec![]
        } else {
            parameters
                .split(',')
                .map(TypeName::from_source)
                .collect::<Result<_, _>>()
                .map_err(malformed)?
        };
        Ok(MethodPattern {
            return_type: TypeName::from_source(return_type).map_err(malformed)?,
            name: name.to_owned(),
            parameters,
        })
    }

    pub fn matches(&self, method: &MethodMetaData) -> bool {
        glob_matches(&self.name, method.name())
            && &self.return_type == method.return_type()
            && self.parameters.as_slice() == method.parameter_types()
    }
}

/// `<type> <name>`
#[derive(Clone, Debug)]
pub struct FieldPattern {
    field_type: TypeName,
    name: String,
}

impl FieldPattern {
    pub fn parse(pattern: &str) -> Result<FieldPattern, DefinitionError> {
        let malformed = |reason: String| DefinitionError::MalformedPattern {
            pattern: pattern.to_owned(),
            reason,
        };
        let (field_type, name) = split_type_and_name(pattern.trim())
            .ok_or_else(|| malformed(String::from("expected '<type> <name>'")))?;
        Ok(FieldPattern {
            field_type: TypeName::from_source(field_type).map_err(malformed)?,
            name: name.to_owned(),
        })
    }

    pub fn matches(&self, field: &FieldMetaData) -> bool {
        glob_matches(&self.name, field.name()) && &self.field_type == field.field_type()
    }
}

/// Split `<type> <name>` on the last run of whitespace
fn split_type_and_name(text: &str) -> Option<(&str, &str)> {
    let split = text.rfind(char::is_whitespace)?;
    let (typ, name) = (text[..split].trim(), text[split..].trim());
    if typ.is_empty() || name.is_empty() {
        None
    } else {
        Some((typ, name))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{FieldAccessFlags, MethodAccessFlags};

    fn class(pattern: &str) -> ClassPattern {
        ClassPattern::parse(pattern, false).unwrap()
    }

    #[test]
    fn class_names() {
        assert!(class("com.acme.*").matches_name("com.acme.Widget"));
        assert!(!class("com.acme.*").matches_name("com.acme.sub.Widget"));
        assert!(!class("com.acme.*").matches_name("com.other.Widget"));
        assert!(class("com..*").matches_name("com.acme.sub.Widget"));
        assert!(class("com..Widget").matches_name("com.Widget"));
        assert!(class("*").matches_name("Widget"));
        assert!(class("*").matches_name("com.acme.Widget"));
        assert!(class("com.acme.*Service").matches_name("com.acme.OrderService"));
        assert!(!class("com.acme.*Service").matches_name("com.acme.ServiceLocator"));
        assert!(class("com.acme.Widget").matches_name("com.acme.Widget"));
        assert!(!class("com.acme.Widget").matches_name("com.acme.Widget2"));
    }

    #[test]
    fn hierarchical_markers() {
        assert!(class("com.acme.Base+").is_hierarchical());
        assert!(ClassPattern::parse("com.acme.Base", true).unwrap().is_hierarchical());
        assert!(!class("com.acme.Base").is_hierarchical());
    }

    #[test]
    fn malformed_class_patterns() {
        assert!(ClassPattern::parse("", false).is_err());
        assert!(ClassPattern::parse("com.acme..", false).is_err());
        assert!(ClassPattern::parse("com/acme/Widget", false).is_err());
    }

    #[test]
    fn globs() {
        assert!(glob_matches("*", ""));
        assert!(glob_matches("get*", "getName"));
        assert!(glob_matches("*Name", "getName"));
        assert!(glob_matches("g*t*e", "getName"));
        assert!(!glob_matches("set*", "getName"));
        assert!(!glob_matches("get", "getName"));
    }

    #[test]
    fn method_signatures() {
        let method = MethodMetaData::new(
            "transfer",
            TypeName::new("void", 0),
            vec![TypeName::new("long", 0), TypeName::new("java.lang.String", 1)],
            vec![],
            MethodAccessFlags::PUBLIC,
        );
        let matches = |pattern: &str| MethodPattern::parse(pattern).unwrap().matches(&method);
        assert!(matches("void transfer(long, String[])"));
        assert!(matches("void trans*(long,java.lang.String [])"));
        assert!(!matches("void transfer(long)"));
        assert!(!matches("int transfer(long, String[])"));
        assert!(!matches("void transfer(long, String)"));
        assert!(MethodPattern::parse("void transfer").is_err());
        assert!(MethodPattern::parse("transfer()").is_err());
        assert!(MethodPattern::parse("void transfer() throws").is_err());
    }

    #[test]
    fn field_signatures() {
        let field =
            FieldMetaData::new("balance", TypeName::new("int", 0), FieldAccessFlags::empty());
        assert!(FieldPattern::parse("int balance").unwrap().matches(&field));
        assert!(FieldPattern::parse("int bal*").unwrap().matches(&field));
        assert!(!FieldPattern::parse("long balance").unwrap().matches(&field));
        assert!(FieldPattern::parse("balance").is_err());
    }
}
