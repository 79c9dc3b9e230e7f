//! Names of the generated members
//!
//! Every generated name starts with [`RESERVED_PREFIX`], so metadata snapshots skip them and
//! pattern matching never advises generated code. Names that belong to one weave model carry its
//! uuid so that several models can weave the same class.

use crate::metadata::RESERVED_PREFIX;

pub const METADATA_FIELD: &str = "___jw$metaData";
pub const GET_METADATA_METHOD: &str = "___jw$getMetaData";
pub const ADD_METADATA_METHOD: &str = "___jw$addMetaData";
pub const UUID_FIELD: &str = "___jw$uuid";
pub const GET_UUID_METHOD: &str = "___jw$getUuid";

/// Make text usable inside a member name, without `$` so it can't run into a separator
///
/// Every `_` in the result starts an escape, so distinct inputs stay distinct.
fn mangle(text: &str) -> String {
    let mut mangled = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '/' => mangled.push_str("_0"),
            '_' => mangled.push_str("_1"),
            ';' => mangled.push_str("_2"),
            '[' => mangled.push_str("_3"),
            '.' => mangled.push_str("_4"),
            '<' => mangled.push_str("_5"),
            '>' => mangled.push_str("_6"),
            '$' => mangled.push_str("_7"),
            c => mangled.push(c),
        }
    }
    mangled
}

/// Name the original body of an advised method is moved to
pub fn original_method(uuid: &str, name: &str, sequence: usize) -> String {
    format!("{}original${}${}${}", RESERVED_PREFIX, mangle(uuid), name, sequence)
}

/// Prefix shared by every renamed original of a weave model
pub fn original_method_prefix(uuid: &str) -> String {
    format!("{}original${}$", RESERVED_PREFIX, mangle(uuid))
}

/// Thread local holding the join point of an advised method
pub fn method_join_point(uuid: &str, name: &str, sequence: usize) -> String {
    format!("{}methodJp${}${}${}", RESERVED_PREFIX, mangle(uuid), name, sequence)
}

pub fn get_field_join_point(uuid: &str, field: &str) -> String {
    format!("{}{}", get_field_join_point_prefix(uuid), field)
}

pub fn get_field_join_point_prefix(uuid: &str) -> String {
    format!("{}getJp${}$", RESERVED_PREFIX, mangle(uuid))
}

pub fn set_field_join_point(uuid: &str, field: &str) -> String {
    format!("{}{}", set_field_join_point_prefix(uuid), field)
}

pub fn set_field_join_point_prefix(uuid: &str) -> String {
    format!("{}setJp${}$", RESERVED_PREFIX, mangle(uuid))
}

/// Join point of the calls from one class to one overload of a method
pub fn caller_join_point(uuid: &str, callee_class: &str, name: &str, sequence: usize) -> String {
    format!(
        "{}{}${}${}",
        caller_join_point_prefix(uuid),
        mangle(callee_class),
        name,
        sequence
    )
}

pub fn caller_join_point_prefix(uuid: &str) -> String {
    format!("{}callerJp${}$", RESERVED_PREFIX, mangle(uuid))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_names() {
        assert_eq!(original_method("ab12", "run", 0), "___jw$original$ab12$run$0");
        assert_eq!(method_join_point("ab12", "run", 3), "___jw$methodJp$ab12$run$3");
        assert_eq!(get_field_join_point("a.b", "count"), "___jw$getJp$a_4b$count");
        assert_eq!(set_field_join_point("ab12", "count"), "___jw$setJp$ab12$count");
        assert_eq!(
            caller_join_point("ab12", "com/acme/Bank", "transfer", 1),
            "___jw$callerJp$ab12$com_0acme_0Bank$transfer$1"
        );
        assert!(original_method("ab12", "run", 0).starts_with(&original_method_prefix("ab12")));
    }

    #[test]
    fn distinct_callers_get_distinct_names() {
        let names = [
            caller_join_point("ab12", "com/acme/Bank", "pay", 0),
            caller_join_point("ab12", "com/acme_Bank", "pay", 0),
            caller_join_point("ab12", "com.acme/Bank", "pay", 0),
            caller_join_point("ab12", "com/acme/Bank$Teller", "pay", 0),
            caller_join_point("ab12", "com/acme/Bank_7Teller", "pay", 0),
        ];
        for (i, name) in names.iter().enumerate() {
            assert!(!name[RESERVED_PREFIX.len()..].contains("$$"));
            for other in &names[i + 1..] {
                assert_ne!(name, other);
            }
        }
    }
}
