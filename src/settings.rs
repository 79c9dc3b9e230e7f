use crate::model::{ClassPattern, DefinitionError};
use std::path::PathBuf;

/// Knobs of the [`Preprocessor`](crate::Preprocessor)
pub struct Settings {
    /// Directory woven classes are written to, as `<dir>/com/acme/Widget.class`
    pub dump_directory: Option<PathBuf>,

    /// Classes to dump (every woven class if unset)
    pub dump_pattern: Option<ClassPattern>,

    /// Also dump the class as it was before weaving, under `<dir>/_before/`
    pub dump_before: bool,

    /// Dotted name prefixes of classes that are never woven
    ///
    /// The runtime library must be excluded, or generated code would call into woven runtime
    /// classes.
    pub excluded_namespaces: Vec<String>,

    /// Add attachable metadata to advised classes
    pub metadata_storage: bool,

    /// Add a per-instance identity to advised classes
    pub identity: bool,
}

impl Settings {
    pub const DUMP_DIR_VAR: &'static str = "JWEAVE_DUMP_DIR";
    pub const DUMP_PATTERN_VAR: &'static str = "JWEAVE_DUMP_PATTERN";
    pub const DUMP_BEFORE_VAR: &'static str = "JWEAVE_DUMP_BEFORE";
    pub const METADATA_VAR: &'static str = "JWEAVE_METADATA";
    pub const IDENTITY_VAR: &'static str = "JWEAVE_IDENTITY";

    pub fn new() -> Settings {
        Settings {
            dump_directory: None,
            dump_pattern: None,
            dump_before: false,
            excluded_namespaces: ["org.jweave.", "java.", "javax.", "sun.", "jdk."]
                .iter()
                .map(|namespace| namespace.to_string())
                .collect(),
            metadata_storage: true,
            identity: true,
        }
    }

    /// Defaults overridden by the `JWEAVE_*` environment variables
    pub fn from_env() -> Result<Settings, DefinitionError> {
        Settings::from_vars(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever variables `var` knows about
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Settings, DefinitionError> {
        let mut settings = Settings::new();
        if let Some(directory) = var(Self::DUMP_DIR_VAR).filter(|dir| !dir.is_empty()) {
            settings.dump_directory = Some(PathBuf::from(directory));
        }
        if let Some(pattern) = var(Self::DUMP_PATTERN_VAR).filter(|pattern| !pattern.is_empty()) {
            settings.dump_pattern = Some(ClassPattern::parse(&pattern, false)?);
        }
        if let Some(before) = var(Self::DUMP_BEFORE_VAR) {
            settings.dump_before = is_true(&before);
        }
        if let Some(metadata) = var(Self::METADATA_VAR) {
            settings.metadata_storage = is_true(&metadata);
        }
        if let Some(identity) = var(Self::IDENTITY_VAR) {
            settings.identity = is_true(&identity);
        }
        Ok(settings)
    }

    /// Is the class (by dotted name) outside of what may be woven?
    pub fn is_excluded(&self, class_name: &str) -> bool {
        self.excluded_namespaces
            .iter()
            .any(|namespace| class_name.starts_with(namespace.as_str()))
    }

    /// Should the woven class (by dotted name) be written to the dump directory?
    pub fn should_dump(&self, class_name: &str) -> bool {
        self.dump_directory.is_some()
            && self
                .dump_pattern
                .as_ref()
                .map_or(true, |pattern| pattern.matches_name(class_name))
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}

fn is_true(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let settings = Settings::from_vars(vars(&[])).unwrap();
        assert!(settings.dump_directory.is_none());
        assert!(settings.metadata_storage && settings.identity);
        assert!(settings.is_excluded("org.jweave.runtime.Identity"));
        assert!(settings.is_excluded("java.lang.String"));
        assert!(!settings.is_excluded("com.acme.Widget"));
        assert!(!settings.should_dump("com.acme.Widget"));
    }

    #[test]
    fn environment_overrides() {
        let settings = Settings::from_vars(vars(&[
            ("JWEAVE_DUMP_DIR", "/tmp/woven"),
            ("JWEAVE_DUMP_PATTERN", "com.acme.*"),
            ("JWEAVE_DUMP_BEFORE", "true"),
            ("JWEAVE_IDENTITY", "false"),
        ]))
        .unwrap();
        assert_eq!(settings.dump_directory, Some(PathBuf::from("/tmp/woven")));
        assert!(settings.dump_before);
        assert!(settings.metadata_storage);
        assert!(!settings.identity);
        assert!(settings.should_dump("com.acme.Widget"));
        assert!(!settings.should_dump("org.other.Widget"));
    }

    #[test]
    fn malformed_dump_patterns_are_rejected() {
        let result = Settings::from_vars(vars(&[("JWEAVE_DUMP_PATTERN", "com..acme..(")]));
        assert!(result.is_err());
    }
}
