use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Source of class bytes for hierarchy lookups
///
/// Implementations stand in for the host's class loader: they are asked for the bytes of
/// ancestors and interfaces of the class being woven.
pub trait ClassLoader: Send + Sync {
    /// Identifies the loader (classes with the same name in different loaders are different)
    fn id(&self) -> &str;

    /// Bytes of a class, by binary name (`com/acme/Widget`)
    fn class_bytes(&self, name: &str) -> Option<Vec<u8>>;

    /// Bytes of a non-class resource, by `/`-separated path
    fn resource(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Loader backed by a map of class bytes
pub struct InMemoryClassLoader {
    id: String,
    classes: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryClassLoader {
    pub fn new(id: impl Into<String>) -> InMemoryClassLoader {
        InMemoryClassLoader {
            id: id.into(),
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) the bytes for a class
    pub fn define(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.write().insert(name.into(), bytes);
    }
}

impl ClassLoader for InMemoryClassLoader {
    fn id(&self) -> &str {
        &self.id
    }

    fn class_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.classes.read().get(name).cloned()
    }
}

/// Loader reading `.class` files out of directory roots, first match wins
pub struct ClassPathLoader {
    id: String,
    roots: Vec<PathBuf>,
}

impl ClassPathLoader {
    pub fn new(id: impl Into<String>, roots: Vec<PathBuf>) -> ClassPathLoader {
        ClassPathLoader {
            id: id.into(),
            roots,
        }
    }

    fn read(&self, relative: &str) -> Option<Vec<u8>> {
        self.roots.iter().find_map(|root| {
            let path = root.join(relative);
            match fs::read(&path) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    debug!("Not found at {}: {}", path.display(), err);
                    None
                }
            }
        })
    }
}

impl ClassLoader for ClassPathLoader {
    fn id(&self) -> &str {
        &self.id
    }

    fn class_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.read(&format!("{}.class", name))
    }

    fn resource(&self, path: &str) -> Option<Vec<u8>> {
        self.read(path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn class_path_lookup() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir_all(second.path().join("com/acme")).unwrap();
        fs::write(second.path().join("com/acme/Widget.class"), b"\xca\xfe").unwrap();
        fs::write(first.path().join("model.def"), b"first").unwrap();
        fs::write(second.path().join("model.def"), b"second").unwrap();

        let loader = ClassPathLoader::new(
            "app",
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
        );
        assert_eq!(loader.class_bytes("com/acme/Widget"), Some(b"\xca\xfe".to_vec()));
        assert_eq!(loader.class_bytes("com/acme/Gadget"), None);
        assert_eq!(loader.resource("/model.def"), Some(b"first".to_vec()));
    }

    #[test]
    fn in_memory_definitions() {
        let loader = InMemoryClassLoader::new("mem");
        assert_eq!(loader.class_bytes("a/B"), None);
        loader.define("a/B", vec![1, 2]);
        assert_eq!(loader.class_bytes("a/B"), Some(vec![1, 2]));
        assert_eq!(loader.resource("a/B"), None);
    }
}
