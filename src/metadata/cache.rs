use super::{ClassLoader, ClassMetaData, InterfaceMetaData};
use crate::jvm::model::BinaryClass;
use crate::jvm::Error;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Hierarchies deeper than this are cut off and treated as unresolvable
const MAX_HIERARCHY_DEPTH: usize = 128;

/// Dead entries are swept once a map holds this many, or twice the live entries of the last
/// sweep if that's more
const MIN_SWEEP_SIZE: usize = 64;

/// (loader id, binary class name)
type Key = (String, String);

/// Weakly held entries
struct WeakMap<T> {
    entries: HashMap<Key, Weak<T>>,
    sweep_at: usize,
}

impl<T> Default for WeakMap<T> {
    fn default() -> Self {
        WeakMap {
            entries: HashMap::new(),
            sweep_at: MIN_SWEEP_SIZE,
        }
    }
}

impl<T> WeakMap<T> {
    fn get(&self, key: &Key) -> Option<Arc<T>> {
        self.entries.get(key).and_then(Weak::upgrade)
    }

    fn insert(&mut self, key: Key, value: &Arc<T>) {
        if self.entries.len() >= self.sweep_at {
            self.entries.retain(|_, entry| entry.strong_count() > 0);
            self.sweep_at = MIN_SWEEP_SIZE.max(2 * self.entries.len());
        }
        self.entries.insert(key, Arc::downgrade(value));
    }

    fn live(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.sweep_at = MIN_SWEEP_SIZE;
    }
}

/// Process-wide memo of class and interface metadata
///
/// Entries are held weakly: once no snapshot refers to a class's metadata any more, it can be
/// dropped and is rebuilt on the next request. Lookups and inserts happen under the same lock, so
/// concurrent requests for one class all end up sharing the first inserted snapshot.
#[derive(Default)]
pub struct MetaDataCache {
    classes: Mutex<WeakMap<ClassMetaData>>,
    interfaces: Mutex<WeakMap<InterfaceMetaData>>,
}

impl MetaDataCache {
    pub fn new() -> MetaDataCache {
        MetaDataCache::default()
    }

    /// Metadata for a class known to the loader, by binary name
    pub fn class_metadata(&self, name: &str, loader: &dyn ClassLoader) -> Arc<ClassMetaData> {
        self.class_at_depth(name, loader, 0)
    }

    /// Metadata for an interface known to the loader, by binary name
    pub fn interface_metadata(
        &self,
        name: &str,
        loader: &dyn ClassLoader,
    ) -> Arc<InterfaceMetaData> {
        self.interface_at_depth(name, loader, 0)
    }

    /// Metadata for a class that is being woven
    ///
    /// The snapshot describes the bytes in hand rather than whatever the loader would return,
    /// so it is not cached. Its supertypes come from the cache.
    pub fn class_metadata_for(
        &self,
        class: &BinaryClass,
        loader: &dyn ClassLoader,
    ) -> Result<Arc<ClassMetaData>, Error> {
        let (superclass, interfaces) = self.supertypes(class, loader, 0);
        ClassMetaData::from_class(class, superclass, interfaces).map(Arc::new)
    }

    /// Number of entries still alive
    pub fn len(&self) -> usize {
        let classes = self.classes.lock().live();
        classes + self.interfaces.lock().live()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.classes.lock().clear();
        self.interfaces.lock().clear();
    }

    fn class_at_depth(
        &self,
        name: &str,
        loader: &dyn ClassLoader,
        depth: usize,
    ) -> Arc<ClassMetaData> {
        let key = (loader.id().to_owned(), name.to_owned());
        get_or_build(&self.classes, key, || {
            let dotted = name.replace('/', ".");
            let class = match self.load(name, loader, depth) {
                Some(class) => class,
                None => return ClassMetaData::leaf(dotted),
            };
            let (superclass, interfaces) = self.supertypes(&class, loader, depth);
            ClassMetaData::from_class(&class, superclass, interfaces).unwrap_or_else(|err| {
                warn!("Treating '{}' as a leaf class: {:?}", dotted, err);
                ClassMetaData::leaf(dotted)
            })
        })
    }

    fn interface_at_depth(
        &self,
        name: &str,
        loader: &dyn ClassLoader,
        depth: usize,
    ) -> Arc<InterfaceMetaData> {
        let key = (loader.id().to_owned(), name.to_owned());
        get_or_build(&self.interfaces, key, || {
            let dotted = name.replace('/', ".");
            let class = match self.load(name, loader, depth) {
                Some(class) => class,
                None => return InterfaceMetaData::leaf(dotted),
            };
            let interfaces = class
                .interfaces()
                .iter()
                .map(|interface| self.interface_at_depth(interface, loader, depth + 1))
                .collect();
            InterfaceMetaData::from_class(&class, interfaces).unwrap_or_else(|err| {
                warn!("Treating '{}' as a leaf interface: {:?}", dotted, err);
                InterfaceMetaData::leaf(dotted)
            })
        })
    }

    fn supertypes(
        &self,
        class: &BinaryClass,
        loader: &dyn ClassLoader,
        depth: usize,
    ) -> (Option<Arc<ClassMetaData>>, Vec<Arc<InterfaceMetaData>>) {
        let superclass = class
            .super_name()
            .map(|super_name| self.class_at_depth(super_name, loader, depth + 1));
        let interfaces = class
            .interfaces()
            .iter()
            .map(|interface| self.interface_at_depth(interface, loader, depth + 1))
            .collect();
        (superclass, interfaces)
    }

    fn load(&self, name: &str, loader: &dyn ClassLoader, depth: usize) -> Option<BinaryClass> {
        if depth > MAX_HIERARCHY_DEPTH {
            warn!("Hierarchy above '{}' is too deep, cutting it off", name);
            return None;
        }
        let bytes = match loader.class_bytes(name) {
            Some(bytes) => bytes,
            None if name.starts_with("java/") || name.starts_with("javax/") => {
                debug!("Platform class '{}' not available to loader '{}'", name, loader.id());
                return None;
            }
            None => {
                warn!("Class '{}' not found by loader '{}'", name, loader.id());
                return None;
            }
        };
        match BinaryClass::parse(&bytes) {
            Ok(class) => Some(class),
            Err(err) => {
                warn!("Class '{}' could not be parsed: {:?}", name, err);
                None
            }
        }
    }
}

/// Return the live entry for `key`, or build one outside the lock and insert it
///
/// If another thread inserted while this one was building, its entry wins.
fn get_or_build<T>(map: &Mutex<WeakMap<T>>, key: Key, build: impl FnOnce() -> T) -> Arc<T> {
    if let Some(existing) = map.lock().get(&key) {
        return existing;
    }
    let built = Arc::new(build());
    let mut entries = map.lock();
    if let Some(existing) = entries.get(&key) {
        return existing;
    }
    entries.insert(key, &built);
    built
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::model::{FieldSpec, MethodSpec};
    use crate::jvm::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
    use crate::metadata::InMemoryClassLoader;

    fn class_bytes(
        name: &str,
        super_name: &str,
        interfaces: &[&str],
        flags: ClassAccessFlags,
    ) -> Vec<u8> {
        let mut class = BinaryClass::new(Version::JAVA8, flags, name, Some(super_name)).unwrap();
        for interface in interfaces {
            class.add_interface(interface).unwrap();
        }
        class
            .add_field(FieldSpec {
                access_flags: FieldAccessFlags::PRIVATE,
                name: String::from("count"),
                descriptor: String::from("I"),
                constant_value: None,
            })
            .unwrap();
        class
            .add_method(MethodSpec {
                access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                name: String::from("run"),
                descriptor: String::from("()V"),
                body: None,
                exceptions: vec![],
            })
            .unwrap();
        class.serialize().unwrap()
    }

    fn loader() -> InMemoryClassLoader {
        let loader = InMemoryClassLoader::new("test");
        loader.define(
            "com/acme/Base",
            class_bytes(
                "com/acme/Base",
                "java/lang/Object",
                &["com/acme/Marker"],
                ClassAccessFlags::PUBLIC,
            ),
        );
        loader.define(
            "com/acme/Widget",
            class_bytes("com/acme/Widget", "com/acme/Base", &[], ClassAccessFlags::PUBLIC),
        );
        loader.define(
            "com/acme/Marker",
            class_bytes(
                "com/acme/Marker",
                "java/lang/Object",
                &["java/io/Serializable"],
                ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            ),
        );
        loader
    }

    #[test]
    fn hierarchy_is_resolved_through_the_loader() {
        let cache = MetaDataCache::new();
        let loader = loader();
        let widget = cache.class_metadata("com/acme/Widget", &loader);
        assert_eq!(widget.name(), "com.acme.Widget");
        assert_eq!(widget.methods()[0].signature(), "void run()");
        assert_eq!(widget.fields()[0].signature(), "int count");

        let base = widget.superclass().unwrap();
        assert_eq!(base.name(), "com.acme.Base");
        let object = base.superclass().unwrap();
        assert_eq!(object.name(), "java.lang.Object");
        assert!(object.superclass().is_none());

        assert!(widget.any_in_hierarchy(&mut |name| name == "java.io.Serializable"));
        assert!(!widget.any_in_hierarchy(&mut |name| name == "java.lang.Runnable"));
    }

    #[test]
    fn entries_are_shared_then_released() {
        let cache = MetaDataCache::new();
        let loader = loader();
        let first = cache.class_metadata("com/acme/Base", &loader);
        let second = cache.class_metadata("com/acme/Base", &loader);
        assert!(Arc::ptr_eq(&first, &second));

        let widget = cache.class_metadata("com/acme/Widget", &loader);
        assert!(Arc::ptr_eq(widget.superclass().unwrap(), &first));
        assert!(!cache.is_empty());

        drop((first, second, widget));
        assert!(cache.is_empty());
    }

    #[test]
    fn dead_entries_are_swept_as_the_map_grows() {
        let map: Mutex<WeakMap<usize>> = Mutex::default();
        let kept: Vec<Arc<usize>> = (0..10)
            .map(|i| get_or_build(&map, (String::from("app"), format!("Kept{}", i)), || i))
            .collect();
        for i in 0..1000 {
            get_or_build(&map, (String::from("app"), format!("Dropped{}", i)), || i);
        }
        let map = map.lock();
        assert!(map.entries.len() <= MIN_SWEEP_SIZE);
        assert_eq!(map.live(), kept.len());
    }

    #[test]
    fn loaders_are_kept_apart() {
        let cache = MetaDataCache::new();
        let loader = loader();
        let other = InMemoryClassLoader::new("other");
        let known = cache.class_metadata("com/acme/Widget", &loader);
        let unknown = cache.class_metadata("com/acme/Widget", &other);
        assert_eq!(known.methods().len(), 1);
        assert!(unknown.methods().is_empty());
        assert!(unknown.superclass().is_none());
    }

    #[test]
    fn snapshots_of_classes_in_hand() {
        let cache = MetaDataCache::new();
        let loader = loader();
        let bytes = class_bytes("com/acme/Gadget", "com/acme/Base", &[], ClassAccessFlags::PUBLIC);
        let class = BinaryClass::parse(&bytes).unwrap();
        let gadget = cache.class_metadata_for(&class, &loader).unwrap();
        assert_eq!(gadget.name(), "com.acme.Gadget");
        assert_eq!(gadget.superclass().unwrap().name(), "com.acme.Base");
    }
}
