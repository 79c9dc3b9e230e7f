use crate::jvm::model::BinaryClass;
use crate::metadata::{ClassLoader, ClassMetaData, MetaDataCache};
use crate::model::WeaveModel;
use crate::Error;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// SHA-1 of a class file
pub type ClassDigest = [u8; 20];

pub fn class_digest(bytes: &[u8]) -> ClassDigest {
    let mut digest = [0; 20];
    digest.copy_from_slice(&Sha1::digest(bytes));
    digest
}

/// One pass having transformed one class for one weave model
///
/// The digest is the one of the bytes the pipeline produced, so presenting those bytes again is
/// recognized as presenting an already transformed class.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransformMark {
    pub pass: &'static str,
    pub model: String,
    pub loader: String,
    pub class: String,
    pub digest: ClassDigest,
}

/// Process-wide record of which passes already transformed which classes
#[derive(Default)]
pub struct TransformState {
    marks: Mutex<HashSet<TransformMark>>,
}

impl TransformState {
    pub fn new() -> TransformState {
        TransformState::default()
    }

    pub fn contains(&self, mark: &TransformMark) -> bool {
        self.marks.lock().contains(mark)
    }

    /// Record the passes of a finished pipeline run against the bytes it produced
    pub fn commit(&self, staged: Vec<TransformMark>, output: ClassDigest) {
        let mut marks = self.marks.lock();
        for mut mark in staged {
            mark.digest = output;
            marks.insert(mark);
        }
    }

    pub fn len(&self) -> usize {
        self.marks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.marks.lock().clear();
    }
}

/// Scratch state of one pipeline run over one class, for one weave model
pub struct Context<'a> {
    loader: &'a dyn ClassLoader,
    cache: &'a MetaDataCache,
    model: &'a WeaveModel,
    state: &'a TransformState,

    /// Binary name of the class being woven
    class_name: String,
    input_digest: ClassDigest,

    /// Snapshot of the class taken before any pass ran
    snapshot: Arc<ClassMetaData>,
    has_advice: bool,

    advised: bool,
    metadata: HashMap<&'static str, Box<dyn Any>>,
    staged: Vec<TransformMark>,
}

impl<'a> Context<'a> {
    pub fn new(
        class: &BinaryClass,
        input_digest: ClassDigest,
        loader: &'a dyn ClassLoader,
        cache: &'a MetaDataCache,
        model: &'a WeaveModel,
        state: &'a TransformState,
    ) -> Result<Context<'a>, Error> {
        let snapshot = cache.class_metadata_for(class, loader)?;
        let has_advice = model.has_method_pointcut_in_class(&snapshot)
            || model.has_get_field_pointcut_in_class(&snapshot)
            || model.has_set_field_pointcut_in_class(&snapshot)
            || model.has_caller_side_pointcut_in_class(&snapshot)
            || model.has_introductions(&snapshot);
        Ok(Context {
            loader,
            cache,
            model,
            state,
            class_name: class.name().to_owned(),
            input_digest,
            snapshot,
            has_advice,
            advised: false,
            metadata: HashMap::new(),
            staged: vec![],
        })
    }

    pub fn loader(&self) -> &'a dyn ClassLoader {
        self.loader
    }

    pub fn model(&self) -> &'a WeaveModel {
        self.model
    }

    pub fn uuid(&self) -> &'a str {
        self.model.uuid()
    }

    /// Metadata of the class as it was before this run
    pub fn class_metadata(&self) -> Arc<ClassMetaData> {
        self.snapshot.clone()
    }

    /// Might anything in the model apply to the class? (Class-wide, so it can be optimistic)
    pub fn has_advice(&self) -> bool {
        self.has_advice
    }

    pub fn resolve_superclass(&self) -> Option<Arc<ClassMetaData>> {
        self.snapshot.superclass().cloned()
    }

    /// Metadata of another class visible to the loader, by binary name
    pub fn resolve_class(&self, name: &str) -> Arc<ClassMetaData> {
        self.cache.class_metadata(name, self.loader)
    }

    pub fn mark_advised(&mut self) {
        self.advised = true;
    }

    pub fn is_advised(&self) -> bool {
        self.advised
    }

    pub fn metadata<T: Any>(&self, key: &str) -> Option<&T> {
        self.metadata.get(key).and_then(|value| value.downcast_ref())
    }

    pub fn put_metadata<T: Any>(&mut self, key: &'static str, value: T) {
        self.metadata.insert(key, Box::new(value));
    }

    fn mark(&self, pass: &'static str) -> TransformMark {
        TransformMark {
            pass,
            model: self.model.uuid().to_owned(),
            loader: self.loader.id().to_owned(),
            class: self.class_name.clone(),
            digest: self.input_digest,
        }
    }

    /// Did the pass already transform these very bytes?
    pub fn is_transformed(&self, pass: &'static str) -> bool {
        self.state.contains(&self.mark(pass))
    }

    /// Note that the pass ran (recorded once the whole pipeline succeeds)
    pub fn mark_transformed(&mut self, pass: &'static str) {
        let mark = self.mark(pass);
        if !self.staged.contains(&mark) {
            self.staged.push(mark);
        }
    }

    pub fn into_marks(self) -> Vec<TransformMark> {
        self.staged
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::ClassAccessFlags;
    use crate::metadata::InMemoryClassLoader;
    use crate::model::WeaveDefinition;

    #[test]
    fn marks_are_staged_until_committed() {
        let class = BinaryClass::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            "com/acme/Widget",
            Some("java/lang/Object"),
        )
        .unwrap();
        let loader = InMemoryClassLoader::new("app");
        let cache = MetaDataCache::new();
        let model = WeaveDefinition::new("shop").resolve().unwrap();
        let state = TransformState::new();
        let input = class_digest(b"before");
        let output = class_digest(b"after");

        let mut context = Context::new(&class, input, &loader, &cache, &model, &state).unwrap();
        assert!(!context.has_advice());
        context.mark_transformed("serial-version-uid");
        context.mark_transformed("serial-version-uid");
        context.put_metadata("count", 3usize);
        assert_eq!(context.metadata::<usize>("count"), Some(&3));
        assert_eq!(context.metadata::<bool>("count"), None);
        assert!(!context.is_transformed("serial-version-uid"));
        state.commit(context.into_marks(), output);
        assert_eq!(state.len(), 1);

        let context = Context::new(&class, input, &loader, &cache, &model, &state).unwrap();
        assert!(!context.is_transformed("serial-version-uid"));
        let context = Context::new(&class, output, &loader, &cache, &model, &state).unwrap();
        assert!(context.is_transformed("serial-version-uid"));
    }

    #[test]
    fn hierarchy_is_resolved_through_the_loader() {
        let base = BinaryClass::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            "com/acme/Base",
            Some("java/lang/Object"),
        )
        .unwrap();
        let loader = InMemoryClassLoader::new("app");
        loader.define("com/acme/Base", base.serialize().unwrap());
        let widget = BinaryClass::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            "com/acme/Widget",
            Some("com/acme/Base"),
        )
        .unwrap();
        let cache = MetaDataCache::new();
        let model = WeaveDefinition::new("shop").resolve().unwrap();
        let state = TransformState::new();
        let digest = class_digest(b"widget");

        let context = Context::new(&widget, digest, &loader, &cache, &model, &state).unwrap();
        let superclass = context.resolve_superclass().unwrap();
        assert_eq!(superclass.name(), "com.acme.Base");
        assert_eq!(context.resolve_class("com/acme/Base").name(), "com.acme.Base");
        assert!(!context.is_advised());
    }
}
