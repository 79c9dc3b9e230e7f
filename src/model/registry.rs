use super::{DefinitionError, WeaveDefinition, WeaveModel};
use crate::metadata::ClassLoader;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

const MODEL_FILE_PREFIX: &str = "jweave-model-";
const MODEL_FILE_SUFFIX: &str = ".def";

/// Name of the persisted weave model for a uuid
pub fn model_file_name(uuid: &str) -> String {
    format!("{}{}{}", MODEL_FILE_PREFIX, uuid, MODEL_FILE_SUFFIX)
}

/// Turns the bytes of a persisted model file into a definition
pub type DefinitionReader =
    dyn Fn(&[u8]) -> Result<WeaveDefinition, DefinitionError> + Send + Sync;

/// Resolved weave models, one per uuid
///
/// Models are either registered directly or loaded on first use from a model file, found in
/// `directory` or else through the class loader's resources. Loading is serialized, so a model
/// is read and resolved by one thread while the others wait and then share it.
pub struct WeaveModelRegistry {
    models: Mutex<HashMap<String, Arc<WeaveModel>>>,
    loading: Mutex<()>,
    directory: Option<PathBuf>,
    reader: Option<Box<DefinitionReader>>,
}

impl Default for WeaveModelRegistry {
    fn default() -> WeaveModelRegistry {
        WeaveModelRegistry::new()
    }
}

impl WeaveModelRegistry {
    /// Registry that only knows the models registered with it
    pub fn new() -> WeaveModelRegistry {
        WeaveModelRegistry {
            models: Mutex::new(HashMap::new()),
            loading: Mutex::new(()),
            directory: None,
            reader: None,
        }
    }

    /// Registry that can also load model files
    pub fn with_reader(directory: Option<PathBuf>, reader: Box<DefinitionReader>) -> Self {
        WeaveModelRegistry {
            directory,
            reader: Some(reader),
            ..WeaveModelRegistry::new()
        }
    }

    /// Resolve a definition and make it available under its uuid
    pub fn register(
        &self,
        definition: &WeaveDefinition,
    ) -> Result<Arc<WeaveModel>, DefinitionError> {
        let model = Arc::new(definition.resolve()?);
        self.models
            .lock()
            .insert(definition.uuid.clone(), model.clone());
        Ok(model)
    }

    pub fn get(&self, uuid: &str) -> Option<Arc<WeaveModel>> {
        self.models.lock().get(uuid).cloned()
    }

    /// Every registered model
    pub fn models(&self) -> Vec<Arc<WeaveModel>> {
        let mut models: Vec<_> = self.models.lock().values().cloned().collect();
        models.sort_by(|a, b| a.uuid().cmp(b.uuid()));
        models
    }

    /// Get a model, loading it from its model file the first time it is asked for
    pub fn load(
        &self,
        uuid: &str,
        loader: Option<&dyn ClassLoader>,
    ) -> Result<Arc<WeaveModel>, DefinitionError> {
        if let Some(model) = self.get(uuid) {
            return Ok(model);
        }
        let _loading = self.loading.lock();
        if let Some(model) = self.get(uuid) {
            return Ok(model);
        }

        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| DefinitionError::ModelNotFound(uuid.to_owned()))?;
        let bytes = self
            .read_model_file(uuid, loader)?
            .ok_or_else(|| DefinitionError::ModelNotFound(uuid.to_owned()))?;
        let definition = reader(&bytes)?;
        info!("Loaded weave model '{}'", uuid);
        self.register(&definition)
    }

    fn read_model_file(
        &self,
        uuid: &str,
        loader: Option<&dyn ClassLoader>,
    ) -> Result<Option<Vec<u8>>, DefinitionError> {
        let file_name = model_file_name(uuid);
        if let Some(directory) = &self.directory {
            let path = directory.join(&file_name);
            if path.is_file() {
                debug!("Reading weave model from {}", path.display());
                return Ok(Some(fs::read(path)?));
            }
        }
        Ok(loader.and_then(|loader| loader.resource(&file_name)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metadata::ClassPathLoader;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn reader(calls: Arc<AtomicUsize>) -> Box<DefinitionReader> {
        Box::new(move |bytes: &[u8]| {
            calls.fetch_add(1, Ordering::SeqCst);
            let uuid = String::from_utf8_lossy(bytes).trim().to_owned();
            Ok(WeaveDefinition::new(uuid))
        })
    }

    #[test]
    fn registered_models() {
        let registry = WeaveModelRegistry::new();
        registry.register(&WeaveDefinition::new("b")).unwrap();
        registry.register(&WeaveDefinition::new("a")).unwrap();
        assert_eq!(registry.get("a").unwrap().uuid(), "a");
        let uuids: Vec<_> = registry.models().iter().map(|m| m.uuid().to_owned()).collect();
        assert_eq!(uuids, vec!["a", "b"]);
        assert!(matches!(registry.load("c", None), Err(DefinitionError::ModelNotFound(_))));
    }

    #[test]
    fn models_load_once_from_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(model_file_name("shop")), "shop").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(WeaveModelRegistry::with_reader(
            Some(dir.path().to_path_buf()),
            reader(calls.clone()),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.load("shop", None).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().uuid(), "shop");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn models_load_from_the_class_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("jweave-model-billing.def"), "billing").unwrap();
        let loader = ClassPathLoader::new("app", vec![dir.path().to_path_buf()]);
        let registry =
            WeaveModelRegistry::with_reader(None, reader(Arc::new(AtomicUsize::new(0))));
        let model = registry.load("billing", Some(&loader)).unwrap();
        assert_eq!(model.uuid(), "billing");
        assert!(matches!(
            registry.load("payroll", Some(&loader)),
            Err(DefinitionError::ModelNotFound(_))
        ));
    }
}
