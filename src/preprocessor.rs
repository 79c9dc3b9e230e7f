use crate::jvm::model::BinaryClass;
use crate::metadata::{ClassLoader, MetaDataCache};
use crate::model::{WeaveModel, WeaveModelRegistry};
use crate::transform::{
    class_digest, ClassDigest, Context, Pipeline, TransformMark, TransformState,
};
use crate::{Error, Settings};
use log::{debug, error, info, warn};
use std::any::Any;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

/// Entry point for weaving classes as they get loaded
///
/// Every registered weave model whose transformation scope covers a class gets the pipeline run
/// over it, in uuid order. A failure inside the pipeline (an error or a panic) only costs that
/// class its weaving: the original bytes are handed back and the failure is logged. Errors in the
/// class bytes or the weave definition are returned instead.
pub struct Preprocessor {
    settings: Settings,
    registry: Arc<WeaveModelRegistry>,
    cache: Arc<MetaDataCache>,
    state: TransformState,
    pipeline: Pipeline,
}

/// Outcome of one successful pipeline run
struct Woven {
    marks: Vec<TransformMark>,

    /// Serialized class, if any pass modified it
    bytes: Option<Vec<u8>>,
}

impl Preprocessor {
    pub fn new(settings: Settings, registry: Arc<WeaveModelRegistry>) -> Preprocessor {
        let pipeline = Pipeline::standard(&settings);
        Preprocessor {
            settings,
            registry,
            cache: Arc::new(MetaDataCache::new()),
            state: TransformState::new(),
            pipeline,
        }
    }

    /// Replace the standard passes
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Preprocessor {
        self.pipeline = pipeline;
        self
    }

    /// Share a metadata cache with other preprocessors
    pub fn with_cache(mut self, cache: Arc<MetaDataCache>) -> Preprocessor {
        self.cache = cache;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &WeaveModelRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &MetaDataCache {
        &self.cache
    }

    pub fn state(&self) -> &TransformState {
        &self.state
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Weave one class
    ///
    /// The class name may be dotted or binary. Classes that no model applies to, or that no pass
    /// changes, come back as the exact input bytes.
    pub fn preprocess(
        &self,
        class_name: &str,
        bytes: &[u8],
        loader: &dyn ClassLoader,
    ) -> Result<Vec<u8>, Error> {
        let dotted = class_name.replace('/', ".");
        if self.settings.is_excluded(&dotted) {
            debug!("Skipping '{}': excluded namespace", dotted);
            return Ok(bytes.to_vec());
        }
        let models: Vec<Arc<WeaveModel>> = self
            .registry
            .models()
            .into_iter()
            .filter(|model| model.in_transformation_scope(&dotted))
            .collect();
        if models.is_empty() {
            debug!("Skipping '{}': outside of every transformation scope", dotted);
            return Ok(bytes.to_vec());
        }

        let input = class_digest(bytes);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.weave(bytes, input, &models, loader)))
            .unwrap_or_else(|panic| {
                Err(Error::Fault {
                    pass: "pipeline",
                    message: panic_message(panic),
                })
            });
        let woven = match outcome {
            Ok(woven) => woven,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                error!("Weaving '{}' failed, leaving it unchanged: {:?}", dotted, err);
                return Ok(bytes.to_vec());
            }
        };

        let output = match woven.bytes {
            None => {
                self.state.commit(woven.marks, input);
                return Ok(bytes.to_vec());
            }
            Some(output) => output,
        };
        self.state.commit(woven.marks, class_digest(&output));
        info!("Woven '{}'", dotted);
        if self.settings.should_dump(&dotted) {
            if let Err(err) = self.dump(&class_name.replace('.', "/"), bytes, &output) {
                warn!("Failed to dump '{}': {}", dotted, err);
            }
        }
        Ok(output)
    }

    /// Weave one class, falling back to the original bytes on any failure
    ///
    /// Meant for load hooks that have no way of reporting an error.
    pub fn preprocess_or_original(
        &self,
        class_name: &str,
        bytes: &[u8],
        loader: &dyn ClassLoader,
    ) -> Vec<u8> {
        match self.preprocess(class_name, bytes, loader) {
            Ok(output) => output,
            Err(err) => {
                error!("Not weaving '{}': {:?}", class_name, err);
                bytes.to_vec()
            }
        }
    }

    fn weave(
        &self,
        bytes: &[u8],
        input: ClassDigest,
        models: &[Arc<WeaveModel>],
        loader: &dyn ClassLoader,
    ) -> Result<Woven, Error> {
        let mut class = BinaryClass::parse(bytes).map_err(Error::ClassFormat)?;
        let mut marks = vec![];
        for model in models {
            let mut context =
                Context::new(&class, input, loader, &self.cache, model, &self.state)?;
            self.pipeline.run(&mut context, &mut class)?;
            if context.is_advised() {
                debug!("'{}' advised by model '{}'", class.name(), model.uuid());
            }
            marks.extend(context.into_marks());
        }
        let bytes = if class.is_modified() {
            Some(class.serialize()?)
        } else {
            None
        };
        Ok(Woven { marks, bytes })
    }

    /// Write the woven class (and the original, if asked to) under the dump directory
    fn dump(&self, binary_name: &str, before: &[u8], after: &[u8]) -> std::io::Result<()> {
        let directory = match &self.settings.dump_directory {
            Some(directory) => directory,
            None => return Ok(()),
        };
        let file_name = format!("{}.class", binary_name);
        write_file(&directory.join(&file_name), after)?;
        if self.settings.dump_before {
            write_file(&directory.join("_before").join(&file_name), before)?;
        }
        info!("Dumped '{}' to {}", binary_name, directory.display());
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        String::from(*message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}
