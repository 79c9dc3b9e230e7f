use super::codegen::CodeBuilder;
use super::{runtime, Context, InterfaceTransformer, Transformer};
use crate::jvm::code::{Instruction, InvokeType};
use crate::jvm::model::{BinaryClass, MethodSpec};
use crate::jvm::{parse_method_descriptor, FieldType, MethodAccessFlags};
use crate::metadata::{ClassLoader, RESERVED_PREFIX};
use crate::model::{DefinitionError, IntroductionDefinition};
use crate::Error;
use log::debug;

/// Adds methods delegating to the implementations of introduced interfaces
///
/// Each public instance method of an implementation class gets a proxy in the target class
/// calling `IntroductionRegistry.invoke` with the model uuid, the introduction index, and the
/// index of the method in the sorted method list of the implementation.
pub struct AddImplementations;

impl Transformer for AddImplementations {
    fn name(&self) -> &'static str {
        "add-implementations"
    }

    fn interface_stage(&self) -> Option<&dyn InterfaceTransformer> {
        Some(self)
    }
}

/// Methods inherited from `java.lang.Object`, by name and descriptor
const OBJECT_METHODS: [(&str, &str); 11] = [
    ("clone", "()Ljava/lang/Object;"),
    ("equals", "(Ljava/lang/Object;)Z"),
    ("finalize", "()V"),
    ("getClass", "()Ljava/lang/Class;"),
    ("hashCode", "()I"),
    ("notify", "()V"),
    ("notifyAll", "()V"),
    ("toString", "()Ljava/lang/String;"),
    ("wait", "()V"),
    ("wait", "(J)V"),
    ("wait", "(JI)V"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImplementationMethod {
    name: String,
    descriptor: String,

    /// Reflection names of the parameter types
    parameter_types: Vec<String>,
    exceptions: Vec<String>,
}

impl InterfaceTransformer for AddImplementations {
    fn transform_interface(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        if class.is_interface() {
            return Ok(());
        }
        let model = context.model();
        let snapshot = context.class_metadata();
        let uuid = context.uuid();
        let mut added = 0;
        for name in model.introduction_names(&snapshot) {
            let introduction = model
                .introduction(name)
                .ok_or_else(|| DefinitionError::UnknownIntroduction(name.to_owned()))?;
            let introduction_index = model
                .introduction_index(name)
                .ok_or_else(|| DefinitionError::UnknownIntroduction(name.to_owned()))?;
            let implementation = match &introduction.implementation {
                Some(implementation) => implementation.replace('.', "/"),
                None => continue,
            };
            if implementation == class.name() {
                continue;
            }

            let methods = implementation_methods(introduction, &implementation, context.loader())?;
            for (method_index, method) in methods.iter().enumerate() {
                if class.find_method(&method.name, &method.descriptor).is_some() {
                    debug!(
                        "{}: '{}' already declares {}{}",
                        self.name(),
                        class.name(),
                        method.name,
                        method.descriptor
                    );
                    continue;
                }
                let body = {
                    let mut code = CodeBuilder::new(&mut class.constants);
                    let descriptor = parse_method_descriptor(&method.descriptor)?;
                    code.const_string(uuid)?;
                    code.const_int(introduction_index as i32)?;
                    code.const_int(method_index as i32)?;
                    code.push(Instruction::ALoad(0));
                    code.parameter_array(&descriptor.parameters, 1)?;
                    let (invoke, invoke_descriptor) = runtime::INVOKE_INTRODUCTION;
                    code.invoke(
                        InvokeType::Static,
                        runtime::INTRODUCTION_REGISTRY,
                        invoke,
                        invoke_descriptor,
                    )?;
                    code.unbox_or_cast(descriptor.return_type.as_ref())?;
                    code.return_value(descriptor.return_type.as_ref());
                    code.into_body()
                };
                class.add_method(MethodSpec {
                    access_flags: MethodAccessFlags::PUBLIC,
                    name: method.name.clone(),
                    descriptor: method.descriptor.clone(),
                    body: Some(body),
                    exceptions: method.exceptions.clone(),
                })?;
                added += 1;
            }
            debug!(
                "{}: '{}' delegates {} methods to {}",
                self.name(),
                class.name(),
                methods.len(),
                implementation
            );
        }
        if added > 0 {
            context.mark_advised();
        }
        Ok(())
    }
}

/// Public instance methods of an implementation class, in the order the runtime indexes them
///
/// Sorted by name, then number of parameters, then the reflection names of the parameter types
/// (so `boolean` < `com.acme.Item` < `int` < `long`).
fn implementation_methods(
    introduction: &IntroductionDefinition,
    implementation: &str,
    loader: &dyn ClassLoader,
) -> Result<Vec<ImplementationMethod>, DefinitionError> {
    let unresolvable = |reason: String| DefinitionError::UnresolvableImplementation {
        introduction: introduction.name.clone(),
        class: implementation.replace('/', "."),
        reason,
    };
    let bytes = loader
        .class_bytes(implementation)
        .ok_or_else(|| unresolvable(format!("not found by class loader '{}'", loader.id())))?;
    let class = BinaryClass::parse(&bytes).map_err(|err| unresolvable(format!("{:?}", err)))?;

    let mut methods = vec![];
    for method in class.methods() {
        let excluded = !method.access_flags.contains(MethodAccessFlags::PUBLIC)
            || method.is_static()
            || method.is_constructor()
            || method.is_static_initializer()
            || method
                .access_flags
                .intersects(MethodAccessFlags::SYNTHETIC | MethodAccessFlags::BRIDGE)
            || method.name().starts_with(RESERVED_PREFIX)
            || OBJECT_METHODS
                .iter()
                .any(|&(name, descriptor)| {
                    method.name() == name && method.descriptor() == descriptor
                });
        if excluded {
            continue;
        }
        let descriptor = method
            .parsed_descriptor()
            .map_err(|err| unresolvable(format!("{:?}", err)))?;
        let exceptions = method
            .exceptions(&class.constants)
            .map_err(|err| unresolvable(format!("{:?}", err)))?;
        methods.push(ImplementationMethod {
            name: method.name().to_owned(),
            descriptor: method.descriptor().to_owned(),
            parameter_types: descriptor
                .parameters
                .iter()
                .map(FieldType::reflection_name)
                .collect(),
            exceptions,
        });
    }
    methods.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.parameter_types.len().cmp(&b.parameter_types.len()))
            .then_with(|| a.parameter_types.cmp(&b.parameter_types))
    });
    Ok(methods)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::code::{BranchInstruction, MethodBody};
    use crate::jvm::ClassAccessFlags;
    use crate::metadata::{InMemoryClassLoader, MetaDataCache};
    use crate::model::{AspectDefinition, DeploymentModel, WeaveDefinition};
    use crate::transform::{class_digest, TransformState};

    fn method(class: &mut BinaryClass, flags: MethodAccessFlags, name: &str, descriptor: &str) {
        let mut body = MethodBody::new();
        body.push_branch(BranchInstruction::Return);
        class
            .add_method(MethodSpec {
                access_flags: flags,
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                body: Some(body),
                exceptions: vec![],
            })
            .unwrap();
    }

    fn introduction() -> IntroductionDefinition {
        IntroductionDefinition {
            name: String::from("tracking"),
            interface: String::from("com.acme.Tracked"),
            implementation: Some(String::from("com.acme.TrackedImpl")),
            deployment_model: DeploymentModel::PerJvm,
        }
    }

    fn class(name: &str) -> BinaryClass {
        BinaryClass::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            name,
            Some("java/lang/Object"),
        )
        .unwrap()
    }

    #[test]
    fn methods_are_sorted_and_filtered() {
        let mut implementation = class("com/acme/TrackedImpl");
        let public = MethodAccessFlags::PUBLIC;
        method(&mut implementation, public, "track", "(Ljava/lang/String;I)V");
        method(&mut implementation, public, "track", "(I)V");
        method(&mut implementation, public, "reset", "()V");
        method(&mut implementation, public, "toString", "()Ljava/lang/String;");
        method(&mut implementation, public, "<init>", "()V");
        method(&mut implementation, MethodAccessFlags::PRIVATE, "helper", "()V");
        method(&mut implementation, public | MethodAccessFlags::STATIC, "create", "()V");

        let loader = InMemoryClassLoader::new("app");
        loader.define("com/acme/TrackedImpl", implementation.serialize().unwrap());
        let methods =
            implementation_methods(&introduction(), "com/acme/TrackedImpl", &loader).unwrap();
        let names: Vec<(&str, &str)> = methods
            .iter()
            .map(|method| (method.name.as_str(), method.descriptor.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("reset", "()V"),
                ("track", "(I)V"),
                ("track", "(Ljava/lang/String;I)V"),
            ]
        );
    }

    #[test]
    fn overloads_are_ordered_by_parameter_type_names() {
        let mut implementation = class("com/acme/TrackedImpl");
        let public = MethodAccessFlags::PUBLIC;
        for descriptor in ["(I)V", "(J)V", "(Lcom/acme/Item;)V", "(Z)V", "([I)V"] {
            method(&mut implementation, public, "track", descriptor);
        }

        let loader = InMemoryClassLoader::new("app");
        loader.define("com/acme/TrackedImpl", implementation.serialize().unwrap());
        let methods =
            implementation_methods(&introduction(), "com/acme/TrackedImpl", &loader).unwrap();
        let descriptors: Vec<&str> = methods
            .iter()
            .map(|method| method.descriptor.as_str())
            .collect();
        assert_eq!(
            descriptors,
            vec!["([I)V", "(Z)V", "(Lcom/acme/Item;)V", "(I)V", "(J)V"]
        );
    }

    #[test]
    fn declared_methods_are_not_proxied() {
        let mut implementation = class("com/acme/TrackedImpl");
        let public = MethodAccessFlags::PUBLIC;
        method(&mut implementation, public, "track", "(I)V");
        let loader = InMemoryClassLoader::new("app");
        loader.define("com/acme/TrackedImpl", implementation.serialize().unwrap());

        let mut widget = class("com/acme/Widget");
        method(&mut widget, public, "track", "(I)V");
        let pool_size = widget.constants.count();

        let model = WeaveDefinition::new("ab12")
            .introduction("tracking", "com.acme.Tracked", Some("com.acme.TrackedImpl"))
            .aspect(AspectDefinition::new("tracker").introduce("com.acme.Widget", &["tracking"]))
            .resolve()
            .unwrap();
        let cache = MetaDataCache::new();
        let state = TransformState::new();
        let digest = class_digest(b"widget");
        let mut context = Context::new(&widget, digest, &loader, &cache, &model, &state).unwrap();
        AddImplementations
            .transform_interface(&mut context, &mut widget)
            .unwrap();

        assert_eq!(widget.methods().len(), 1);
        assert_eq!(widget.constants.count(), pool_size);
        assert!(!context.is_advised());
    }

    #[test]
    fn missing_implementations_are_definition_errors() {
        let loader = InMemoryClassLoader::new("app");
        let err = implementation_methods(&introduction(), "com/acme/TrackedImpl", &loader)
            .unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::UnresolvableImplementation { ref class, .. }
                if class == "com.acme.TrackedImpl"
        ));
    }
}
