mod common;

use common::*;
use jweave::jvm::class_file::Version;
use jweave::jvm::code::{BranchInstruction, MethodBody};
use jweave::jvm::model::BinaryClass;
use jweave::jvm::{ClassAccessFlags, MethodAccessFlags};
use jweave::metadata::InMemoryClassLoader;
use jweave::model::{AspectDefinition, DefinitionError, PointcutKind, WeaveDefinition};
use jweave::transform::{
    CodeTransformer, Context, InterfaceTransformer, MemberMethodAdvice, MetaDataStorage, Pipeline,
    Transformer,
};
use jweave::{Error, Settings};

fn customer_bytes() -> Vec<u8> {
    let mut class = class("com/acme/Customer");
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC,
        "doSomethingIllegal",
        "(I)V",
        trivial_body("(I)V"),
    );
    class.serialize().unwrap()
}

fn illegal_model() -> WeaveDefinition {
    WeaveDefinition::new("ab12")
        .advice("log", "com.acme.LoggingAdvice")
        .aspect(
            AspectDefinition::new("audit")
                .pointcut(
                    "illegal",
                    PointcutKind::Method,
                    "com.acme.*",
                    "void doSomethingIllegal(int)",
                )
                .advise("illegal", &["log"]),
        )
}

#[test]
fn woven_classes_are_not_woven_again() {
    init_logging();
    let loader = loader();
    let preprocessor = preprocessor(&[illegal_model()]);
    let original = customer_bytes();
    let woven = preprocessor
        .preprocess("com.acme.Customer", &original, &loader)
        .unwrap();
    assert_ne!(woven, original);
    assert!(!preprocessor.state().is_empty());

    // Recorded as already transformed
    let again = preprocessor
        .preprocess("com.acme.Customer", &woven, &loader)
        .unwrap();
    assert_eq!(again, woven);

    // Recognized from the generated members alone
    let fresh = preprocessor_with(Settings::new(), &[illegal_model()]);
    let again = fresh
        .preprocess("com/acme/Customer", &woven, &loader)
        .unwrap();
    assert_eq!(again, woven);

    // The original bytes weave the same way every time
    let rewoven = preprocessor
        .preprocess("com.acme.Customer", &original, &loader)
        .unwrap();
    assert_eq!(rewoven, woven);
}

#[test]
fn untouched_classes_come_back_unchanged() {
    init_logging();
    let mut class = class("org/other/Supplier");
    add_method(&mut class, MethodAccessFlags::PUBLIC, "ship", "()V", trivial_body("()V"));
    let bytes = class.serialize().unwrap();

    let preprocessor = preprocessor(&[illegal_model()]);
    let output = preprocessor
        .preprocess("org.other.Supplier", &bytes, &loader())
        .unwrap();
    assert_eq!(output, bytes);
}

#[test]
fn excluded_namespaces_are_never_woven() {
    init_logging();
    let mut class = class("org/jweave/runtime/Helper");
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC,
        "doSomethingIllegal",
        "(I)V",
        trivial_body("(I)V"),
    );
    let bytes = class.serialize().unwrap();
    let definition = WeaveDefinition::new("ab12")
        .advice("log", "com.acme.LoggingAdvice")
        .aspect(
            AspectDefinition::new("audit")
                .pointcut("all", PointcutKind::Method, "*", "void doSomethingIllegal(int)")
                .advise("all", &["log"]),
        );

    let preprocessor = preprocessor(&[definition]);
    let output = preprocessor
        .preprocess("org.jweave.runtime.Helper", &bytes, &loader())
        .unwrap();
    assert_eq!(output, bytes);
    assert!(preprocessor.state().is_empty());
}

#[test]
fn classes_outside_the_model_scope_are_skipped() {
    init_logging();
    let mut definition = illegal_model();
    definition.include_packages.push(String::from("com.other"));
    let bytes = customer_bytes();
    let output = preprocessor(&[definition])
        .preprocess("com.acme.Customer", &bytes, &loader())
        .unwrap();
    assert_eq!(output, bytes);
}

struct Failing;

impl Transformer for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn code_stage(&self) -> Option<&dyn CodeTransformer> {
        Some(self)
    }
}

impl CodeTransformer for Failing {
    fn transform_code(&self, _: &mut Context<'_>, _: &mut BinaryClass) -> Result<(), Error> {
        Err(Error::Fault {
            pass: self.name(),
            message: String::from("cannot handle this class"),
        })
    }
}

struct Panicking;

impl Transformer for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn interface_stage(&self) -> Option<&dyn InterfaceTransformer> {
        Some(self)
    }
}

impl InterfaceTransformer for Panicking {
    fn transform_interface(&self, _: &mut Context<'_>, _: &mut BinaryClass) -> Result<(), Error> {
        panic!("unexpected class shape")
    }
}

fn isolated(pass: Box<dyn Transformer>) {
    init_logging();
    let pipeline = Pipeline::new(vec![Box::new(MetaDataStorage), pass]);
    let preprocessor = preprocessor(&[illegal_model()]).with_pipeline(pipeline);
    assert_eq!(preprocessor.pipeline().pass_names()[0], "metadata-storage");

    let bytes = customer_bytes();
    let output = preprocessor
        .preprocess("com.acme.Customer", &bytes, &loader())
        .unwrap();
    assert_eq!(output, bytes);
    assert!(preprocessor.state().is_empty());
}

#[test]
fn failing_passes_leave_the_class_unchanged() {
    isolated(Box::new(Failing));
}

#[test]
fn panicking_passes_leave_the_class_unchanged() {
    isolated(Box::new(Panicking));
}

#[test]
fn constructors_without_a_super_call_leave_the_class_unchanged() {
    init_logging();
    let mut class = BinaryClass::new(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        "com/acme/Customer",
        Some("java/lang/Object"),
    )
    .unwrap();
    let mut init = MethodBody::new();
    init.push_branch(BranchInstruction::Return);
    add_method(&mut class, MethodAccessFlags::PUBLIC, "<init>", "()V", init);
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC,
        "doSomethingIllegal",
        "(I)V",
        trivial_body("(I)V"),
    );
    let bytes = class.serialize().unwrap();

    // The member method pass alone, then the whole pipeline
    let alone = preprocessor(&[illegal_model()])
        .with_pipeline(Pipeline::new(vec![Box::new(MemberMethodAdvice)]));
    let standard = preprocessor(&[illegal_model()]);
    for preprocessor in &[alone, standard] {
        let output = preprocessor
            .preprocess("com.acme.Customer", &bytes, &loader())
            .unwrap();
        assert_eq!(output, bytes);
        assert!(preprocessor.state().is_empty());
    }
}

#[test]
fn malformed_classes_are_reported() {
    init_logging();
    let preprocessor = preprocessor(&[illegal_model()]);
    let garbage = vec![0xca, 0xfe, 0xba, 0xbe, 0x00];
    let result = preprocessor.preprocess("com.acme.Customer", &garbage, &loader());
    assert!(matches!(result, Err(Error::ClassFormat(_))));

    let output = preprocessor.preprocess_or_original("com.acme.Customer", &garbage, &loader());
    assert_eq!(output, garbage);
}

#[test]
fn missing_introduction_implementations_are_reported() {
    init_logging();
    let definition = WeaveDefinition::new("ab12")
        .introduction("tracking", "com.acme.Tracked", Some("com.acme.TrackedImpl"))
        .aspect(AspectDefinition::new("tracker").introduce("com.acme.Customer", &["tracking"]));
    let preprocessor = preprocessor(&[definition]);
    let result = preprocessor.preprocess(
        "com.acme.Customer",
        &customer_bytes(),
        &InMemoryClassLoader::new("empty"),
    );
    assert!(matches!(
        result,
        Err(Error::Definition(
            DefinitionError::UnresolvableImplementation { .. }
        ))
    ));
}

#[test]
fn woven_classes_are_dumped() {
    init_logging();
    let directory = tempfile::tempdir().unwrap();
    let mut settings = Settings::new();
    settings.dump_directory = Some(directory.path().to_owned());
    settings.dump_before = true;

    let original = customer_bytes();
    let woven = preprocessor_with(settings, &[illegal_model()])
        .preprocess("com.acme.Customer", &original, &loader())
        .unwrap();

    let after = directory.path().join("com/acme/Customer.class");
    let before = directory.path().join("_before/com/acme/Customer.class");
    assert_eq!(std::fs::read(after).unwrap(), woven);
    assert_eq!(std::fs::read(before).unwrap(), original);
}

#[test]
fn dump_patterns_select_classes() {
    init_logging();
    let directory = tempfile::tempdir().unwrap();
    let settings = Settings::from_vars(|name| match name {
        Settings::DUMP_DIR_VAR => Some(directory.path().display().to_string()),
        Settings::DUMP_PATTERN_VAR => Some(String::from("com.other.*")),
        _ => None,
    })
    .unwrap();

    preprocessor_with(settings, &[illegal_model()])
        .preprocess("com.acme.Customer", &customer_bytes(), &loader())
        .unwrap();
    assert!(!directory.path().join("com/acme/Customer.class").exists());
}
