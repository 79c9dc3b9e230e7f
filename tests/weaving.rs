mod common;

use common::*;
use jweave::jvm::class_file::{Constant, ConstantIndex, Version};
use jweave::jvm::code::{BranchInstruction, CodeElement, Instruction, InvokeType, MethodBody};
use jweave::jvm::model::BinaryClass;
use jweave::jvm::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use jweave::model::{AspectDefinition, PointcutKind, WeaveDefinition};
use jweave::transform::{default_serial_version_uid, naming};
use jweave::Settings;

const UUID: &str = "ab12";

fn logging_model(aspect: AspectDefinition) -> WeaveDefinition {
    WeaveDefinition::new(UUID)
        .advice("log", "com.acme.LoggingAdvice")
        .aspect(aspect)
}

fn woven(definition: WeaveDefinition, class: &BinaryClass) -> BinaryClass {
    woven_with(Settings::new(), definition, class)
}

fn woven_with(settings: Settings, definition: WeaveDefinition, class: &BinaryClass) -> BinaryClass {
    init_logging();
    let bytes = class.serialize().unwrap();
    let preprocessor = preprocessor_with(settings, &[definition]);
    let output = preprocessor
        .preprocess(class.name(), &bytes, &loader())
        .unwrap();
    assert_ne!(output, bytes, "{} was not woven", class.name());
    BinaryClass::parse(&output).unwrap()
}

fn customer() -> BinaryClass {
    let mut class = class("com/acme/Customer");
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC,
        "doSomethingIllegal",
        "(I)V",
        trivial_body("(I)V"),
    );
    class
}

fn illegal_aspect() -> AspectDefinition {
    AspectDefinition::new("audit")
        .pointcut(
            "illegal",
            PointcutKind::Method,
            "com.acme.Customer",
            "void doSomethingIllegal(int)",
        )
        .advise("illegal", &["log"])
}

#[test]
fn advised_methods_are_routed_through_join_points() {
    let woven = woven(logging_model(illegal_aspect()), &customer());

    let original = naming::original_method(UUID, "doSomethingIllegal", 0);
    assert_eq!(original, "___jw$original$ab12$doSomethingIllegal$0");
    let proxy = woven.find_method("doSomethingIllegal", "(I)V").unwrap();
    let moved = woven.find_method(&original, "(I)V").unwrap();
    assert!(woven.methods()[proxy]
        .access_flags
        .contains(MethodAccessFlags::PUBLIC));
    let flags = woven.methods()[moved].access_flags;
    assert!(flags.contains(MethodAccessFlags::PRIVATE));
    assert!(!flags.contains(MethodAccessFlags::PUBLIC));

    let holder = naming::method_join_point(UUID, "doSomethingIllegal", 0);
    let field = woven.find_field_named(&holder).unwrap();
    assert_eq!(field.descriptor(), "Ljava/lang/ThreadLocal;");
    assert!(field.access_flags.contains(FieldAccessFlags::TRANSIENT));
    assert!(created_classes(&woven, "<init>", "()V")
        .contains(&String::from("java/lang/ThreadLocal")));

    let calls = call_names(&woven, "doSomethingIllegal", "(I)V");
    let position = |name: &str| calls.iter().position(|call| call == name).unwrap();
    assert!(position("get") < position("set"));
    assert!(position("set") < position("setParameters"));
    assert!(position("setParameters") < position("proceed"));
    assert!(created_classes(&woven, "doSomethingIllegal", "(I)V")
        .contains(&String::from("org/jweave/runtime/MemberMethodJoinPoint")));

    let body = woven.instructions_of(proxy).unwrap().unwrap();
    assert_eq!(body.frames.len(), 1);
    let body = woven.instructions_of(moved).unwrap().unwrap();
    assert!(matches!(
        body.elements.last(),
        Some(CodeElement::Branch(BranchInstruction::Return))
    ));
}

fn attribute_names(class: &BinaryClass, index: usize) -> Vec<String> {
    class.methods()[index]
        .attributes
        .iter()
        .map(|attr| attr.name(&class.constants).unwrap().to_owned())
        .collect()
}

#[test]
fn advised_methods_keep_their_annotations() {
    let mut customer = customer();
    let index = customer.find_method("doSomethingIllegal", "(I)V").unwrap();
    customer
        .add_method_attribute(index, "RuntimeVisibleAnnotations", vec![0, 0])
        .unwrap();
    let woven = woven(logging_model(illegal_aspect()), &customer);

    let proxy = woven.find_method("doSomethingIllegal", "(I)V").unwrap();
    let original = naming::original_method(UUID, "doSomethingIllegal", 0);
    let moved = woven.find_method(&original, "(I)V").unwrap();
    assert!(attribute_names(&woven, proxy).contains(&String::from("RuntimeVisibleAnnotations")));
    assert!(attribute_names(&woven, moved).contains(&String::from("RuntimeVisibleAnnotations")));
}

#[test]
fn old_classes_get_no_stack_map_frames() {
    let mut class = class_with_version("com/acme/Customer", Version::JAVA1_4);
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC,
        "doSomethingIllegal",
        "(I)V",
        trivial_body("(I)V"),
    );
    let woven = woven(logging_model(illegal_aspect()), &class);
    let proxy = woven.find_method("doSomethingIllegal", "(I)V").unwrap();
    let body = woven.instructions_of(proxy).unwrap().unwrap();
    assert!(body.frames.is_empty());
}

#[test]
fn static_methods_use_static_join_points() {
    let mut class = class("com/acme/Registry");
    let descriptor = "(Ljava/lang/String;)Ljava/lang/Object;";
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "lookup",
        descriptor,
        trivial_body(descriptor),
    );
    let aspect = AspectDefinition::new("audit")
        .pointcut(
            "lookups",
            PointcutKind::Method,
            "com.acme.Registry",
            "java.lang.Object lookup(java.lang.String)",
        )
        .advise("lookups", &["log"]);
    let woven = woven(logging_model(aspect), &class);

    let original = naming::original_method(UUID, "lookup", 0);
    let moved = woven.find_method(&original, descriptor).unwrap();
    assert!(woven.methods()[moved].is_static());
    let holder = woven
        .find_field_named(&naming::method_join_point(UUID, "lookup", 0))
        .unwrap();
    assert!(holder.is_static());
    assert!(created_classes(&woven, "<clinit>", "()V")
        .contains(&String::from("java/lang/ThreadLocal")));
    assert!(created_classes(&woven, "lookup", descriptor)
        .contains(&String::from("org/jweave/runtime/StaticMethodJoinPoint")));
}

#[test]
fn overloads_are_numbered_in_declaration_order() {
    let mut class = class("com/acme/Printer");
    add_method(&mut class, MethodAccessFlags::PUBLIC, "print", "()V", trivial_body("()V"));
    add_method(&mut class, MethodAccessFlags::PUBLIC, "print", "(I)V", trivial_body("(I)V"));
    let aspect = AspectDefinition::new("audit")
        .pointcut("plain", PointcutKind::Method, "com.acme.Printer", "void print()")
        .pointcut("numbered", PointcutKind::Method, "com.acme.Printer", "void print(int)")
        .advise("plain", &["log"])
        .advise("numbered", &["log"]);
    let woven = woven(logging_model(aspect), &class);

    assert!(woven
        .find_method(&naming::original_method(UUID, "print", 0), "()V")
        .is_some());
    assert!(woven
        .find_method(&naming::original_method(UUID, "print", 1), "(I)V")
        .is_some());
    let fields = field_names(&woven);
    assert!(fields.contains(&naming::method_join_point(UUID, "print", 0)));
    assert!(fields.contains(&naming::method_join_point(UUID, "print", 1)));
}

#[test]
fn field_accesses_are_wrapped() {
    let mut class = class("com/acme/Account");
    add_field(&mut class, FieldAccessFlags::PRIVATE, "balance", "I");
    let balance = class
        .constants
        .get_field_ref("com/acme/Account", "balance", "I")
        .unwrap();
    let mut body = MethodBody::new();
    body.push_instruction(Instruction::ALoad(0));
    body.push_instruction(Instruction::ALoad(0));
    body.push_instruction(Instruction::GetField(balance));
    body.push_instruction(Instruction::ILoad(1));
    body.push_instruction(Instruction::IAdd);
    body.push_instruction(Instruction::PutField(balance));
    body.push_branch(BranchInstruction::Return);
    add_method(&mut class, MethodAccessFlags::PUBLIC, "deposit", "(I)V", body);

    let aspect = AspectDefinition::new("audit")
        .pointcut("reads", PointcutKind::GetField, "com.acme.Account", "int balance")
        .pointcut("writes", PointcutKind::SetField, "com.acme.Account", "int balance")
        .advise("reads", &["log"])
        .advise("writes", &["log"]);
    let woven = woven(logging_model(aspect), &class);

    assert_eq!(
        call_names(&woven, "deposit", "(I)V"),
        vec!["pre", "post", "pre", "post"]
    );
    let fields = field_names(&woven);
    assert!(fields.contains(&naming::get_field_join_point(UUID, "balance")));
    assert!(fields.contains(&naming::set_field_join_point(UUID, "balance")));
    let created = created_classes(&woven, "<init>", "()V");
    assert!(created.contains(&String::from("org/jweave/runtime/MemberFieldGetJoinPoint")));
    assert!(created.contains(&String::from("org/jweave/runtime/MemberFieldSetJoinPoint")));
}

#[test]
fn static_field_accesses_are_wrapped() {
    let mut class = class("com/acme/Sequence");
    add_field(
        &mut class,
        FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC,
        "counter",
        "I",
    );
    let counter = class
        .constants
        .get_field_ref("com/acme/Sequence", "counter", "I")
        .unwrap();
    let mut body = MethodBody::new();
    body.push_instruction(Instruction::GetStatic(counter));
    body.push_instruction(Instruction::IConst1);
    body.push_instruction(Instruction::IAdd);
    body.push_instruction(Instruction::Dup);
    body.push_instruction(Instruction::PutStatic(counter));
    body.push_branch(BranchInstruction::IReturn);
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "next",
        "()I",
        body,
    );

    let aspect = AspectDefinition::new("audit")
        .pointcut("writes", PointcutKind::SetField, "com.acme.Sequence", "int counter")
        .advise("writes", &["log"]);
    let woven = woven(logging_model(aspect), &class);

    assert_eq!(call_names(&woven, "next", "()I"), vec!["pre", "post"]);
    let holder = woven
        .find_field_named(&naming::set_field_join_point(UUID, "counter"))
        .unwrap();
    assert!(holder.is_static());
    assert!(woven
        .find_field_named(&naming::get_field_join_point(UUID, "counter"))
        .is_none());
    assert_eq!(
        created_classes(&woven, "<clinit>", "()V"),
        vec!["org/jweave/runtime/StaticFieldSetJoinPoint"]
    );
}

#[test]
fn call_sites_are_wrapped() {
    let mut class = class("com/acme/Teller");
    let transfer = class
        .constants
        .get_method_ref("com/acme/Bank", "transfer", "(J)V", false)
        .unwrap();
    let mut body = MethodBody::new();
    body.push_instruction(Instruction::ALoad(1));
    body.push_instruction(Instruction::LLoad(2));
    body.push_instruction(Instruction::Invoke(InvokeType::Virtual, transfer));
    body.push_instruction(Instruction::ALoad(1));
    body.push_instruction(Instruction::LLoad(2));
    body.push_instruction(Instruction::Invoke(InvokeType::Virtual, transfer));
    body.push_branch(BranchInstruction::Return);
    add_method(&mut class, MethodAccessFlags::PUBLIC, "pay", "(Lcom/acme/Bank;J)V", body);

    let aspect = AspectDefinition::new("audit")
        .pointcut(
            "transfers",
            PointcutKind::CallerSide,
            "com.acme.Teller",
            "com.acme.Bank#void transfer(long)",
        )
        .advise("transfers", &["log"]);
    let woven = woven(logging_model(aspect), &class);

    assert_eq!(
        call_names(&woven, "pay", "(Lcom/acme/Bank;J)V"),
        vec![
            "invokePreAdvices",
            "transfer",
            "invokePostAdvices",
            "invokePreAdvices",
            "transfer",
            "invokePostAdvices",
        ]
    );
    let holder = naming::caller_join_point(UUID, "com/acme/Bank", "transfer", 0);
    assert!(woven.find_field_named(&holder).unwrap().is_static());
    assert_eq!(
        created_classes(&woven, "<clinit>", "()V"),
        vec!["org/jweave/runtime/CallerSideJoinPoint"]
    );
}

fn tracked_impl() -> BinaryClass {
    let mut class = class("com/acme/TrackedImpl");
    for descriptor in &["(Ljava/lang/String;I)V", "(I)V"] {
        let body = trivial_body(descriptor);
        add_method(&mut class, MethodAccessFlags::PUBLIC, "track", descriptor, body);
    }
    add_method(&mut class, MethodAccessFlags::PUBLIC, "reset", "()V", trivial_body("()V"));
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "create",
        "()Lcom/acme/TrackedImpl;",
        trivial_body("()Lcom/acme/TrackedImpl;"),
    );
    class
}

fn tracking_model() -> WeaveDefinition {
    WeaveDefinition::new(UUID)
        .introduction("tracking", "com.acme.Tracked", Some("com.acme.TrackedImpl"))
        .aspect(AspectDefinition::new("tracker").introduce("com.acme.Order", &["tracking"]))
}

#[test]
fn introductions_add_interfaces_and_delegating_methods() {
    init_logging();
    let order = class("com/acme/Order");
    let bytes = order.serialize().unwrap();
    let loader = loader();
    loader.define("com/acme/TrackedImpl", tracked_impl().serialize().unwrap());
    let output = preprocessor(&[tracking_model()])
        .preprocess("com.acme.Order", &bytes, &loader)
        .unwrap();
    let woven = BinaryClass::parse(&output).unwrap();

    assert!(woven.has_interface("com/acme/Tracked"));
    assert!(woven.find_method("create", "()Lcom/acme/TrackedImpl;").is_none());
    for (name, descriptor) in &[
        ("reset", "()V"),
        ("track", "(I)V"),
        ("track", "(Ljava/lang/String;I)V"),
    ] {
        let index = woven.find_method(name, descriptor).unwrap();
        assert!(woven.methods()[index]
            .access_flags
            .contains(MethodAccessFlags::PUBLIC));
        assert_eq!(
            calls(&woven, name, descriptor).last().unwrap(),
            &(
                String::from("org/jweave/runtime/IntroductionRegistry"),
                String::from("invoke"),
                String::from(
                    "(Ljava/lang/String;IILjava/lang/Object;[Ljava/lang/Object;)Ljava/lang/Object;"
                ),
            )
        );
    }

    // Methods are numbered reset, track(int), track(String, int)
    let index = woven.find_method("track", "(I)V").unwrap();
    let body = woven.instructions_of(index).unwrap().unwrap();
    let constants: Vec<&Instruction> = body
        .elements
        .iter()
        .filter_map(|element| match element {
            CodeElement::Instruction(insn @ (Instruction::IConst0 | Instruction::IConst1)) => {
                Some(insn)
            }
            _ => None,
        })
        .collect();
    assert_eq!(constants[..2], [&Instruction::IConst0, &Instruction::IConst1]);
}

#[test]
fn introduced_overloads_are_ordered_by_parameter_type_name() {
    init_logging();
    let mut implementation = class("com/acme/TrackedImpl");
    for descriptor in &["(I)V", "(J)V", "(Lcom/acme/Item;)V", "(Z)V"] {
        let body = trivial_body(descriptor);
        add_method(&mut implementation, MethodAccessFlags::PUBLIC, "m", descriptor, body);
    }
    let loader = loader();
    loader.define("com/acme/TrackedImpl", implementation.serialize().unwrap());
    let bytes = class("com/acme/Order").serialize().unwrap();
    let output = preprocessor(&[tracking_model()])
        .preprocess("com.acme.Order", &bytes, &loader)
        .unwrap();
    let woven = BinaryClass::parse(&output).unwrap();

    let introduced: Vec<&str> = woven
        .methods()
        .iter()
        .filter(|method| method.name() == "m")
        .map(|method| method.descriptor())
        .collect();
    assert_eq!(
        introduced,
        vec!["(Z)V", "(Lcom/acme/Item;)V", "(I)V", "(J)V"]
    );
}

#[test]
fn serializable_classes_keep_their_serial_version_uid() {
    let mut class = customer();
    class.add_interface("java/io/Serializable").unwrap();
    let expected = default_serial_version_uid(&class).unwrap();

    let woven = woven(logging_model(illegal_aspect()), &class);
    let field = woven.find_field_named("serialVersionUID").unwrap();
    assert_eq!(field.descriptor(), "J");
    assert!(field
        .access_flags
        .contains(FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL));
    let pinned = (1..=u16::MAX)
        .filter_map(|index| woven.constants.get(ConstantIndex(index)).ok())
        .any(|constant| matches!(constant, Constant::Long(uid) if *uid == expected));
    assert!(pinned);
}

#[test]
fn plain_classes_get_no_serial_version_uid() {
    let woven = woven(logging_model(illegal_aspect()), &customer());
    assert!(woven.find_field_named("serialVersionUID").is_none());
}

#[test]
fn advised_classes_get_metadata_and_identity() {
    let woven = woven(logging_model(illegal_aspect()), &customer());

    assert!(woven.has_interface("org/jweave/runtime/MetaDataEnhanceable"));
    assert!(woven.has_interface("org/jweave/runtime/Identifiable"));
    let fields = field_names(&woven);
    assert!(fields.contains(&String::from(naming::METADATA_FIELD)));
    assert!(fields.contains(&String::from(naming::UUID_FIELD)));
    assert!(woven
        .find_method(naming::GET_METADATA_METHOD, "(Ljava/lang/Object;)Ljava/lang/Object;")
        .is_some());
    assert!(woven
        .find_method(
            naming::ADD_METADATA_METHOD,
            "(Ljava/lang/Object;Ljava/lang/Object;)V"
        )
        .is_some());
    assert!(woven
        .find_method(naming::GET_UUID_METHOD, "()Ljava/lang/String;")
        .is_some());

    assert!(created_classes(&woven, "<init>", "()V").contains(&String::from("java/util/HashMap")));
    assert!(calls(&woven, "<init>", "()V").contains(&(
        String::from("org/jweave/runtime/Identity"),
        String::from("generate"),
        String::from("(Ljava/lang/Object;)Ljava/lang/String;"),
    )));
}

#[test]
fn metadata_and_identity_can_be_turned_off() {
    let mut settings = Settings::new();
    settings.metadata_storage = false;
    settings.identity = false;
    let woven = woven_with(settings, logging_model(illegal_aspect()), &customer());

    assert!(!woven.has_interface("org/jweave/runtime/MetaDataEnhanceable"));
    assert!(!woven.has_interface("org/jweave/runtime/Identifiable"));
    let fields = field_names(&woven);
    assert!(!fields.contains(&String::from(naming::METADATA_FIELD)));
    assert!(!fields.contains(&String::from(naming::UUID_FIELD)));
}

#[test]
fn interfaces_are_left_alone() {
    init_logging();
    let mut class = BinaryClass::new(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
        "com/acme/Customer",
        Some("java/lang/Object"),
    )
    .unwrap();
    class
        .add_method(jweave::jvm::model::MethodSpec {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            name: String::from("doSomethingIllegal"),
            descriptor: String::from("(I)V"),
            body: None,
            exceptions: vec![],
        })
        .unwrap();
    let bytes = class.serialize().unwrap();
    let output = preprocessor(&[logging_model(illegal_aspect())])
        .preprocess("com.acme.Customer", &bytes, &loader())
        .unwrap();
    assert_eq!(output, bytes);
}
