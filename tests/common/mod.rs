#![allow(dead_code)]

use jweave::jvm::class_file::Version;
use jweave::jvm::code::{BranchInstruction, CodeElement, Instruction, InvokeType, MethodBody};
use jweave::jvm::model::{BinaryClass, FieldSpec, MethodSpec};
use jweave::jvm::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use jweave::metadata::InMemoryClassLoader;
use jweave::model::{WeaveDefinition, WeaveModelRegistry};
use jweave::{Preprocessor, Settings};
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn loader() -> InMemoryClassLoader {
    InMemoryClassLoader::new("app")
}

/// Public class with a no-argument constructor calling `super()`
pub fn class(name: &str) -> BinaryClass {
    class_with_version(name, Version::JAVA8)
}

pub fn class_with_version(name: &str, version: Version) -> BinaryClass {
    let mut class = BinaryClass::new(
        version,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        name,
        Some("java/lang/Object"),
    )
    .unwrap();
    let init = class
        .constants
        .get_method_ref("java/lang/Object", "<init>", "()V", false)
        .unwrap();
    let mut body = MethodBody::new();
    body.push_instruction(Instruction::ALoad(0));
    body.push_instruction(Instruction::Invoke(InvokeType::Special, init));
    body.push_branch(BranchInstruction::Return);
    add_method(&mut class, MethodAccessFlags::PUBLIC, "<init>", "()V", body);
    class
}

pub fn add_method(
    class: &mut BinaryClass,
    access_flags: MethodAccessFlags,
    name: &str,
    descriptor: &str,
    body: MethodBody,
) {
    class
        .add_method(MethodSpec {
            access_flags,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            body: Some(body),
            exceptions: vec![],
        })
        .unwrap();
}

pub fn add_field(class: &mut BinaryClass, access_flags: FieldAccessFlags, name: &str, desc: &str) {
    class
        .add_field(FieldSpec {
            access_flags,
            name: name.to_owned(),
            descriptor: desc.to_owned(),
            constant_value: None,
        })
        .unwrap();
}

/// Method that does nothing, returning the default value of its return type
pub fn trivial_body(descriptor: &str) -> MethodBody {
    let mut body = MethodBody::new();
    let returns = &descriptor[descriptor.find(')').unwrap() + 1..];
    match returns {
        "V" => (),
        "J" => body.push_instruction(Instruction::LConst0),
        "F" => body.push_instruction(Instruction::FConst0),
        "D" => body.push_instruction(Instruction::DConst0),
        "Z" | "B" | "C" | "S" | "I" => body.push_instruction(Instruction::IConst0),
        _ => body.push_instruction(Instruction::AConstNull),
    }
    body.push_branch(match returns {
        "V" => BranchInstruction::Return,
        "J" => BranchInstruction::LReturn,
        "F" => BranchInstruction::FReturn,
        "D" => BranchInstruction::DReturn,
        "Z" | "B" | "C" | "S" | "I" => BranchInstruction::IReturn,
        _ => BranchInstruction::AReturn,
    });
    body
}

pub fn preprocessor(definitions: &[WeaveDefinition]) -> Preprocessor {
    preprocessor_with(Settings::new(), definitions)
}

pub fn preprocessor_with(settings: Settings, definitions: &[WeaveDefinition]) -> Preprocessor {
    let registry = WeaveModelRegistry::new();
    for definition in definitions {
        registry.register(definition).unwrap();
    }
    Preprocessor::new(settings, Arc::new(registry))
}

/// Calls made by a method, as (callee class, name, descriptor)
pub fn calls(class: &BinaryClass, name: &str, descriptor: &str) -> Vec<(String, String, String)> {
    let index = class
        .find_method(name, descriptor)
        .unwrap_or_else(|| panic!("no method {}{}", name, descriptor));
    let body = class.instructions_of(index).unwrap().unwrap();
    body.elements
        .iter()
        .filter_map(|element| match element {
            CodeElement::Instruction(Instruction::Invoke(_, method)) => {
                let method = class.constants.member_ref((*method).into()).unwrap();
                Some((
                    method.class.to_owned(),
                    method.name.to_owned(),
                    method.descriptor.to_owned(),
                ))
            }
            _ => None,
        })
        .collect()
}

/// Names of the methods called by a method, in order
pub fn call_names(class: &BinaryClass, name: &str, descriptor: &str) -> Vec<String> {
    calls(class, name, descriptor)
        .into_iter()
        .map(|(_, name, _)| name)
        .collect()
}

/// Classes instantiated by a method, in order
pub fn created_classes(class: &BinaryClass, name: &str, descriptor: &str) -> Vec<String> {
    let index = class.find_method(name, descriptor).unwrap();
    let body = class.instructions_of(index).unwrap().unwrap();
    body.elements
        .iter()
        .filter_map(|element| match element {
            CodeElement::Instruction(Instruction::New(created)) => {
                Some(class.constants.class_name(*created).unwrap().to_owned())
            }
            _ => None,
        })
        .collect()
}

pub fn field_names(class: &BinaryClass) -> Vec<String> {
    class
        .fields()
        .iter()
        .map(|field| field.name().to_owned())
        .collect()
}

pub fn method_names(class: &BinaryClass) -> Vec<String> {
    class
        .methods()
        .iter()
        .map(|method| method.name().to_owned())
        .collect()
}
