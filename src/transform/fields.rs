use super::codegen::{
    insert_in_constructors, insert_in_static_initializer, CodeBuilder, FieldRef,
};
use super::{naming, runtime, CodeTransformer, Context, Transformer};
use crate::jvm::code::{CodeElement, Instruction, InvokeType};
use crate::jvm::model::{BinaryClass, FieldSpec};
use crate::jvm::{self, FieldAccessFlags, FieldRefConstantIndex};
use crate::metadata::RESERVED_PREFIX;
use crate::Error;
use log::debug;
use std::collections::BTreeMap;

/// Wraps reads and writes of advised instance fields with join point calls
///
/// Accesses in instance methods (constructors excluded) to the class's own fields are bracketed
/// by `pre()` and `post()` calls on a join point held in a field, one per advised field and
/// access kind, created in every constructor.
pub struct MemberFieldAdvice;

/// Same as [`MemberFieldAdvice`] for static fields, accessed from anywhere but the static
/// initializer, with join points created in the static initializer
pub struct StaticFieldAdvice;

impl Transformer for MemberFieldAdvice {
    fn name(&self) -> &'static str {
        "member-field-advice"
    }

    fn code_stage(&self) -> Option<&dyn CodeTransformer> {
        Some(self)
    }
}

impl CodeTransformer for MemberFieldAdvice {
    fn transform_code(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        advise_field_accesses(self.name(), false, context, class)
    }
}

impl Transformer for StaticFieldAdvice {
    fn name(&self) -> &'static str {
        "static-field-advice"
    }

    fn code_stage(&self) -> Option<&dyn CodeTransformer> {
        Some(self)
    }
}

impl CodeTransformer for StaticFieldAdvice {
    fn transform_code(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        advise_field_accesses(self.name(), true, context, class)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Access {
    Get,
    Set,
}

/// Join point field guarding one kind of access to one field
#[derive(Debug)]
struct JoinPointField {
    name: String,
    join_point_class: &'static str,
    signature: String,
    used: bool,
}

impl JoinPointField {
    fn descriptor(&self) -> String {
        format!("L{};", self.join_point_class)
    }
}

fn advise_field_accesses(
    pass: &'static str,
    is_static: bool,
    context: &mut Context<'_>,
    class: &mut BinaryClass,
) -> Result<(), Error> {
    let model = context.model();
    let snapshot = context.class_metadata();
    if class.is_interface()
        || !(model.has_get_field_pointcut_in_class(&snapshot)
            || model.has_set_field_pointcut_in_class(&snapshot))
    {
        return Ok(());
    }

    let uuid = context.uuid();
    let get_prefix = naming::get_field_join_point_prefix(uuid);
    let set_prefix = naming::set_field_join_point_prefix(uuid);
    let already_advised = class.fields().iter().any(|field| {
        field.is_static() == is_static
            && (field.name().starts_with(&get_prefix) || field.name().starts_with(&set_prefix))
    });
    if already_advised {
        debug!("{}: fields of '{}' are already advised", pass, class.name());
        return Ok(());
    }

    // (field name, descriptor, access) to the join point guarding it
    let mut join_points: BTreeMap<(String, String, Access), JoinPointField> = BTreeMap::new();
    for field in snapshot.fields().iter().filter(|field| field.is_static() == is_static) {
        let descriptor = match field.field_type().descriptor() {
            Some(descriptor) => descriptor,
            None => continue,
        };
        let signature = runtime::field_signature(field.name(), &descriptor);
        if model.has_get_field_pointcut(&snapshot, field) {
            join_points.insert(
                (field.name().to_owned(), descriptor.clone(), Access::Get),
                JoinPointField {
                    name: naming::get_field_join_point(uuid, field.name()),
                    join_point_class: if is_static {
                        runtime::STATIC_FIELD_GET_JOIN_POINT
                    } else {
                        runtime::MEMBER_FIELD_GET_JOIN_POINT
                    },
                    signature: signature.clone(),
                    used: false,
                },
            );
        }
        if model.has_set_field_pointcut(&snapshot, field) {
            join_points.insert(
                (field.name().to_owned(), descriptor, Access::Set),
                JoinPointField {
                    name: naming::set_field_join_point(uuid, field.name()),
                    join_point_class: if is_static {
                        runtime::STATIC_FIELD_SET_JOIN_POINT
                    } else {
                        runtime::MEMBER_FIELD_SET_JOIN_POINT
                    },
                    signature,
                    used: false,
                },
            );
        }
    }
    if join_points.is_empty() {
        return Ok(());
    }

    let class_name = class.name().to_owned();
    let candidates: Vec<usize> = class
        .methods()
        .iter()
        .enumerate()
        .filter(|(_, method)| {
            !method.is_static_initializer()
                && !method.is_abstract_or_native()
                && !method.name().starts_with(RESERVED_PREFIX)
                && (is_static || (!method.is_static() && !method.is_constructor()))
        })
        .map(|(index, _)| index)
        .collect();

    for index in candidates {
        let mut body = match class.instructions_of(index)? {
            Some(body) => body,
            None => continue,
        };
        let mut elements = Vec::with_capacity(body.elements.len());
        let mut wrapped = 0;
        for element in body.elements.drain(..) {
            let access = match &element {
                CodeElement::Instruction(insn) => field_access(insn, is_static),
                _ => None,
            };
            let key = match access {
                Some((field, access)) => {
                    let field = class.constants.member_ref(field.into())?;
                    if field.class != class_name {
                        None
                    } else {
                        Some((field.name.to_owned(), field.descriptor.to_owned(), access))
                    }
                }
                None => None,
            };
            let join_point = match key.and_then(|key| join_points.get_mut(&key)) {
                Some(join_point) => join_point,
                None => {
                    elements.push(element);
                    continue;
                }
            };

            join_point.used = true;
            let descriptor = join_point.descriptor();
            let holder = FieldRef {
                class: &class_name,
                name: &join_point.name,
                descriptor: &descriptor,
                is_static,
            };
            let mut code = CodeBuilder::new(&mut class.constants);
            call_join_point(&mut code, holder, join_point.join_point_class, runtime::PRE)?;
            elements.extend(code.into_elements());
            elements.push(element);
            let mut code = CodeBuilder::new(&mut class.constants);
            call_join_point(&mut code, holder, join_point.join_point_class, runtime::POST)?;
            elements.extend(code.into_elements());
            wrapped += 1;
        }
        body.elements = elements;
        if wrapped > 0 {
            debug!(
                "{}: wrapped {} field accesses in {}.{}",
                pass,
                wrapped,
                class_name,
                class.methods()[index].name()
            );
            class.set_instructions(index, body)?;
        }
    }

    let used: Vec<&JoinPointField> = join_points.values().filter(|jp| jp.used).collect();
    if used.is_empty() {
        return Ok(());
    }
    let mut flags = FieldAccessFlags::PRIVATE;
    flags |= if is_static {
        FieldAccessFlags::STATIC | FieldAccessFlags::FINAL
    } else {
        FieldAccessFlags::TRANSIENT
    };
    for join_point in &used {
        class.add_field(FieldSpec {
            access_flags: flags,
            name: join_point.name.clone(),
            descriptor: join_point.descriptor(),
            constant_value: None,
        })?;
    }

    let uuid = uuid.to_owned();
    let version = class.version;
    let create = |code: &mut CodeBuilder<'_>| -> Result<(), jvm::Error> {
        for join_point in &used {
            let descriptor = join_point.descriptor();
            let holder = FieldRef {
                class: &class_name,
                name: &join_point.name,
                descriptor: &descriptor,
                is_static,
            };
            if !is_static {
                code.push(Instruction::ALoad(0));
            }
            let init = if is_static {
                runtime::STATIC_JOIN_POINT_INIT
            } else {
                runtime::MEMBER_FIELD_JOIN_POINT_INIT
            };
            code.new_object(join_point.join_point_class, init, |code| {
                code.const_string(&uuid)?;
                if is_static {
                    code.const_class(&class_name, version)?;
                } else {
                    code.push(Instruction::ALoad(0));
                }
                code.const_string(&join_point.signature)
            })?;
            code.put_field(holder)?;
        }
        Ok(())
    };
    if is_static {
        insert_in_static_initializer(class, create)?;
    } else {
        let missing = insert_in_constructors(class, create)?;
        if let Some(descriptor) = missing.first() {
            return Err(Error::Fault {
                pass,
                message: format!(
                    "constructor {} of {} calls no other constructor",
                    descriptor, class_name
                ),
            });
        }
    }
    context.mark_advised();
    Ok(())
}

/// Field read or written by an instruction, if it is the kind of access the pass handles
fn field_access(insn: &Instruction, is_static: bool) -> Option<(FieldRefConstantIndex, Access)> {
    match (insn, is_static) {
        (Instruction::GetField(field), false) | (Instruction::GetStatic(field), true) => {
            Some((*field, Access::Get))
        }
        (Instruction::PutField(field), false) | (Instruction::PutStatic(field), true) => {
            Some((*field, Access::Set))
        }
        _ => None,
    }
}

/// Load a join point from its holder field and call a `()V` method on it
fn call_join_point(
    code: &mut CodeBuilder<'_>,
    holder: FieldRef<'_>,
    join_point_class: &str,
    (name, descriptor): (&str, &str),
) -> Result<(), Error> {
    if !holder.is_static {
        code.push(Instruction::ALoad(0));
    }
    code.get_field(holder)?;
    code.invoke(InvokeType::Virtual, join_point_class, name, descriptor)?;
    Ok(())
}
