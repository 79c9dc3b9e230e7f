use super::codegen::{insert_in_static_initializer, CodeBuilder, FieldRef};
use super::{naming, runtime, CodeTransformer, Context, Transformer};
use crate::jvm::code::{CodeElement, Instruction, InvokeType};
use crate::jvm::model::{BinaryClass, FieldSpec};
use crate::jvm::{self, FieldAccessFlags, MethodAccessFlags, UnqualifiedName};
use crate::metadata::{MethodMetaData, RESERVED_PREFIX};
use crate::Error;
use log::debug;
use std::collections::HashMap;

/// Wraps advised call sites with caller side join point calls
///
/// Every call is checked against the caller side pointcuts, using the callee class named in the
/// call instruction. Matching calls are bracketed by `invokePreAdvices()` and
/// `invokePostAdvices()` on a static join point, one per callee overload, created in the static
/// initializer.
pub struct CallerSideAdvice;

impl Transformer for CallerSideAdvice {
    fn name(&self) -> &'static str {
        "caller-side-advice"
    }

    fn code_stage(&self) -> Option<&dyn CodeTransformer> {
        Some(self)
    }
}

/// Static field holding the join point of one callee overload
struct CallerJoinPoint {
    field: String,
    signature: String,
}

impl CodeTransformer for CallerSideAdvice {
    fn transform_code(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        let model = context.model();
        let snapshot = context.class_metadata();
        if class.is_interface() || !model.has_caller_side_pointcut_in_class(&snapshot) {
            return Ok(());
        }
        let uuid = context.uuid();
        let prefix = naming::caller_join_point_prefix(uuid);
        if class.fields().iter().any(|field| field.name().starts_with(&prefix)) {
            debug!("{}: calls in '{}' are already advised", self.name(), class.name());
            return Ok(());
        }

        let class_name = class.name().to_owned();
        let descriptor = format!("L{};", runtime::CALLER_SIDE_JOIN_POINT);
        // (callee class, name, descriptor) to its join point, in order of first appearance
        let mut join_points: HashMap<(String, String, String), usize> = HashMap::new();
        let mut ordered: Vec<CallerJoinPoint> = vec![];
        // Overloads seen so far per (callee class, name)
        let mut overloads: HashMap<(String, String), usize> = HashMap::new();

        let candidates: Vec<usize> = class
            .methods()
            .iter()
            .enumerate()
            .filter(|(_, method)| {
                !method.is_abstract_or_native() && !method.name().starts_with(RESERVED_PREFIX)
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
                let (typ, method) = match &element {
                    CodeElement::Instruction(Instruction::Invoke(typ, method)) => (*typ, *method),
                    _ => {
                        elements.push(element);
                        continue;
                    }
                };
                let callee = class.constants.member_ref(method.into())?;
                let skipped = callee.class.starts_with('[')
                    || runtime::is_runtime_class(callee.class)
                    || (typ == InvokeType::Special
                        && callee.name == UnqualifiedName::INIT.as_str());
                let modifiers = if typ == InvokeType::Static {
                    MethodAccessFlags::STATIC
                } else {
                    MethodAccessFlags::empty()
                };
                let advised = !skipped
                    && model.has_caller_side_pointcut(
                        &snapshot,
                        &callee.class.replace('/', "."),
                        &MethodMetaData::from_descriptor(
                            callee.name,
                            callee.descriptor,
                            modifiers,
                        )?,
                    );
                if !advised {
                    elements.push(element);
                    continue;
                }

                let key = (
                    callee.class.to_owned(),
                    callee.name.to_owned(),
                    callee.descriptor.to_owned(),
                );
                let position = match join_points.get(&key) {
                    Some(position) => *position,
                    None => {
                        let sequence = overloads
                            .entry((key.0.clone(), key.1.clone()))
                            .or_insert(0);
                        ordered.push(CallerJoinPoint {
                            field: naming::caller_join_point(uuid, &key.0, &key.1, *sequence),
                            signature: runtime::call_signature(&key.0, &key.1, &key.2),
                        });
                        *sequence += 1;
                        join_points.insert(key, ordered.len() - 1);
                        ordered.len() - 1
                    }
                };

                let holder = FieldRef {
                    class: &class_name,
                    name: &ordered[position].field,
                    descriptor: &descriptor,
                    is_static: true,
                };
                let mut code = CodeBuilder::new(&mut class.constants);
                code.get_field(holder)?;
                let (name, pre) = runtime::INVOKE_PRE_ADVICES;
                code.invoke(InvokeType::Virtual, runtime::CALLER_SIDE_JOIN_POINT, name, pre)?;
                elements.extend(code.into_elements());
                elements.push(element);
                let mut code = CodeBuilder::new(&mut class.constants);
                code.get_field(holder)?;
                let (name, post) = runtime::INVOKE_POST_ADVICES;
                code.invoke(InvokeType::Virtual, runtime::CALLER_SIDE_JOIN_POINT, name, post)?;
                elements.extend(code.into_elements());
                wrapped += 1;
            }
            body.elements = elements;
            if wrapped > 0 {
                debug!(
                    "{}: wrapped {} calls in {}.{}",
                    self.name(),
                    wrapped,
                    class_name,
                    class.methods()[index].name()
                );
                class.set_instructions(index, body)?;
            }
        }
        if ordered.is_empty() {
            return Ok(());
        }

        for join_point in &ordered {
            class.add_field(FieldSpec {
                access_flags: FieldAccessFlags::PRIVATE
                    | FieldAccessFlags::STATIC
                    | FieldAccessFlags::FINAL,
                name: join_point.field.clone(),
                descriptor: descriptor.clone(),
                constant_value: None,
            })?;
        }
        let version = class.version;
        insert_in_static_initializer(class, |code| -> Result<(), jvm::Error> {
            for join_point in &ordered {
                code.new_object(
                    runtime::CALLER_SIDE_JOIN_POINT,
                    runtime::STATIC_JOIN_POINT_INIT,
                    |code| {
                        code.const_string(uuid)?;
                        code.const_class(&class_name, version)?;
                        code.const_string(&join_point.signature)
                    },
                )?;
                code.put_field(FieldRef {
                    class: &class_name,
                    name: &join_point.field,
                    descriptor: &descriptor,
                    is_static: true,
                })?;
            }
            Ok(())
        })?;
        context.mark_advised();
        Ok(())
    }
}
