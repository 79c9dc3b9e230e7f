use super::codegen::{insert_in_constructors, insert_in_static_initializer, CodeBuilder, FieldRef};
use super::{naming, runtime, CodeTransformer, Context, Transformer};
use crate::jvm::class_file::{VerificationType, Version};
use crate::jvm::code::{BranchInstruction, EqComparison, Frame, Instruction, InvokeType, MethodBody};
use crate::jvm::model::{BinaryClass, FieldSpec, MethodSpec};
use crate::jvm::{
    self, BinaryName, ConstantsPool, FieldAccessFlags, MethodAccessFlags, MethodDescriptor,
    UnqualifiedName,
};
use crate::Error;
use log::debug;
use std::collections::HashMap;

/// Routes advised instance methods through a join point
///
/// The original body is moved to a private method and the method becomes a proxy that fetches
/// (or creates) the calling thread's join point, hands it the arguments, and returns what
/// `proceed()` yields.
pub struct MemberMethodAdvice;

/// Same as [`MemberMethodAdvice`] for static methods
pub struct StaticMethodAdvice;

impl Transformer for MemberMethodAdvice {
    fn name(&self) -> &'static str {
        "member-method-advice"
    }

    fn code_stage(&self) -> Option<&dyn CodeTransformer> {
        Some(self)
    }
}

impl CodeTransformer for MemberMethodAdvice {
    fn transform_code(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        advise_methods(self.name(), false, context, class)
    }
}

impl Transformer for StaticMethodAdvice {
    fn name(&self) -> &'static str {
        "static-method-advice"
    }

    fn code_stage(&self) -> Option<&dyn CodeTransformer> {
        Some(self)
    }
}

impl CodeTransformer for StaticMethodAdvice {
    fn transform_code(
        &self,
        context: &mut Context<'_>,
        class: &mut BinaryClass,
    ) -> Result<(), Error> {
        advise_methods(self.name(), true, context, class)
    }
}

struct AdvisedMethod {
    index: usize,
    name: String,
    descriptor: String,

    /// Position among the methods of the same name, overloads being told apart by it
    sequence: usize,
    controller: Option<String>,
}

fn advise_methods(
    pass: &'static str,
    is_static: bool,
    context: &mut Context<'_>,
    class: &mut BinaryClass,
) -> Result<(), Error> {
    let model = context.model();
    let snapshot = context.class_metadata();
    if class.is_interface() || !model.has_method_pointcut_in_class(&snapshot) {
        return Ok(());
    }
    let uuid = context.uuid();
    let prefix = naming::original_method_prefix(uuid);
    let already_advised = class
        .methods()
        .iter()
        .any(|method| method.is_static() == is_static && method.name().starts_with(&prefix));
    if already_advised {
        debug!("{}: methods of '{}' are already advised", pass, class.name());
        return Ok(());
    }

    let mut sequences: HashMap<&str, usize> = HashMap::new();
    let mut advised: Vec<AdvisedMethod> = vec![];
    for method in snapshot.methods() {
        let counter = sequences.entry(method.name()).or_insert(0);
        let sequence = *counter;
        *counter += 1;
        if method.is_static() != is_static || method.is_constructor() {
            continue;
        }
        let descriptor = method.descriptor();
        let index = match class.find_method(method.name(), &descriptor) {
            Some(index) => index,
            None => continue,
        };
        let info = &class.methods()[index];
        if info.is_abstract_or_native()
            || info
                .access_flags
                .intersects(MethodAccessFlags::SYNTHETIC | MethodAccessFlags::BRIDGE)
            || !model.has_method_pointcut(&snapshot, method)
        {
            continue;
        }
        advised.push(AdvisedMethod {
            index,
            name: method.name().to_owned(),
            descriptor,
            sequence,
            controller: model
                .join_point_controller(&snapshot, method)
                .map(str::to_owned),
        });
    }
    if advised.is_empty() {
        return Ok(());
    }

    let class_name = class.name().to_owned();
    let thread_local = format!("L{};", BinaryName::THREADLOCAL.as_str());
    let mut holders = Vec::with_capacity(advised.len());
    for method in &advised {
        let info = class.methods()[method.index].clone();
        let original = naming::original_method(uuid, &method.name, method.sequence);
        let holder = naming::method_join_point(uuid, &method.name, method.sequence);
        let proxy = Proxy {
            class_name: &class_name,
            version: class.version,
            is_static,
            holder: FieldRef {
                class: &class_name,
                name: &holder,
                descriptor: &thread_local,
                is_static,
            },
            uuid,
            signature: runtime::method_signature(&original, &method.descriptor),
            controller: method.controller.as_deref(),
        };
        let body = proxy.body(&mut class.constants, &info.parsed_descriptor()?)?;
        let spec = MethodSpec {
            access_flags: info.access_flags,
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            body: Some(body),
            exceptions: info.exceptions(&class.constants)?,
        };

        let mut flags = info.access_flags;
        flags.remove(MethodAccessFlags::PUBLIC | MethodAccessFlags::PROTECTED);
        flags.insert(MethodAccessFlags::PRIVATE);
        debug!(
            "{}: advising {}.{}{} (original body in {})",
            pass, class_name, method.name, method.descriptor, original
        );
        class.displace_method(method.index, original, flags, spec)?;
        class.add_field(FieldSpec {
            access_flags: if is_static {
                FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL
            } else {
                FieldAccessFlags::PRIVATE | FieldAccessFlags::TRANSIENT
            },
            name: holder.clone(),
            descriptor: thread_local.clone(),
            constant_value: None,
        })?;
        holders.push(holder);
    }

    let create = |code: &mut CodeBuilder<'_>| -> Result<(), jvm::Error> {
        for holder in &holders {
            if !is_static {
                code.push(Instruction::ALoad(0));
            }
            code.new_object(BinaryName::THREADLOCAL.as_str(), "()V", |_| Ok(()))?;
            code.put_field(FieldRef {
                class: &class_name,
                name: holder,
                descriptor: &thread_local,
                is_static,
            })?;
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

/// What the proxy replacing an advised method needs to know
struct Proxy<'b> {
    class_name: &'b str,
    version: Version,
    is_static: bool,

    /// Thread local holding the join point
    holder: FieldRef<'b>,
    uuid: &'b str,
    signature: String,
    controller: Option<&'b str>,
}

impl<'b> Proxy<'b> {
    fn join_point_class(&self) -> &'static str {
        if self.is_static {
            runtime::STATIC_METHOD_JOIN_POINT
        } else {
            runtime::MEMBER_METHOD_JOIN_POINT
        }
    }

    /// ```text
    /// jp = (JoinPoint) holder.get();
    /// if (jp == null) {
    ///     jp = new JoinPoint(uuid, this or Class, signature, controller);
    ///     holder.set(jp);
    /// }
    /// jp.setParameters(new Object[] { arguments... });
    /// return (ReturnType) jp.proceed();
    /// ```
    fn body(
        &self,
        constants: &mut ConstantsPool,
        descriptor: &MethodDescriptor,
    ) -> Result<MethodBody, Error> {
        let join_point = self.join_point_class();
        let thread_local = BinaryName::THREADLOCAL;
        let local = descriptor.parameter_length(!self.is_static) as u16;
        let mut code = CodeBuilder::new(constants);
        let have_join_point = code.fresh_label();

        self.load_holder(&mut code)?;
        code.invoke(
            InvokeType::Virtual,
            thread_local.as_str(),
            UnqualifiedName::GET.as_str(),
            "()Ljava/lang/Object;",
        )?;
        code.check_cast(join_point)?;
        code.push(Instruction::AStore(local));
        code.push(Instruction::ALoad(local));
        code.branch(BranchInstruction::IfNull(EqComparison::NE, have_join_point));

        let init = if self.is_static {
            runtime::STATIC_METHOD_JOIN_POINT_INIT
        } else {
            runtime::MEMBER_METHOD_JOIN_POINT_INIT
        };
        code.new_object(join_point, init, |code| {
            code.const_string(self.uuid)?;
            if self.is_static {
                code.const_class(self.class_name, self.version)?;
            } else {
                code.push(Instruction::ALoad(0));
            }
            code.const_string(&self.signature)?;
            code.const_string_or_null(self.controller)
        })?;
        code.push(Instruction::AStore(local));
        self.load_holder(&mut code)?;
        code.push(Instruction::ALoad(local));
        code.invoke(
            InvokeType::Virtual,
            thread_local.as_str(),
            UnqualifiedName::SET.as_str(),
            "(Ljava/lang/Object;)V",
        )?;

        code.place_label(have_join_point);
        if self.version.uses_stack_map_frames() {
            let mut frame = Frame::entry(self.class_name, self.is_static, false, descriptor);
            frame.locals.push(VerificationType::Object(join_point.to_owned()));
            code.body.frames.push((have_join_point, frame));
        }
        code.push(Instruction::ALoad(local));
        code.parameter_array(&descriptor.parameters, if self.is_static { 0 } else { 1 })?;
        let (name, set_parameters) = runtime::SET_PARAMETERS;
        code.invoke(InvokeType::Virtual, join_point, name, set_parameters)?;
        code.push(Instruction::ALoad(local));
        let (name, proceed) = runtime::PROCEED;
        code.invoke(InvokeType::Virtual, join_point, name, proceed)?;
        code.unbox_or_cast(descriptor.return_type.as_ref())?;
        code.return_value(descriptor.return_type.as_ref());
        Ok(code.into_body())
    }

    fn load_holder(&self, code: &mut CodeBuilder<'_>) -> Result<(), Error> {
        if !self.is_static {
            code.push(Instruction::ALoad(0));
        }
        code.get_field(self.holder)?;
        Ok(())
    }
}
