use super::{BranchInstruction, CodeElement, Instruction, InvokeType, Label, MethodBody};
use crate::jvm::{parse_field_descriptor, parse_method_descriptor, ConstantsPool, Error};
use crate::util::Width;
use std::collections::HashMap;
use std::convert::TryFrom;

/// Stack slots popped and pushed by an instruction (`long` and `double` take two)
fn stack_effect(insn: &Instruction, constants: &ConstantsPool) -> Result<(usize, usize), Error> {
    use Instruction::*;

    let field_width = |index| -> Result<usize, Error> {
        let field = constants.member_ref(index)?;
        Ok(parse_field_descriptor(field.descriptor)?.width())
    };

    Ok(match insn {
        Nop | IInc(..) => (0, 0),
        AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
        | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) | Ldc(_) => (0, 1),
        LConst0 | LConst1 | DConst0 | DConst1 | Ldc2(_) => (0, 2),
        ILoad(_) | FLoad(_) | ALoad(_) => (0, 1),
        LLoad(_) | DLoad(_) => (0, 2),
        IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => (2, 1),
        LALoad | DALoad => (2, 2),
        IStore(_) | FStore(_) | AStore(_) => (1, 0),
        LStore(_) | DStore(_) => (2, 0),
        IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => (3, 0),
        LAStore | DAStore => (4, 0),
        Pop => (1, 0),
        Pop2 => (2, 0),
        Dup => (1, 2),
        DupX1 => (2, 3),
        DupX2 => (3, 4),
        Dup2 => (2, 4),
        Dup2X1 => (3, 5),
        Dup2X2 => (4, 6),
        Swap => (2, 2),
        IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem => (2, 1),
        LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem => (4, 2),
        INeg | FNeg => (1, 1),
        LNeg | DNeg => (2, 2),
        ISh(_) => (2, 1),
        LSh(_) => (3, 2),
        IAnd | IOr | IXor => (2, 1),
        LAnd | LOr | LXor => (4, 2),
        I2F | F2I | I2B | I2C | I2S => (1, 1),
        I2L | I2D | F2L | F2D => (1, 2),
        L2I | L2F | D2I | D2F => (2, 1),
        L2D | D2L => (2, 2),
        LCmp | DCmp(_) => (4, 1),
        FCmp(_) => (2, 1),
        GetStatic(field) => (0, field_width((*field).into())?),
        PutStatic(field) => (field_width((*field).into())?, 0),
        GetField(field) => (1, field_width((*field).into())?),
        PutField(field) => (1 + field_width((*field).into())?, 0),
        Invoke(typ, method) => {
            let method = constants.member_ref((*method).into())?;
            let descriptor = parse_method_descriptor(method.descriptor)?;
            let has_this = !matches!(typ, InvokeType::Static);
            (
                descriptor.parameter_length(has_this),
                descriptor.return_width(),
            )
        }
        InvokeDynamic(call_site) => {
            let descriptor = constants.invoke_dynamic_descriptor(*call_site)?;
            let descriptor = parse_method_descriptor(descriptor)?;
            (descriptor.parameter_length(false), descriptor.return_width())
        }
        New(_) => (0, 1),
        NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => (1, 1),
        MonitorEnter | MonitorExit => (1, 0),
        MultiANewArray(_, dimensions) => (*dimensions as usize, 1),
    })
}

/// Stack slots popped by a branch
fn branch_pops(branch: &BranchInstruction<Label>) -> usize {
    match branch {
        BranchInstruction::If(..) | BranchInstruction::IfNull(..) => 1,
        BranchInstruction::IfICmp(..) | BranchInstruction::IfACmp(..) => 2,
        BranchInstruction::TableSwitch { .. } | BranchInstruction::LookupSwitch { .. } => 1,
        BranchInstruction::IReturn
        | BranchInstruction::FReturn
        | BranchInstruction::AReturn
        | BranchInstruction::AThrow => 1,
        BranchInstruction::LReturn | BranchInstruction::DReturn => 2,
        BranchInstruction::Goto(_)
        | BranchInstruction::Jsr(_)
        | BranchInstruction::Return
        | BranchInstruction::Ret(_) => 0,
    }
}

/// Compute the maximum operand stack depth of a method body
///
/// Depths are tracked at every label reachable from the start of the body or from an exception
/// handler (which starts with just the thrown exception on the stack). Two paths reaching the
/// same label with different depths is an error.
pub(crate) fn max_stack(body: &MethodBody, constants: &ConstantsPool) -> Result<u16, Error> {
    let elements = &body.elements;
    let label_positions: HashMap<Label, usize> = elements
        .iter()
        .enumerate()
        .filter_map(|(idx, element)| match element {
            CodeElement::Label(label) => Some((*label, idx)),
            _ => None,
        })
        .collect();

    let mut depths: HashMap<Label, usize> = HashMap::new();
    let mut worklist: Vec<(usize, usize)> = vec![(0, 0)];
    let mut max_depth = 0;

    let enqueue = |label: Label,
                   depth: usize,
                   depths: &mut HashMap<Label, usize>,
                   worklist: &mut Vec<(usize, usize)>|
     -> Result<(), Error> {
        let position = *label_positions
            .get(&label)
            .ok_or(Error::UnplacedLabel(label))?;
        match depths.get(&label) {
            Some(first) if *first != depth => Err(Error::InconsistentStackDepth {
                label,
                first: *first,
                second: depth,
            }),
            Some(_) => Ok(()),
            None => {
                depths.insert(label, depth);
                worklist.push((position + 1, depth));
                Ok(())
            }
        }
    };

    for range in &body.exception_table {
        enqueue(range.handler, 1, &mut depths, &mut worklist)?;
        max_depth = max_depth.max(1);
    }

    while let Some((start, mut depth)) = worklist.pop() {
        let mut position = start;
        while let Some(element) = elements.get(position) {
            match element {
                CodeElement::Label(label) => match depths.get(label) {
                    Some(first) if *first != depth => {
                        return Err(Error::InconsistentStackDepth {
                            label: *label,
                            first: *first,
                            second: depth,
                        })
                    }
                    Some(_) => break,
                    None => {
                        depths.insert(*label, depth);
                    }
                },
                CodeElement::Instruction(insn) => {
                    let (pops, pushes) = stack_effect(insn, constants)?;
                    depth = depth
                        .checked_sub(pops)
                        .ok_or(Error::StackUnderflow { element: position })?;
                    depth += pushes;
                    max_depth = max_depth.max(depth);
                }
                CodeElement::Branch(branch) => {
                    depth = depth
                        .checked_sub(branch_pops(branch))
                        .ok_or(Error::StackUnderflow { element: position })?;
                    if let BranchInstruction::Jsr(target) = branch {
                        max_depth = max_depth.max(depth + 1);
                        enqueue(*target, depth + 1, &mut depths, &mut worklist)?;
                    } else {
                        for target in branch.jump_targets() {
                            enqueue(target, depth, &mut depths, &mut worklist)?;
                        }
                    }
                    if !branch.falls_through() {
                        break;
                    }
                }
            }
            position += 1;
        }
    }

    u16::try_from(max_depth).map_err(|_| Error::MethodCodeMaxStackOverflow(max_depth))
}

/// Compute the number of local variable slots a method body needs
pub(crate) fn max_locals(body: &MethodBody, parameter_slots: usize) -> Result<u16, Error> {
    let mut max = parameter_slots;
    for element in &body.elements {
        match element {
            CodeElement::Instruction(insn) => {
                if let Some((idx, width)) = insn.local_access() {
                    max = max.max(idx as usize + width as usize);
                }
            }
            CodeElement::Branch(BranchInstruction::Ret(idx)) => {
                max = max.max(*idx as usize + 1);
            }
            _ => (),
        }
    }
    for (_, frame) in &body.frames {
        max = max.max(frame.local_slots());
    }
    for variable in &body.local_variables {
        let width = match variable.descriptor.as_str() {
            "J" | "D" => 2,
            _ => 1,
        };
        max = max.max(variable.index as usize + width);
    }
    u16::try_from(max).map_err(|_| Error::MethodCodeMaxLocalsOverflow(max))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{ExceptionRange, OrdComparison};

    #[test]
    fn straight_line_depth() {
        let mut constants = ConstantsPool::new();
        let println = constants
            .get_method_ref("java/io/PrintStream", "println", "(J)V", false)
            .unwrap();
        let out = constants
            .get_field_ref("java/lang/System", "out", "Ljava/io/PrintStream;")
            .unwrap();

        let mut body = MethodBody::new();
        body.push_instruction(Instruction::GetStatic(out));
        body.push_instruction(Instruction::LConst1);
        body.push_instruction(Instruction::Invoke(InvokeType::Virtual, println));
        body.push_branch(BranchInstruction::Return);
        assert_eq!(max_stack(&body, &constants).unwrap(), 3);
    }

    #[test]
    fn branches_and_handlers() {
        let constants = ConstantsPool::new();
        let mut body = MethodBody::new();
        let start = body.fresh_label();
        let end = body.fresh_label();
        let handler = body.fresh_label();
        let join = body.fresh_label();

        body.place_label(start);
        body.push_instruction(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::If(OrdComparison::EQ, join));
        body.push_instruction(Instruction::IConst1);
        body.push_instruction(Instruction::IConst2);
        body.push_instruction(Instruction::IAdd);
        body.push_instruction(Instruction::Pop);
        body.place_label(join);
        body.place_label(end);
        body.push_branch(BranchInstruction::Return);
        body.place_label(handler);
        body.push_branch(BranchInstruction::AThrow);
        body.exception_table.push(ExceptionRange {
            start,
            end,
            handler,
            catch_type: None,
        });

        assert_eq!(max_stack(&body, &constants).unwrap(), 2);
        assert_eq!(max_locals(&body, 1).unwrap(), 1);
    }

    #[test]
    fn disagreeing_depths_are_rejected() {
        let constants = ConstantsPool::new();
        let mut body = MethodBody::new();
        let join = body.fresh_label();
        body.push_instruction(Instruction::ILoad(0));
        body.push_instruction(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::If(OrdComparison::EQ, join));
        body.push_instruction(Instruction::Pop);
        body.place_label(join);
        body.push_branch(BranchInstruction::Return);

        assert!(matches!(
            max_stack(&body, &constants),
            Err(Error::InconsistentStackDepth { .. })
        ));
    }

    #[test]
    fn underflow_is_reported() {
        let constants = ConstantsPool::new();
        let mut body = MethodBody::new();
        body.push_instruction(Instruction::Pop);
        body.push_branch(BranchInstruction::Return);
        assert!(matches!(
            max_stack(&body, &constants),
            Err(Error::StackUnderflow { element: 0 })
        ));
    }

    #[test]
    fn wide_locals() {
        let mut body = MethodBody::new();
        body.push_instruction(Instruction::DLoad(3));
        body.push_branch(BranchInstruction::DReturn);
        assert_eq!(max_locals(&body, 1).unwrap(), 5);
    }
}
