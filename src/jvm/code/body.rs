use super::frame::{compress_frames, expand_frames, frame_offsets, uninitialized_offsets};
use super::jump_encoding::{layout, write_code, SIGNED_16BIT_JUMP_RANGE};
use super::{
    decode_instruction, stack, BranchInstruction, DecodedInstruction, Frame, Instruction, Label,
    LabelGenerator,
};
use crate::jvm::class_file::{
    Attribute, BytecodeArray, BytecodeIndex, Code, ExceptionHandler, LineNumber, LineNumberTable,
    LocalVariable, LocalVariableTable, LocalVariableTypeTable, StackMapTable,
};
use crate::jvm::{ClassConstantIndex, ConstantsPool, Error};
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};

/// Element of a method body
#[derive(Clone, Debug, PartialEq)]
pub enum CodeElement {
    /// Position marker (takes no space in the encoded code)
    Label(Label),
    Instruction(Instruction),
    Branch(BranchInstruction<Label>),
}

/// Entry in the exception table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionRange {
    /// Start of the protected range (inclusive)
    pub start: Label,

    /// End of the protected range (exclusive)
    pub end: Label,

    pub handler: Label,

    /// `None` catches everything
    pub catch_type: Option<ClassConstantIndex>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start: Label,
    pub line: u16,
}

/// Entry of a local variable table (for the type table, `descriptor` holds the generic
/// signature)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start: Label,
    pub end: Label,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

/// Editable method body
///
/// Instructions refer to positions through [`Label`]s instead of offsets, so elements can be
/// inserted and removed freely. Encoding picks the offsets again, widening jumps as needed.
#[derive(Clone, Debug, Default)]
pub struct MethodBody {
    pub elements: Vec<CodeElement>,
    pub exception_table: Vec<ExceptionRange>,
    pub line_numbers: Vec<LineNumberEntry>,
    pub local_variables: Vec<LocalVariableEntry>,
    pub local_variable_types: Vec<LocalVariableEntry>,

    /// Stack map frames (only present in classes that use them)
    pub frames: Vec<(Label, Frame)>,

    pub max_stack: u16,
    pub max_locals: u16,

    labels: LabelGenerator,
}

impl MethodBody {
    pub fn new() -> MethodBody {
        MethodBody::default()
    }

    pub fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    pub fn push_instruction(&mut self, insn: Instruction) {
        self.elements.push(CodeElement::Instruction(insn));
    }

    pub fn push_branch(&mut self, branch: BranchInstruction<Label>) {
        self.elements.push(CodeElement::Branch(branch));
    }

    pub fn place_label(&mut self, label: Label) {
        self.elements.push(CodeElement::Label(label));
    }

    /// Does the body contain any jumps (so that it would need stack map frames)?
    pub fn has_jumps(&self) -> bool {
        !self.exception_table.is_empty()
            || self.elements.iter().any(|element| match element {
                CodeElement::Branch(branch) => !branch.jump_targets().is_empty(),
                _ => false,
            })
    }

    /// Recompute `max_stack` and `max_locals`
    pub fn compute_maxs(
        &mut self,
        constants: &ConstantsPool,
        parameter_slots: usize,
    ) -> Result<(), Error> {
        self.max_stack = stack::max_stack(self, constants)?;
        self.max_locals = stack::max_locals(self, parameter_slots)?;
        Ok(())
    }

    /// Decode a `Code` attribute
    ///
    /// `entry` is the frame on method entry, needed to expand compressed stack map frames.
    /// Sub-attributes other than line numbers, local variable tables, and stack map frames are
    /// dropped.
    pub fn decode(
        code: &Code,
        constants: &ConstantsPool,
        entry: &Frame,
    ) -> Result<MethodBody, Error> {
        let bytes = &code.code_array.0;

        let mut decoded = vec![];
        let mut offset = 0;
        while offset < bytes.len() {
            let (insn, next) = decode_instruction(bytes, offset, constants)?;
            decoded.push((offset, insn));
            offset = next;
        }
        let boundaries: BTreeSet<usize> = decoded
            .iter()
            .map(|(offset, _)| *offset)
            .chain(std::iter::once(bytes.len()))
            .collect();

        let mut line_numbers = vec![];
        let mut local_variables = vec![];
        let mut local_variable_types = vec![];
        let mut stack_map: Option<StackMapTable> = None;
        for attribute in &code.attributes {
            match attribute.name(constants)? {
                "LineNumberTable" => {
                    line_numbers.extend(attribute.decode::<LineNumberTable>(constants)?.0)
                }
                "LocalVariableTable" => {
                    local_variables.extend(attribute.decode::<LocalVariableTable>(constants)?.0)
                }
                "LocalVariableTypeTable" => local_variable_types
                    .extend(attribute.decode::<LocalVariableTypeTable>(constants)?.0),
                "StackMapTable" => stack_map = Some(attribute.decode::<StackMapTable>(constants)?),
                other => warn!("Dropping unsupported code attribute {}", other),
            }
        }

        // Every offset that needs a label
        let mut targets: BTreeSet<usize> = BTreeSet::new();
        for (offset, insn) in &decoded {
            if let DecodedInstruction::Branch(branch) = insn {
                for target in branch.jump_targets() {
                    if !boundaries.contains(&target) {
                        return Err(Error::BadJumpTarget {
                            offset: *offset,
                            target: target as isize,
                        });
                    }
                    targets.insert(target);
                }
            }
        }
        for handler in &code.exception_table {
            for pc in [handler.start_pc, handler.end_pc, handler.handler_pc] {
                if !boundaries.contains(&(pc.0 as usize)) {
                    return Err(Error::MalformedAttribute {
                        name: "Code",
                        reason: format!("exception table entry at offset {}", pc.0),
                    });
                }
                targets.insert(pc.0 as usize);
            }
        }
        if let Some(table) = &stack_map {
            for offset in frame_offsets(table).into_iter().chain(uninitialized_offsets(table)) {
                if !boundaries.contains(&offset) {
                    return Err(Error::MalformedAttribute {
                        name: "StackMapTable",
                        reason: format!("no instruction at offset {}", offset),
                    });
                }
                targets.insert(offset);
            }
        }
        line_numbers.retain(|line: &LineNumber| {
            let valid = boundaries.contains(&(line.start_pc.0 as usize));
            if !valid {
                debug!("Dropping line number entry at offset {}", line.start_pc.0);
            }
            valid
        });
        let variable_in_range = |variable: &LocalVariable| {
            let start = variable.start_pc.0 as usize;
            let valid = boundaries.contains(&start)
                && boundaries.contains(&(start + variable.length as usize));
            if !valid {
                debug!("Dropping local variable entry for slot {}", variable.index);
            }
            valid
        };
        local_variables.retain(variable_in_range);
        local_variable_types.retain(variable_in_range);
        targets.extend(line_numbers.iter().map(|line| line.start_pc.0 as usize));
        for variable in local_variables.iter().chain(&local_variable_types) {
            let start = variable.start_pc.0 as usize;
            targets.insert(start);
            targets.insert(start + variable.length as usize);
        }

        let mut body = MethodBody::new();
        let labels: HashMap<usize, Label> = targets
            .iter()
            .map(|offset| (*offset, body.fresh_label()))
            .collect();
        let label_at = |offset: usize| labels[&offset];

        for (offset, insn) in decoded {
            if let Some(label) = labels.get(&offset) {
                body.place_label(*label);
            }
            match insn {
                DecodedInstruction::Instruction(insn) => body.push_instruction(insn),
                DecodedInstruction::Branch(branch) => {
                    body.push_branch(branch.map_labels(|target| Ok::<_, Error>(label_at(*target)))?)
                }
            }
        }
        if let Some(label) = labels.get(&bytes.len()) {
            body.place_label(*label);
        }

        body.exception_table = code
            .exception_table
            .iter()
            .map(|handler| ExceptionRange {
                start: label_at(handler.start_pc.0 as usize),
                end: label_at(handler.end_pc.0 as usize),
                handler: label_at(handler.handler_pc.0 as usize),
                catch_type: handler.catch_type,
            })
            .collect();
        body.line_numbers = line_numbers
            .iter()
            .map(|line| LineNumberEntry {
                start: label_at(line.start_pc.0 as usize),
                line: line.line_number,
            })
            .collect();
        let resolve_variable = |variable: &LocalVariable| -> Result<LocalVariableEntry, Error> {
            let start = variable.start_pc.0 as usize;
            Ok(LocalVariableEntry {
                start: label_at(start),
                end: label_at(start + variable.length as usize),
                name: constants.utf8(variable.name_index)?.to_owned(),
                descriptor: constants.utf8(variable.descriptor_index)?.to_owned(),
                index: variable.index,
            })
        };
        body.local_variables = local_variables
            .iter()
            .map(&resolve_variable)
            .collect::<Result<_, _>>()?;
        body.local_variable_types = local_variable_types
            .iter()
            .map(&resolve_variable)
            .collect::<Result<_, _>>()?;

        if let Some(table) = &stack_map {
            body.frames = expand_frames(table, entry, constants, &labels)?
                .into_iter()
                .map(|(offset, frame)| (label_at(offset), frame))
                .collect();
        }

        body.max_stack = code.max_stack;
        body.max_locals = code.max_locals;
        Ok(body)
    }

    /// Encode into a `Code` attribute, using the current `max_stack` and `max_locals`
    pub fn encode(&self, constants: &mut ConstantsPool) -> Result<Code, Error> {
        let has_frames = !self.frames.is_empty();
        let layout = layout(&self.elements, !has_frames, &SIGNED_16BIT_JUMP_RANGE)?;
        let code_array = write_code(&self.elements, &layout)?;
        let offset_of = |label: &Label| -> Result<u16, Error> {
            let offset = layout.labels.get(label).ok_or(Error::UnplacedLabel(*label))?;
            Ok(*offset as u16)
        };

        let mut exception_table = vec![];
        for range in &self.exception_table {
            let start_pc = offset_of(&range.start)?;
            let end_pc = offset_of(&range.end)?;
            if start_pc >= end_pc {
                continue;
            }
            exception_table.push(ExceptionHandler {
                start_pc: BytecodeIndex(start_pc),
                end_pc: BytecodeIndex(end_pc),
                handler_pc: BytecodeIndex(offset_of(&range.handler)?),
                catch_type: range.catch_type,
            });
        }

        let mut attributes: Vec<Attribute> = vec![];
        if !self.line_numbers.is_empty() {
            let lines = self
                .line_numbers
                .iter()
                .map(|line| {
                    Ok(LineNumber {
                        start_pc: BytecodeIndex(offset_of(&line.start)?),
                        line_number: line.line,
                    })
                })
                .collect::<Result<_, Error>>()?;
            attributes.push(constants.get_attribute(LineNumberTable(lines))?);
        }
        let encode_variables = |variables: &[LocalVariableEntry],
                                    constants: &mut ConstantsPool|
         -> Result<Vec<LocalVariable>, Error> {
            variables
                .iter()
                .map(|variable| {
                    let start_pc = offset_of(&variable.start)?;
                    let end_pc = offset_of(&variable.end)?;
                    Ok(LocalVariable {
                        start_pc: BytecodeIndex(start_pc),
                        length: end_pc.saturating_sub(start_pc),
                        name_index: constants.get_utf8(variable.name.as_str())?,
                        descriptor_index: constants.get_utf8(variable.descriptor.as_str())?,
                        index: variable.index,
                    })
                })
                .collect()
        };
        if !self.local_variables.is_empty() {
            let table = encode_variables(&self.local_variables, constants)?;
            attributes.push(constants.get_attribute(LocalVariableTable(table))?);
        }
        if !self.local_variable_types.is_empty() {
            let table = encode_variables(&self.local_variable_types, constants)?;
            attributes.push(constants.get_attribute(LocalVariableTypeTable(table))?);
        }

        if has_frames {
            let mut frames = self
                .frames
                .iter()
                .map(|(label, frame)| Ok((offset_of(label)? as usize, frame)))
                .collect::<Result<Vec<_>, Error>>()?;
            frames.sort_by_key(|(offset, _)| *offset);
            frames.dedup_by_key(|(offset, _)| *offset);
            let table = compress_frames(&frames, constants, &layout.labels)?;
            attributes.push(constants.get_attribute(table)?);
        }

        Ok(Code {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code_array: BytecodeArray(code_array),
            exception_table,
            attributes,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{StackMapFrame, VerificationType};
    use crate::jvm::code::OrdComparison;
    use crate::jvm::parse_method_descriptor;

    /// `static int pick(int x) { return x != 0 ? 1 : 0; }` with a catch-all handler
    fn sample_code(constants: &mut ConstantsPool, with_frames: bool) -> Code {
        let throwable = constants.get_class("java/lang/Throwable").unwrap();
        let mut attributes = vec![constants
            .get_attribute(LineNumberTable(vec![
                LineNumber {
                    start_pc: BytecodeIndex(0),
                    line_number: 10,
                },
                LineNumber {
                    start_pc: BytecodeIndex(6),
                    line_number: 11,
                },
            ]))
            .unwrap()];
        if with_frames {
            attributes.push(
                constants
                    .get_attribute(StackMapTable(vec![
                        StackMapFrame::SameLocalsNoStack { offset_delta: 6 },
                        StackMapFrame::SameLocalsOneStack {
                            offset_delta: 1,
                            stack: VerificationType::Object(throwable),
                        },
                    ]))
                    .unwrap(),
            );
        }
        Code {
            max_stack: 1,
            max_locals: 1,
            code_array: BytecodeArray(vec![
                0x1a, // iload_0
                0x99, 0x00, 0x05, // ifeq +5
                0x04, // iconst_1
                0xac, // ireturn
                0x03, // iconst_0
                0xac, // ireturn
                0xbf, // athrow
            ]),
            exception_table: vec![ExceptionHandler {
                start_pc: BytecodeIndex(0),
                end_pc: BytecodeIndex(6),
                handler_pc: BytecodeIndex(8),
                catch_type: None,
            }],
            attributes,
        }
    }

    fn entry() -> Frame {
        let descriptor = parse_method_descriptor("(I)I").unwrap();
        Frame::entry("com/acme/Pick", true, false, &descriptor)
    }

    #[test]
    fn decodes_into_labelled_elements() {
        let mut constants = ConstantsPool::new();
        let code = sample_code(&mut constants, false);
        let body = MethodBody::decode(&code, &constants, &entry()).unwrap();

        let branch_target = match &body.elements[2] {
            CodeElement::Branch(BranchInstruction::If(OrdComparison::EQ, target)) => *target,
            other => panic!("unexpected {:?}", other),
        };
        assert!(body.elements.contains(&CodeElement::Label(branch_target)));
        assert_eq!(body.exception_table.len(), 1);
        assert_eq!(body.exception_table[0].end, branch_target);
        assert_eq!(body.line_numbers.len(), 2);
    }

    #[test]
    fn reencodes_to_the_same_bytes() {
        let mut constants = ConstantsPool::new();
        let code = sample_code(&mut constants, false);
        let mut body = MethodBody::decode(&code, &constants, &entry()).unwrap();
        body.compute_maxs(&constants, 1).unwrap();
        assert_eq!((body.max_stack, body.max_locals), (1, 1));

        let encoded = body.encode(&mut constants).unwrap();
        assert_eq!(encoded.code_array.0, code.code_array.0);
        assert_eq!(encoded.exception_table, code.exception_table);
        let lines: LineNumberTable = encoded.attributes[0].decode(&constants).unwrap();
        assert_eq!(lines.0.len(), 2);
        assert_eq!(lines.0[1].start_pc, BytecodeIndex(6));
    }

    #[test]
    fn frames_are_expanded_and_written_in_full() {
        let mut constants = ConstantsPool::new();
        let code = sample_code(&mut constants, true);
        let body = MethodBody::decode(&code, &constants, &entry()).unwrap();
        assert_eq!(body.frames.len(), 2);
        assert_eq!(body.frames[0].1.locals, vec![VerificationType::Integer]);
        assert_eq!(
            body.frames[1].1.stack,
            vec![VerificationType::Object("java/lang/Throwable".to_owned())]
        );

        let encoded = body.encode(&mut constants).unwrap();
        let table = Attribute::find::<StackMapTable>(&encoded.attributes, &constants)
            .unwrap()
            .unwrap();
        assert_eq!(table.0.len(), 2);
        assert!(matches!(
            &table.0[1],
            StackMapFrame::Full { offset_delta: 1, locals, stack } if locals.len() == 1 && stack.len() == 1
        ));
    }

    #[test]
    fn inserted_code_shifts_offsets() {
        let mut constants = ConstantsPool::new();
        let code = sample_code(&mut constants, false);
        let mut body = MethodBody::decode(&code, &constants, &entry()).unwrap();
        body.elements.insert(1, CodeElement::Instruction(Instruction::Nop));

        let encoded = body.encode(&mut constants).unwrap();
        assert_eq!(&encoded.code_array.0[..5], &[0x00, 0x1a, 0x99, 0x00, 0x05]);
        assert_eq!(encoded.exception_table[0].handler_pc, BytecodeIndex(9));
    }

    #[test]
    fn jumps_into_the_middle_of_instructions_are_rejected() {
        let constants = ConstantsPool::new();
        let code = Code {
            max_stack: 0,
            max_locals: 0,
            code_array: BytecodeArray(vec![0xa7, 0x00, 0x01, 0xb1]),
            exception_table: vec![],
            attributes: vec![],
        };
        assert!(matches!(
            MethodBody::decode(&code, &constants, &Frame::default()),
            Err(Error::BadJumpTarget { .. })
        ));
    }
}
