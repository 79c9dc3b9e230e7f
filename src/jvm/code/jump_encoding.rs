//! Lay out a method body and fix wide jumps by rewriting them into `goto_w`
//!
//! This module is responsible for picking offsets for every element of a method body and for
//! fixing jumps that require bigger relative offsets than the jump instruction supports. The
//! general idea is to switch to using `goto_w` for all jumps that don't fit in the signed 16-bit
//! offset that most other jump instructions have.
//!
//! ### Termination
//!
//! This is a tricky problem because the `goto_w` rewrites are themselves longer than the initial
//! jump instruction, so the rewrites risk causing other jumps to become oversized and also need to
//! be rewritten. Thankfully, we know the process will finish because the set of widened jumps only
//! ever grows, and there are finitely many jumps.
//!
//! ### Rewriting
//!
//! `goto` and `jsr` become `goto_w` and `jsr_w`. Switch padding is recomputed on every round, so
//! unlike a rewrite done in place there is no need to keep segments a multiple of four bytes
//! wide. Conditional jumps have no wide form, so they get inverted to hop over a `goto_w`:
//!
//! ```text,ignore,no_run
//!                           ifnot* L1
//!     if* L2            =>  goto_w L2
//! L1: ...               L1: ...
//!     ...                   ...
//! L2: ...               L2: ...
//! ```
//!
//! `L1` is a new branch target there, so this is only done in methods without stack map frames.

use super::{BranchInstruction, CodeElement, EqComparison, Label};
use crate::jvm::class_file::Serialize;
use crate::jvm::Error;
use crate::util::Width;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<isize> =
    RangeInclusive::new(i16::MIN as isize, i16::MAX as isize);

/// Largest method body the JVM accepts
pub const MAX_CODE_LENGTH: usize = 65535;

/// Offsets assigned to a sequence of code elements
#[derive(Debug)]
pub struct Layout {
    /// Offset of every element (labels share the offset of the next instruction)
    pub offsets: Vec<usize>,

    /// Offset of every placed label
    pub labels: HashMap<Label, usize>,

    /// Indices of branch elements that use their wide encoding
    pub widened: HashSet<usize>,

    /// Total length of the code array
    pub code_length: usize,
}

fn element_width(element: &CodeElement, offset: usize, widened: bool) -> usize {
    match element {
        CodeElement::Label(_) => 0,
        CodeElement::Instruction(insn) => insn.width(),
        CodeElement::Branch(branch) if widened => {
            if branch.is_conditional() {
                8
            } else {
                5
            }
        }
        CodeElement::Branch(branch) => branch.width_at(offset),
    }
}

/// Given code elements in order, assign offsets and decide which jumps must be widened.
///
/// The `small_jump_range` parameter should always be `SIGNED_16BIT_JUMP_RANGE` - it is a
/// parameter only for unit testing purposes.
pub fn layout(
    elements: &[CodeElement],
    allow_inverted_conditionals: bool,
    small_jump_range: &RangeInclusive<isize>,
) -> Result<Layout, Error> {
    let mut widened: HashSet<usize> = HashSet::new();

    loop {
        let mut offsets = Vec::with_capacity(elements.len());
        let mut labels = HashMap::new();
        let mut offset = 0;
        for (idx, element) in elements.iter().enumerate() {
            offsets.push(offset);
            if let CodeElement::Label(label) = element {
                labels.insert(*label, offset);
            }
            offset += element_width(element, offset, widened.contains(&idx));
        }

        let mut changed = false;
        for (idx, element) in elements.iter().enumerate() {
            let branch = match element {
                CodeElement::Branch(branch) if !widened.contains(&idx) => branch,
                _ => continue,
            };
            let target = match branch {
                BranchInstruction::Goto(target) | BranchInstruction::Jsr(target) => *target,
                _ if branch.is_conditional() => branch.jump_targets()[0],
                _ => continue,
            };
            let target_offset = *labels.get(&target).ok_or(Error::UnplacedLabel(target))?;
            let relative = target_offset as isize - offsets[idx] as isize;
            if !small_jump_range.contains(&relative) {
                if branch.is_conditional() && !allow_inverted_conditionals {
                    return Err(Error::UnencodableBranch(target));
                }
                widened.insert(idx);
                changed = true;
            }
        }

        if !changed {
            if offset > MAX_CODE_LENGTH {
                return Err(Error::MethodCodeOverflow(offset));
            }
            return Ok(Layout {
                offsets,
                labels,
                widened,
                code_length: offset,
            });
        }
    }
}

/// Write out the code array for a layout
pub fn write_code(elements: &[CodeElement], layout: &Layout) -> Result<Vec<u8>, Error> {
    let mut code: Vec<u8> = Vec::with_capacity(layout.code_length);
    for (idx, element) in elements.iter().enumerate() {
        let offset = layout.offsets[idx];
        match element {
            CodeElement::Label(_) => (),
            CodeElement::Instruction(insn) => insn.serialize(&mut code)?,
            CodeElement::Branch(branch) => {
                let resolved = branch.map_labels(|label| {
                    let target = layout.labels.get(label).ok_or(Error::UnplacedLabel(*label))?;
                    Ok::<isize, Error>(*target as isize - offset as isize)
                })?;
                write_branch(&resolved, offset, layout.widened.contains(&idx), &mut code)?;
            }
        }
        debug_assert_eq!(
            code.len(),
            layout.offsets.get(idx + 1).copied().unwrap_or(layout.code_length)
        );
    }
    Ok(code)
}

/// Opcode and relative target of a conditional branch instruction
fn conditional(branch: &BranchInstruction<isize>) -> Option<(u8, isize)> {
    match branch {
        BranchInstruction::If(op, relative) => Some((0x99 + op.opcode_offset(), *relative)),
        BranchInstruction::IfICmp(op, relative) => Some((0x9f + op.opcode_offset(), *relative)),
        BranchInstruction::IfACmp(EqComparison::EQ, relative) => Some((0xa5, *relative)),
        BranchInstruction::IfACmp(EqComparison::NE, relative) => Some((0xa6, *relative)),
        BranchInstruction::IfNull(EqComparison::EQ, relative) => Some((0xc6, *relative)),
        BranchInstruction::IfNull(EqComparison::NE, relative) => Some((0xc7, *relative)),
        _ => None,
    }
}

/// Write a branch whose targets have been resolved to offsets relative to the branch
fn write_branch(
    branch: &BranchInstruction<isize>,
    offset: usize,
    wide: bool,
    code: &mut Vec<u8>,
) -> Result<(), Error> {
    if let Some((opcode, relative)) = conditional(branch) {
        if wide {
            if let Some(inverted) = branch.inverted(8) {
                write_branch(&inverted, offset, false, code)?;
            }
            0xc8u8.serialize(code)?;
            ((relative - 3) as i32).serialize(code)?;
        } else {
            opcode.serialize(code)?;
            (relative as i16).serialize(code)?;
        }
        return Ok(());
    }

    match branch {
        BranchInstruction::Goto(relative) | BranchInstruction::Jsr(relative) => {
            let is_goto = matches!(branch, BranchInstruction::Goto(_));
            if wide {
                (if is_goto { 0xc8u8 } else { 0xc9u8 }).serialize(code)?;
                (*relative as i32).serialize(code)?;
            } else {
                (if is_goto { 0xa7u8 } else { 0xa8u8 }).serialize(code)?;
                (*relative as i16).serialize(code)?;
            }
        }
        BranchInstruction::TableSwitch {
            default,
            low,
            targets,
        } => {
            0xaau8.serialize(code)?;
            code.extend(std::iter::repeat(0).take(super::switch_padding(offset)));
            (*default as i32).serialize(code)?;
            low.serialize(code)?;
            (low + targets.len() as i32 - 1).serialize(code)?;
            for target in targets {
                (*target as i32).serialize(code)?;
            }
        }
        BranchInstruction::LookupSwitch { default, targets } => {
            0xabu8.serialize(code)?;
            code.extend(std::iter::repeat(0).take(super::switch_padding(offset)));
            (*default as i32).serialize(code)?;
            (targets.len() as i32).serialize(code)?;
            for (key, target) in targets {
                key.serialize(code)?;
                (*target as i32).serialize(code)?;
            }
        }
        BranchInstruction::IReturn => 0xacu8.serialize(code)?,
        BranchInstruction::LReturn => 0xadu8.serialize(code)?,
        BranchInstruction::FReturn => 0xaeu8.serialize(code)?,
        BranchInstruction::DReturn => 0xafu8.serialize(code)?,
        BranchInstruction::AReturn => 0xb0u8.serialize(code)?,
        BranchInstruction::Return => 0xb1u8.serialize(code)?,
        BranchInstruction::AThrow => 0xbfu8.serialize(code)?,
        BranchInstruction::Ret(idx) => match u8::try_from(*idx) {
            Ok(idx) => {
                0xa9u8.serialize(code)?;
                idx.serialize(code)?;
            }
            Err(_) => {
                0xc4u8.serialize(code)?;
                0xa9u8.serialize(code)?;
                idx.serialize(code)?;
            }
        },
        BranchInstruction::If(..)
        | BranchInstruction::IfICmp(..)
        | BranchInstruction::IfACmp(..)
        | BranchInstruction::IfNull(..) => (),
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{Instruction, LabelGenerator, OrdComparison};

    fn nops(count: usize) -> impl Iterator<Item = CodeElement> {
        std::iter::repeat(CodeElement::Instruction(Instruction::Nop)).take(count)
    }

    #[test]
    fn short_jumps_stay_short() {
        let mut labels = LabelGenerator::default();
        let end = labels.fresh_label();
        let mut elements = vec![CodeElement::Branch(BranchInstruction::Goto(end))];
        elements.extend(nops(4));
        elements.push(CodeElement::Label(end));
        elements.push(CodeElement::Branch(BranchInstruction::Return));

        let layout = layout(&elements, false, &SIGNED_16BIT_JUMP_RANGE).unwrap();
        assert!(layout.widened.is_empty());
        let code = write_code(&elements, &layout).unwrap();
        assert_eq!(code, vec![0xa7, 0, 7, 0, 0, 0, 0, 0xb1]);
    }

    #[test]
    fn oversized_jumps_are_widened() {
        let mut labels = LabelGenerator::default();
        let end = labels.fresh_label();
        let mut elements = vec![
            CodeElement::Instruction(Instruction::IConst0),
            CodeElement::Branch(BranchInstruction::If(OrdComparison::EQ, end)),
            CodeElement::Branch(BranchInstruction::Goto(end)),
        ];
        elements.extend(nops(10));
        elements.push(CodeElement::Label(end));
        elements.push(CodeElement::Branch(BranchInstruction::Return));

        let small = RangeInclusive::new(-8, 8);
        let layout = layout(&elements, true, &small).unwrap();
        assert_eq!(layout.widened.len(), 2);
        let code = write_code(&elements, &layout).unwrap();
        assert_eq!(
            &code[..14],
            &[
                0x03, // iconst_0
                0x9a, 0, 8, // ifne +8
                0xc8, 0, 0, 0, 20, // goto_w +20 (from offset 4 to 24)
                0xc8, 0, 0, 0, 15, // goto_w +15 (from offset 9 to 24)
            ]
        );
        assert_eq!(code.len(), 25);

        assert!(matches!(
            super::layout(&elements, false, &small),
            Err(Error::UnencodableBranch(_))
        ));
    }

    #[test]
    fn unplaced_labels_are_reported() {
        let mut labels = LabelGenerator::default();
        let nowhere = labels.fresh_label();
        let elements = vec![CodeElement::Branch(BranchInstruction::Goto(nowhere))];
        assert!(matches!(
            layout(&elements, true, &SIGNED_16BIT_JUMP_RANGE),
            Err(Error::UnplacedLabel(_))
        ));
    }
}
