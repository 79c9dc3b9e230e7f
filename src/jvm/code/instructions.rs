//! This module contains the AST of JVM bytecode. The representations is slightly different from
//! the usual presentation to make it more convenient to edit bytecode. For instance:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches and also simplifies tasks like inverting a
//!     branch condition.
//!
//!   - Short and long forms (`ldc`/`ldc_w`, `goto`/`goto_w`, `iload_0`/`iload`) are one
//!     instruction. The encoder picks the form.

use crate::jvm::class_file::{Deserialize, Serialize};
use crate::jvm::{
    BaseType, ClassConstantIndex, ConstantIndex, ConstantsPool, Error, FieldRefConstantIndex,
    InvokeDynamicConstantIndex, MethodRefConstantIndex,
};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::convert::TryFrom;
use std::io::{Cursor, Result};
use std::ops::Not;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantIndex), // covers both `ldc` and `ldc_w`
    Ldc2(ConstantIndex),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRefConstantIndex),
    PutStatic(FieldRefConstantIndex),
    GetField(FieldRefConstantIndex),
    PutField(FieldRefConstantIndex),
    Invoke(InvokeType, MethodRefConstantIndex),
    InvokeDynamic(InvokeDynamicConstantIndex),
    New(ClassConstantIndex),
    NewArray(BaseType),
    ANewArray(ClassConstantIndex),
    ArrayLength,
    CheckCast(ClassConstantIndex),
    InstanceOf(ClassConstantIndex),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(ClassConstantIndex, u8),
}

impl Width for Instruction {
    fn width(&self) -> usize {
        match self {
            Instruction::Nop
            | Instruction::AConstNull
            | Instruction::IConstM1
            | Instruction::IConst0
            | Instruction::IConst1
            | Instruction::IConst2
            | Instruction::IConst3
            | Instruction::IConst4
            | Instruction::IConst5
            | Instruction::LConst0
            | Instruction::LConst1
            | Instruction::FConst0
            | Instruction::FConst1
            | Instruction::FConst2
            | Instruction::DConst0
            | Instruction::DConst1
            | Instruction::ILoad(0..=3)
            | Instruction::LLoad(0..=3)
            | Instruction::FLoad(0..=3)
            | Instruction::DLoad(0..=3)
            | Instruction::ALoad(0..=3)
            | Instruction::IALoad
            | Instruction::LALoad
            | Instruction::FALoad
            | Instruction::DALoad
            | Instruction::AALoad
            | Instruction::BALoad
            | Instruction::CALoad
            | Instruction::SALoad
            | Instruction::IStore(0..=3)
            | Instruction::LStore(0..=3)
            | Instruction::FStore(0..=3)
            | Instruction::DStore(0..=3)
            | Instruction::AStore(0..=3)
            | Instruction::IAStore
            | Instruction::LAStore
            | Instruction::FAStore
            | Instruction::DAStore
            | Instruction::AAStore
            | Instruction::BAStore
            | Instruction::CAStore
            | Instruction::SAStore
            | Instruction::Pop
            | Instruction::Pop2
            | Instruction::Dup
            | Instruction::DupX1
            | Instruction::DupX2
            | Instruction::Dup2
            | Instruction::Dup2X1
            | Instruction::Dup2X2
            | Instruction::Swap
            | Instruction::IAdd
            | Instruction::LAdd
            | Instruction::FAdd
            | Instruction::DAdd
            | Instruction::ISub
            | Instruction::LSub
            | Instruction::FSub
            | Instruction::DSub
            | Instruction::IMul
            | Instruction::LMul
            | Instruction::FMul
            | Instruction::DMul
            | Instruction::IDiv
            | Instruction::LDiv
            | Instruction::FDiv
            | Instruction::DDiv
            | Instruction::IRem
            | Instruction::LRem
            | Instruction::FRem
            | Instruction::DRem
            | Instruction::INeg
            | Instruction::LNeg
            | Instruction::FNeg
            | Instruction::DNeg
            | Instruction::ISh(_)
            | Instruction::LSh(_)
            | Instruction::IAnd
            | Instruction::LAnd
            | Instruction::IOr
            | Instruction::LOr
            | Instruction::IXor
            | Instruction::LXor
            | Instruction::I2L
            | Instruction::I2F
            | Instruction::I2D
            | Instruction::L2I
            | Instruction::L2F
            | Instruction::L2D
            | Instruction::F2I
            | Instruction::F2L
            | Instruction::F2D
            | Instruction::D2I
            | Instruction::D2L
            | Instruction::D2F
            | Instruction::I2B
            | Instruction::I2C
            | Instruction::I2S
            | Instruction::LCmp
            | Instruction::FCmp(_)
            | Instruction::DCmp(_)
            | Instruction::ArrayLength
            | Instruction::MonitorEnter
            | Instruction::MonitorExit => 1,

            Instruction::BiPush(_)
            | Instruction::ILoad(4..=255)
            | Instruction::LLoad(4..=255)
            | Instruction::FLoad(4..=255)
            | Instruction::DLoad(4..=255)
            | Instruction::ALoad(4..=255)
            | Instruction::IStore(4..=255)
            | Instruction::LStore(4..=255)
            | Instruction::FStore(4..=255)
            | Instruction::DStore(4..=255)
            | Instruction::AStore(4..=255)
            | Instruction::Ldc(ConstantIndex(0..=255))
            | Instruction::NewArray(_) => 2,

            Instruction::SiPush(_)
            | Instruction::Ldc(_)
            | Instruction::Ldc2(_) // always wide, unlike `ldc` vs. `ldc_w`
            | Instruction::IInc(0..=255, -128..=127)
            | Instruction::GetStatic(_)
            | Instruction::PutStatic(_)
            | Instruction::GetField(_)
            | Instruction::PutField(_)
            | Instruction::Invoke(InvokeType::Special, _)
            | Instruction::Invoke(InvokeType::Static, _)
            | Instruction::Invoke(InvokeType::Virtual, _)
            | Instruction::New(_)
            | Instruction::ANewArray(_)
            | Instruction::CheckCast(_)
            | Instruction::InstanceOf(_) => 3,

            Instruction::ILoad(_)
            | Instruction::LLoad(_)
            | Instruction::FLoad(_)
            | Instruction::DLoad(_)
            | Instruction::ALoad(_)
            | Instruction::IStore(_)
            | Instruction::LStore(_)
            | Instruction::FStore(_)
            | Instruction::DStore(_)
            | Instruction::AStore(_)
            | Instruction::MultiANewArray(_, _) => 4,

            Instruction::Invoke(InvokeType::Interface(_), _) | Instruction::InvokeDynamic(_) => 5,

            Instruction::IInc(_, _) => 6,
        }
    }
}

impl Instruction {
    /// Local variable slot accessed by the instruction, and how many slots the value spans
    pub fn local_access(&self) -> Option<(u16, u16)> {
        match self {
            Instruction::ILoad(idx)
            | Instruction::FLoad(idx)
            | Instruction::ALoad(idx)
            | Instruction::IStore(idx)
            | Instruction::FStore(idx)
            | Instruction::AStore(idx)
            | Instruction::IInc(idx, _) => Some((*idx, 1)),
            Instruction::LLoad(idx)
            | Instruction::DLoad(idx)
            | Instruction::LStore(idx)
            | Instruction::DStore(idx) => Some((*idx, 2)),
            _ => None,
        }
    }
}

impl Serialize for Instruction {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        /* The load/store instructions follow the same pattern:
         *
         *   - short form (0-3) have special bytes
         *   - normal form (0-255) use `iload` plus a byte operand
         *   - wide form (255-65535) use `wide iload` plus two byte operands
         */
        fn serialize_load_or_store<W: WriteBytesExt>(
            idx: u16,
            short_form_start: u8,
            normal_form: u8,
            writer: &mut W,
        ) -> Result<()> {
            match u8::try_from(idx) {
                Ok(n @ 0..=3) => (short_form_start + n).serialize(writer),
                Ok(n) => {
                    normal_form.serialize(writer)?;
                    n.serialize(writer)
                }
                Err(_) => {
                    0xC4u8.serialize(writer)?;
                    normal_form.serialize(writer)?;
                    idx.serialize(writer)
                }
            }
        }

        fn with_index<W: WriteBytesExt>(
            opcode: u8,
            index: impl Into<ConstantIndex>,
            writer: &mut W,
        ) -> Result<()> {
            opcode.serialize(writer)?;
            index.into().serialize(writer)
        }

        match self {
            Instruction::Nop => 0x00u8.serialize(writer)?,
            Instruction::AConstNull => 0x01u8.serialize(writer)?,
            Instruction::IConstM1 => 0x02u8.serialize(writer)?,
            Instruction::IConst0 => 0x03u8.serialize(writer)?,
            Instruction::IConst1 => 0x04u8.serialize(writer)?,
            Instruction::IConst2 => 0x05u8.serialize(writer)?,
            Instruction::IConst3 => 0x06u8.serialize(writer)?,
            Instruction::IConst4 => 0x07u8.serialize(writer)?,
            Instruction::IConst5 => 0x08u8.serialize(writer)?,
            Instruction::LConst0 => 0x09u8.serialize(writer)?,
            Instruction::LConst1 => 0x0au8.serialize(writer)?,
            Instruction::FConst0 => 0x0bu8.serialize(writer)?,
            Instruction::FConst1 => 0x0cu8.serialize(writer)?,
            Instruction::FConst2 => 0x0du8.serialize(writer)?,
            Instruction::DConst0 => 0x0eu8.serialize(writer)?,
            Instruction::DConst1 => 0x0fu8.serialize(writer)?,
            Instruction::BiPush(b) => {
                0x10u8.serialize(writer)?;
                b.serialize(writer)?;
            }
            Instruction::SiPush(s) => {
                0x11u8.serialize(writer)?;
                s.serialize(writer)?;
            }
            Instruction::Ldc(ConstantIndex(idx)) => match u8::try_from(*idx) {
                Ok(b) => {
                    0x12u8.serialize(writer)?;
                    b.serialize(writer)?;
                }
                Err(_) => {
                    0x13u8.serialize(writer)?;
                    idx.serialize(writer)?;
                }
            },
            Instruction::Ldc2(idx) => with_index(0x14, *idx, writer)?,
            Instruction::ILoad(idx) => serialize_load_or_store(*idx, 0x1A, 0x15, writer)?,
            Instruction::LLoad(idx) => serialize_load_or_store(*idx, 0x1E, 0x16, writer)?,
            Instruction::FLoad(idx) => serialize_load_or_store(*idx, 0x22, 0x17, writer)?,
            Instruction::DLoad(idx) => serialize_load_or_store(*idx, 0x26, 0x18, writer)?,
            Instruction::ALoad(idx) => serialize_load_or_store(*idx, 0x2A, 0x19, writer)?,
            Instruction::IALoad => 0x2eu8.serialize(writer)?,
            Instruction::LALoad => 0x2fu8.serialize(writer)?,
            Instruction::FALoad => 0x30u8.serialize(writer)?,
            Instruction::DALoad => 0x31u8.serialize(writer)?,
            Instruction::AALoad => 0x32u8.serialize(writer)?,
            Instruction::BALoad => 0x33u8.serialize(writer)?,
            Instruction::CALoad => 0x34u8.serialize(writer)?,
            Instruction::SALoad => 0x35u8.serialize(writer)?,
            Instruction::IStore(idx) => serialize_load_or_store(*idx, 0x3B, 0x36, writer)?,
            Instruction::LStore(idx) => serialize_load_or_store(*idx, 0x3F, 0x37, writer)?,
            Instruction::FStore(idx) => serialize_load_or_store(*idx, 0x43, 0x38, writer)?,
            Instruction::DStore(idx) => serialize_load_or_store(*idx, 0x47, 0x39, writer)?,
            Instruction::AStore(idx) => serialize_load_or_store(*idx, 0x4B, 0x3A, writer)?,
            Instruction::IAStore => 0x4fu8.serialize(writer)?,
            Instruction::LAStore => 0x50u8.serialize(writer)?,
            Instruction::FAStore => 0x51u8.serialize(writer)?,
            Instruction::DAStore => 0x52u8.serialize(writer)?,
            Instruction::AAStore => 0x53u8.serialize(writer)?,
            Instruction::BAStore => 0x54u8.serialize(writer)?,
            Instruction::CAStore => 0x55u8.serialize(writer)?,
            Instruction::SAStore => 0x56u8.serialize(writer)?,
            Instruction::Pop => 0x57u8.serialize(writer)?,
            Instruction::Pop2 => 0x58u8.serialize(writer)?,
            Instruction::Dup => 0x59u8.serialize(writer)?,
            Instruction::DupX1 => 0x5au8.serialize(writer)?,
            Instruction::DupX2 => 0x5bu8.serialize(writer)?,
            Instruction::Dup2 => 0x5cu8.serialize(writer)?,
            Instruction::Dup2X1 => 0x5du8.serialize(writer)?,
            Instruction::Dup2X2 => 0x5eu8.serialize(writer)?,
            Instruction::Swap => 0x5fu8.serialize(writer)?,
            Instruction::IAdd => 0x60u8.serialize(writer)?,
            Instruction::LAdd => 0x61u8.serialize(writer)?,
            Instruction::FAdd => 0x62u8.serialize(writer)?,
            Instruction::DAdd => 0x63u8.serialize(writer)?,
            Instruction::ISub => 0x64u8.serialize(writer)?,
            Instruction::LSub => 0x65u8.serialize(writer)?,
            Instruction::FSub => 0x66u8.serialize(writer)?,
            Instruction::DSub => 0x67u8.serialize(writer)?,
            Instruction::IMul => 0x68u8.serialize(writer)?,
            Instruction::LMul => 0x69u8.serialize(writer)?,
            Instruction::FMul => 0x6au8.serialize(writer)?,
            Instruction::DMul => 0x6bu8.serialize(writer)?,
            Instruction::IDiv => 0x6cu8.serialize(writer)?,
            Instruction::LDiv => 0x6du8.serialize(writer)?,
            Instruction::FDiv => 0x6eu8.serialize(writer)?,
            Instruction::DDiv => 0x6fu8.serialize(writer)?,
            Instruction::IRem => 0x70u8.serialize(writer)?,
            Instruction::LRem => 0x71u8.serialize(writer)?,
            Instruction::FRem => 0x72u8.serialize(writer)?,
            Instruction::DRem => 0x73u8.serialize(writer)?,
            Instruction::INeg => 0x74u8.serialize(writer)?,
            Instruction::LNeg => 0x75u8.serialize(writer)?,
            Instruction::FNeg => 0x76u8.serialize(writer)?,
            Instruction::DNeg => 0x77u8.serialize(writer)?,
            Instruction::ISh(ShiftType::Left) => 0x78u8.serialize(writer)?,
            Instruction::LSh(ShiftType::Left) => 0x79u8.serialize(writer)?,
            Instruction::ISh(ShiftType::ArithmeticRight) => 0x7au8.serialize(writer)?,
            Instruction::LSh(ShiftType::ArithmeticRight) => 0x7bu8.serialize(writer)?,
            Instruction::ISh(ShiftType::LogicalRight) => 0x7cu8.serialize(writer)?,
            Instruction::LSh(ShiftType::LogicalRight) => 0x7du8.serialize(writer)?,
            Instruction::IAnd => 0x7eu8.serialize(writer)?,
            Instruction::LAnd => 0x7fu8.serialize(writer)?,
            Instruction::IOr => 0x80u8.serialize(writer)?,
            Instruction::LOr => 0x81u8.serialize(writer)?,
            Instruction::IXor => 0x82u8.serialize(writer)?,
            Instruction::LXor => 0x83u8.serialize(writer)?,
            Instruction::IInc(idx, diff) => match (u8::try_from(*idx), i8::try_from(*diff)) {
                (Ok(b), Ok(d)) => {
                    0x84u8.serialize(writer)?;
                    b.serialize(writer)?;
                    d.serialize(writer)?;
                }
                _ => {
                    0xc4u8.serialize(writer)?;
                    0x84u8.serialize(writer)?;
                    idx.serialize(writer)?;
                    diff.serialize(writer)?;
                }
            },
            Instruction::I2L => 0x85u8.serialize(writer)?,
            Instruction::I2F => 0x86u8.serialize(writer)?,
            Instruction::I2D => 0x87u8.serialize(writer)?,
            Instruction::L2I => 0x88u8.serialize(writer)?,
            Instruction::L2F => 0x89u8.serialize(writer)?,
            Instruction::L2D => 0x8au8.serialize(writer)?,
            Instruction::F2I => 0x8bu8.serialize(writer)?,
            Instruction::F2L => 0x8cu8.serialize(writer)?,
            Instruction::F2D => 0x8du8.serialize(writer)?,
            Instruction::D2I => 0x8eu8.serialize(writer)?,
            Instruction::D2L => 0x8fu8.serialize(writer)?,
            Instruction::D2F => 0x90u8.serialize(writer)?,
            Instruction::I2B => 0x91u8.serialize(writer)?,
            Instruction::I2C => 0x92u8.serialize(writer)?,
            Instruction::I2S => 0x93u8.serialize(writer)?,
            Instruction::LCmp => 0x94u8.serialize(writer)?,
            Instruction::FCmp(CompareMode::L) => 0x95u8.serialize(writer)?,
            Instruction::FCmp(CompareMode::G) => 0x96u8.serialize(writer)?,
            Instruction::DCmp(CompareMode::L) => 0x97u8.serialize(writer)?,
            Instruction::DCmp(CompareMode::G) => 0x98u8.serialize(writer)?,
            Instruction::GetStatic(idx) => with_index(0xb2, *idx, writer)?,
            Instruction::PutStatic(idx) => with_index(0xb3, *idx, writer)?,
            Instruction::GetField(idx) => with_index(0xb4, *idx, writer)?,
            Instruction::PutField(idx) => with_index(0xb5, *idx, writer)?,
            Instruction::Invoke(InvokeType::Virtual, idx) => with_index(0xb6, *idx, writer)?,
            Instruction::Invoke(InvokeType::Special, idx) => with_index(0xb7, *idx, writer)?,
            Instruction::Invoke(InvokeType::Static, idx) => with_index(0xb8, *idx, writer)?,
            Instruction::Invoke(InvokeType::Interface(cnt), idx) => {
                with_index(0xb9, *idx, writer)?;
                cnt.serialize(writer)?;
                0u8.serialize(writer)?;
            }
            Instruction::InvokeDynamic(idx) => {
                with_index(0xba, *idx, writer)?;
                0u16.serialize(writer)?;
            }
            Instruction::New(idx) => with_index(0xbb, *idx, writer)?,
            Instruction::NewArray(basetype) => {
                0xbcu8.serialize(writer)?;
                array_type_code(*basetype).serialize(writer)?;
            }
            Instruction::ANewArray(idx) => with_index(0xbd, *idx, writer)?,
            Instruction::ArrayLength => 0xbeu8.serialize(writer)?,
            Instruction::CheckCast(idx) => with_index(0xc0, *idx, writer)?,
            Instruction::InstanceOf(idx) => with_index(0xc1, *idx, writer)?,
            Instruction::MonitorEnter => 0xc2u8.serialize(writer)?,
            Instruction::MonitorExit => 0xc3u8.serialize(writer)?,
            Instruction::MultiANewArray(idx, dimensions) => {
                with_index(0xc5, *idx, writer)?;
                dimensions.serialize(writer)?;
            }
        }
        Ok(())
    }
}

fn array_type_code(base_type: BaseType) -> u8 {
    match base_type {
        BaseType::Boolean => 4,
        BaseType::Char => 5,
        BaseType::Float => 6,
        BaseType::Double => 7,
        BaseType::Byte => 8,
        BaseType::Short => 9,
        BaseType::Int => 10,
        BaseType::Long => 11,
    }
}

/// Branching JVM bytecode instruction
///
/// The type parameter is the representation of jump targets: labels in an editable method
/// body, absolute code offsets straight after decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),                 // covers `goto` and `goto_w`
    Jsr(Lbl),                  // covers `jsr` and `jsr_w`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,
        /// Value associated with the first jump target
        low: i32,
        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,
        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
    Ret(u16), // covers `ret` and `wide ret`
}

impl<Lbl: Copy> BranchInstruction<Lbl> {
    /// Does control continue at the next instruction (for `jsr`, once the subroutine returns)?
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(..)
                | BranchInstruction::IfICmp(..)
                | BranchInstruction::IfACmp(..)
                | BranchInstruction::IfNull(..)
                | BranchInstruction::Jsr(_)
        )
    }

    /// Is this a two-way conditional branch?
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(..)
                | BranchInstruction::IfICmp(..)
                | BranchInstruction::IfACmp(..)
                | BranchInstruction::IfNull(..)
        )
    }

    /// Every explicit jump target (not including the fallthrough)
    pub fn jump_targets(&self) -> Vec<Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl)
            | BranchInstruction::Jsr(lbl) => vec![*lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                ts
            }
            BranchInstruction::LookupSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                ts
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow
            | BranchInstruction::Ret(_) => vec![],
        }
    }

    /// The same conditional branch with the condition inverted
    pub fn inverted(&self, target: Lbl) -> Option<BranchInstruction<Lbl>> {
        match self {
            BranchInstruction::If(op, _) => Some(BranchInstruction::If(!*op, target)),
            BranchInstruction::IfICmp(op, _) => Some(BranchInstruction::IfICmp(!*op, target)),
            BranchInstruction::IfACmp(op, _) => Some(BranchInstruction::IfACmp(!*op, target)),
            BranchInstruction::IfNull(op, _) => Some(BranchInstruction::IfNull(!*op, target)),
            _ => None,
        }
    }

    pub fn map_labels<Lbl2, E>(
        &self,
        map_label: impl Fn(&Lbl) -> std::result::Result<Lbl2, E>,
    ) -> std::result::Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;
        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            Jsr(lbl) => Jsr(map_label(lbl)?),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default)?,
                low: *low,
                targets: targets.iter().map(&map_label).collect::<std::result::Result<_, _>>()?,
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| Ok((*key, map_label(lbl)?)))
                    .collect::<std::result::Result<_, _>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
            Ret(idx) => Ret(*idx),
        })
    }

    /// Width of the instruction in its short form, when placed at `offset`
    ///
    /// Only switches depend on the offset (they are padded so their operands are 4-byte
    /// aligned).
    pub fn width_at(&self, offset: usize) -> usize {
        match self {
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => 1,
            BranchInstruction::Ret(0..=255) => 2,
            BranchInstruction::Ret(_) => 4,
            BranchInstruction::Goto(_)
            | BranchInstruction::Jsr(_)
            | BranchInstruction::If(..)
            | BranchInstruction::IfICmp(..)
            | BranchInstruction::IfACmp(..)
            | BranchInstruction::IfNull(..) => 3,
            BranchInstruction::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 4 * (3 + targets.len())
            }
            BranchInstruction::LookupSwitch { targets, .. } => {
                1 + switch_padding(offset) + 8 * (1 + targets.len())
            }
        }
    }
}

/// `tableswitch` and `lookupswitch` operands must start at a multiple of four bytes from the
/// start of the method, so there is a 0-3 inclusive byte padding after the opcode
pub fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// Result of decoding one instruction
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedInstruction {
    Instruction(Instruction),

    /// Branch with absolute offsets as targets
    Branch(BranchInstruction<usize>),
}

/// Decode the instruction at `offset`, returning it along with the offset of the next one
///
/// Every constant index is checked against the constant pool.
pub fn decode_instruction(
    code: &[u8],
    offset: usize,
    constants: &ConstantsPool,
) -> std::result::Result<(DecodedInstruction, usize), Error> {
    use DecodedInstruction::{Branch, Instruction as Insn};
    use Instruction::*;

    let mut reader = Cursor::new(code);
    reader.set_position(offset as u64);

    let target = |relative: i32| -> std::result::Result<usize, Error> {
        let absolute = offset as isize + relative as isize;
        if absolute < 0 || absolute as usize >= code.len() {
            Err(Error::BadJumpTarget {
                offset,
                target: absolute,
            })
        } else {
            Ok(absolute as usize)
        }
    };

    let opcode = u8::deserialize(&mut reader)?;
    let u8_operand = |reader: &mut Cursor<&[u8]>| u8::deserialize(reader);
    let u16_operand = |reader: &mut Cursor<&[u8]>| u16::deserialize(reader);
    let jump16 = |reader: &mut Cursor<&[u8]>| -> std::result::Result<usize, Error> {
        target(i16::deserialize(reader)? as i32)
    };

    let decoded = match opcode {
        0x00 => Insn(Nop),
        0x01 => Insn(AConstNull),
        0x02 => Insn(IConstM1),
        0x03 => Insn(IConst0),
        0x04 => Insn(IConst1),
        0x05 => Insn(IConst2),
        0x06 => Insn(IConst3),
        0x07 => Insn(IConst4),
        0x08 => Insn(IConst5),
        0x09 => Insn(LConst0),
        0x0a => Insn(LConst1),
        0x0b => Insn(FConst0),
        0x0c => Insn(FConst1),
        0x0d => Insn(FConst2),
        0x0e => Insn(DConst0),
        0x0f => Insn(DConst1),
        0x10 => Insn(BiPush(i8::deserialize(&mut reader)?)),
        0x11 => Insn(SiPush(i16::deserialize(&mut reader)?)),
        0x12 => Insn(Ldc(constants.loadable_index(u8_operand(&mut reader)? as u16)?)),
        0x13 => Insn(Ldc(constants.loadable_index(u16_operand(&mut reader)?)?)),
        0x14 => Insn(Ldc2(constants.loadable_index(u16_operand(&mut reader)?)?)),
        0x15 => Insn(ILoad(u8_operand(&mut reader)? as u16)),
        0x16 => Insn(LLoad(u8_operand(&mut reader)? as u16)),
        0x17 => Insn(FLoad(u8_operand(&mut reader)? as u16)),
        0x18 => Insn(DLoad(u8_operand(&mut reader)? as u16)),
        0x19 => Insn(ALoad(u8_operand(&mut reader)? as u16)),
        0x1a..=0x1d => Insn(ILoad((opcode - 0x1a) as u16)),
        0x1e..=0x21 => Insn(LLoad((opcode - 0x1e) as u16)),
        0x22..=0x25 => Insn(FLoad((opcode - 0x22) as u16)),
        0x26..=0x29 => Insn(DLoad((opcode - 0x26) as u16)),
        0x2a..=0x2d => Insn(ALoad((opcode - 0x2a) as u16)),
        0x2e => Insn(IALoad),
        0x2f => Insn(LALoad),
        0x30 => Insn(FALoad),
        0x31 => Insn(DALoad),
        0x32 => Insn(AALoad),
        0x33 => Insn(BALoad),
        0x34 => Insn(CALoad),
        0x35 => Insn(SALoad),
        0x36 => Insn(IStore(u8_operand(&mut reader)? as u16)),
        0x37 => Insn(LStore(u8_operand(&mut reader)? as u16)),
        0x38 => Insn(FStore(u8_operand(&mut reader)? as u16)),
        0x39 => Insn(DStore(u8_operand(&mut reader)? as u16)),
        0x3a => Insn(AStore(u8_operand(&mut reader)? as u16)),
        0x3b..=0x3e => Insn(IStore((opcode - 0x3b) as u16)),
        0x3f..=0x42 => Insn(LStore((opcode - 0x3f) as u16)),
        0x43..=0x46 => Insn(FStore((opcode - 0x43) as u16)),
        0x47..=0x4a => Insn(DStore((opcode - 0x47) as u16)),
        0x4b..=0x4e => Insn(AStore((opcode - 0x4b) as u16)),
        0x4f => Insn(IAStore),
        0x50 => Insn(LAStore),
        0x51 => Insn(FAStore),
        0x52 => Insn(DAStore),
        0x53 => Insn(AAStore),
        0x54 => Insn(BAStore),
        0x55 => Insn(CAStore),
        0x56 => Insn(SAStore),
        0x57 => Insn(Pop),
        0x58 => Insn(Pop2),
        0x59 => Insn(Dup),
        0x5a => Insn(DupX1),
        0x5b => Insn(DupX2),
        0x5c => Insn(Dup2),
        0x5d => Insn(Dup2X1),
        0x5e => Insn(Dup2X2),
        0x5f => Insn(Swap),
        0x60 => Insn(IAdd),
        0x61 => Insn(LAdd),
        0x62 => Insn(FAdd),
        0x63 => Insn(DAdd),
        0x64 => Insn(ISub),
        0x65 => Insn(LSub),
        0x66 => Insn(FSub),
        0x67 => Insn(DSub),
        0x68 => Insn(IMul),
        0x69 => Insn(LMul),
        0x6a => Insn(FMul),
        0x6b => Insn(DMul),
        0x6c => Insn(IDiv),
        0x6d => Insn(LDiv),
        0x6e => Insn(FDiv),
        0x6f => Insn(DDiv),
        0x70 => Insn(IRem),
        0x71 => Insn(LRem),
        0x72 => Insn(FRem),
        0x73 => Insn(DRem),
        0x74 => Insn(INeg),
        0x75 => Insn(LNeg),
        0x76 => Insn(FNeg),
        0x77 => Insn(DNeg),
        0x78 => Insn(ISh(ShiftType::Left)),
        0x79 => Insn(LSh(ShiftType::Left)),
        0x7a => Insn(ISh(ShiftType::ArithmeticRight)),
        0x7b => Insn(LSh(ShiftType::ArithmeticRight)),
        0x7c => Insn(ISh(ShiftType::LogicalRight)),
        0x7d => Insn(LSh(ShiftType::LogicalRight)),
        0x7e => Insn(IAnd),
        0x7f => Insn(LAnd),
        0x80 => Insn(IOr),
        0x81 => Insn(LOr),
        0x82 => Insn(IXor),
        0x83 => Insn(LXor),
        0x84 => {
            let idx = u8_operand(&mut reader)? as u16;
            Insn(IInc(idx, i8::deserialize(&mut reader)? as i16))
        }
        0x85 => Insn(I2L),
        0x86 => Insn(I2F),
        0x87 => Insn(I2D),
        0x88 => Insn(L2I),
        0x89 => Insn(L2F),
        0x8a => Insn(L2D),
        0x8b => Insn(F2I),
        0x8c => Insn(F2L),
        0x8d => Insn(F2D),
        0x8e => Insn(D2I),
        0x8f => Insn(D2L),
        0x90 => Insn(D2F),
        0x91 => Insn(I2B),
        0x92 => Insn(I2C),
        0x93 => Insn(I2S),
        0x94 => Insn(LCmp),
        0x95 => Insn(FCmp(CompareMode::L)),
        0x96 => Insn(FCmp(CompareMode::G)),
        0x97 => Insn(DCmp(CompareMode::L)),
        0x98 => Insn(DCmp(CompareMode::G)),
        0x99..=0x9e => {
            let op = OrdComparison::from_offset(opcode - 0x99);
            Branch(BranchInstruction::If(op, jump16(&mut reader)?))
        }
        0x9f..=0xa4 => {
            let op = OrdComparison::from_offset(opcode - 0x9f);
            Branch(BranchInstruction::IfICmp(op, jump16(&mut reader)?))
        }
        0xa5 => Branch(BranchInstruction::IfACmp(EqComparison::EQ, jump16(&mut reader)?)),
        0xa6 => Branch(BranchInstruction::IfACmp(EqComparison::NE, jump16(&mut reader)?)),
        0xa7 => Branch(BranchInstruction::Goto(jump16(&mut reader)?)),
        0xa8 => Branch(BranchInstruction::Jsr(jump16(&mut reader)?)),
        0xa9 => Branch(BranchInstruction::Ret(u8_operand(&mut reader)? as u16)),
        0xaa => {
            reader.set_position((offset + 1 + switch_padding(offset)) as u64);
            let default = target(i32::deserialize(&mut reader)?)?;
            let low = i32::deserialize(&mut reader)?;
            let high = i32::deserialize(&mut reader)?;
            if high < low {
                return Err(Error::BadJumpTarget {
                    offset,
                    target: offset as isize,
                });
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut targets = Vec::with_capacity(count.min(code.len()));
            for _ in 0..count {
                targets.push(target(i32::deserialize(&mut reader)?)?);
            }
            Branch(BranchInstruction::TableSwitch {
                default,
                low,
                targets,
            })
        }
        0xab => {
            reader.set_position((offset + 1 + switch_padding(offset)) as u64);
            let default = target(i32::deserialize(&mut reader)?)?;
            let count = i32::deserialize(&mut reader)?.max(0) as usize;
            let mut targets = Vec::with_capacity(count.min(code.len()));
            for _ in 0..count {
                let key = i32::deserialize(&mut reader)?;
                targets.push((key, target(i32::deserialize(&mut reader)?)?));
            }
            Branch(BranchInstruction::LookupSwitch { default, targets })
        }
        0xac => Branch(BranchInstruction::IReturn),
        0xad => Branch(BranchInstruction::LReturn),
        0xae => Branch(BranchInstruction::FReturn),
        0xaf => Branch(BranchInstruction::DReturn),
        0xb0 => Branch(BranchInstruction::AReturn),
        0xb1 => Branch(BranchInstruction::Return),
        0xb2 => Insn(GetStatic(constants.field_ref_index(u16_operand(&mut reader)?)?)),
        0xb3 => Insn(PutStatic(constants.field_ref_index(u16_operand(&mut reader)?)?)),
        0xb4 => Insn(GetField(constants.field_ref_index(u16_operand(&mut reader)?)?)),
        0xb5 => Insn(PutField(constants.field_ref_index(u16_operand(&mut reader)?)?)),
        0xb6..=0xb8 => {
            let typ = match opcode {
                0xb6 => InvokeType::Virtual,
                0xb7 => InvokeType::Special,
                _ => InvokeType::Static,
            };
            Insn(Invoke(typ, constants.method_ref_index(u16_operand(&mut reader)?)?))
        }
        0xb9 => {
            let method = constants.method_ref_index(u16_operand(&mut reader)?)?;
            let count = u8_operand(&mut reader)?;
            let _zero = u8_operand(&mut reader)?;
            Insn(Invoke(InvokeType::Interface(count), method))
        }
        0xba => {
            let indy = constants.invoke_dynamic_index(u16_operand(&mut reader)?)?;
            let _zero = u16_operand(&mut reader)?;
            Insn(InvokeDynamic(indy))
        }
        0xbb => Insn(New(constants.class_index(u16_operand(&mut reader)?)?)),
        0xbc => {
            let base_type = match u8_operand(&mut reader)? {
                4 => BaseType::Boolean,
                5 => BaseType::Char,
                6 => BaseType::Float,
                7 => BaseType::Double,
                8 => BaseType::Byte,
                9 => BaseType::Short,
                10 => BaseType::Int,
                11 => BaseType::Long,
                _ => return Err(Error::UnknownOpcode { offset, opcode }),
            };
            Insn(NewArray(base_type))
        }
        0xbd => Insn(ANewArray(constants.class_index(u16_operand(&mut reader)?)?)),
        0xbe => Insn(ArrayLength),
        0xbf => Branch(BranchInstruction::AThrow),
        0xc0 => Insn(CheckCast(constants.class_index(u16_operand(&mut reader)?)?)),
        0xc1 => Insn(InstanceOf(constants.class_index(u16_operand(&mut reader)?)?)),
        0xc2 => Insn(MonitorEnter),
        0xc3 => Insn(MonitorExit),
        0xc4 => {
            let modified = u8_operand(&mut reader)?;
            let idx = u16_operand(&mut reader)?;
            match modified {
                0x15 => Insn(ILoad(idx)),
                0x16 => Insn(LLoad(idx)),
                0x17 => Insn(FLoad(idx)),
                0x18 => Insn(DLoad(idx)),
                0x19 => Insn(ALoad(idx)),
                0x36 => Insn(IStore(idx)),
                0x37 => Insn(LStore(idx)),
                0x38 => Insn(FStore(idx)),
                0x39 => Insn(DStore(idx)),
                0x3a => Insn(AStore(idx)),
                0x84 => Insn(IInc(idx, i16::deserialize(&mut reader)?)),
                0xa9 => Branch(BranchInstruction::Ret(idx)),
                _ => {
                    return Err(Error::UnknownOpcode {
                        offset,
                        opcode: modified,
                    })
                }
            }
        }
        0xc5 => {
            let class = constants.class_index(u16_operand(&mut reader)?)?;
            Insn(MultiANewArray(class, u8_operand(&mut reader)?))
        }
        0xc6 => Branch(BranchInstruction::IfNull(EqComparison::EQ, jump16(&mut reader)?)),
        0xc7 => Branch(BranchInstruction::IfNull(EqComparison::NE, jump16(&mut reader)?)),
        0xc8 => Branch(BranchInstruction::Goto(target(i32::deserialize(&mut reader)?)?)),
        0xc9 => Branch(BranchInstruction::Jsr(target(i32::deserialize(&mut reader)?)?)),
        _ => return Err(Error::UnknownOpcode { offset, opcode }),
    };

    Ok((decoded, reader.position() as usize))
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl OrdComparison {
    /// Comparisons in opcode order (`ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`)
    const OPCODE_ORDER: [OrdComparison; 6] = [
        OrdComparison::EQ,
        OrdComparison::NE,
        OrdComparison::LT,
        OrdComparison::GE,
        OrdComparison::GT,
        OrdComparison::LE,
    ];

    fn from_offset(offset: u8) -> OrdComparison {
        OrdComparison::OPCODE_ORDER[offset as usize]
    }

    /// Position in opcode order
    pub fn opcode_offset(self) -> u8 {
        match self {
            OrdComparison::EQ => 0,
            OrdComparison::NE => 1,
            OrdComparison::LT => 2,
            OrdComparison::GE => 3,
            OrdComparison::GT => 4,
            OrdComparison::LE => 5,
        }
    }
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because the constant argument it expects is not to a
/// `Constant::MethodRef`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}
