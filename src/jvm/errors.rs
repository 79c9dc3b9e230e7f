use super::code::Label;
use super::Constant;

/// Errors from reading, editing, or writing class files
#[derive(Debug)]
pub enum Error {
    /// Reading failed, usually because the input was truncated
    IoError(std::io::Error),

    BadMagic(u32),
    BadConstantTag {
        index: u16,
        tag: u8,
    },

    /// Index is zero, out of range, or points at the second half of a `long`/`double`
    BadConstantIndex(u16),

    /// Constant exists, but it isn't the kind of constant expected at this position
    UnexpectedConstant {
        index: u16,
        expected: &'static str,
    },
    BadModifiedUtf8 {
        index: u16,
    },
    BadDescriptor(String),
    BadName(String),

    /// Trailing bytes after the last class file structure
    TrailingBytes(usize),

    UnknownOpcode {
        offset: usize,
        opcode: u8,
    },

    /// Jump or table entry does not land on an instruction boundary
    BadJumpTarget {
        offset: usize,
        target: isize,
    },
    MalformedAttribute {
        name: &'static str,
        reason: String,
    },

    ConstantPoolOverflow {
        constant: Constant,
        offset: usize,
    },

    /// Encoded method body is longer than 65535 bytes
    MethodCodeOverflow(usize),
    MethodCodeMaxStackOverflow(usize),
    MethodCodeMaxLocalsOverflow(usize),

    /// A label is referenced by an instruction or table but never placed
    UnplacedLabel(Label),

    /// Stack depths at a label don't agree between two incoming edges
    InconsistentStackDepth {
        label: Label,
        first: usize,
        second: usize,
    },

    /// Instruction pops more than the stack holds (index into the body's elements)
    StackUnderflow {
        element: usize,
    },

    /// Conditional branch whose target is out of range in a method that carries stack map
    /// frames (the rewrite would need a frame that can't be reconstructed)
    UnencodableBranch(Label),

    /// A method index does not exist
    NoSuchMethod(usize),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
