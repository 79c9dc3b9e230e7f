//! Editable method bodies
//!
//! A `Code` attribute decodes into a [`MethodBody`]: a flat list of [`CodeElement`]s where jump
//! targets, exception ranges, line numbers, local variable ranges, and stack map frames all
//! refer to [`Label`]s. Encoding assigns offsets again, so instructions can be inserted or
//! removed without fixing up anything by hand.

mod body;
mod frame;
mod instructions;
pub mod jump_encoding;
mod label;
mod stack;

pub use body::*;
pub use frame::Frame;
pub use frame::FrameType;
pub use instructions::*;
pub use label::*;
