//! Read, edit, and write JVM classes
//!
//! The layers, from the bottom up:
//!
//!   - [`class_file`] is the raw class file format. Everything round trips, including
//!     attributes this crate knows nothing about.
//!   - [`code`] turns a `Code` attribute into a label-based instruction list and back,
//!     recomputing offsets, jump widths, the maximum stack depth, and stack map frames.
//!   - [`model`] wraps a parsed class into something that can have interfaces, fields, and
//!     methods added to it, and whose method bodies can be swapped out.
//!
//! ### Simple example
//!
//! Adding a getter for a field that already exists:
//!
//! ```
//! use jweave::jvm::model::{BinaryClass, MethodSpec};
//! use jweave::jvm::code::{BranchInstruction, Instruction, MethodBody};
//! use jweave::jvm::class_file::Version;
//! use jweave::jvm::*;
//!
//! # fn generate_class() -> Result<Vec<u8>, Error> {
//! let mut class = BinaryClass::new(
//!     Version::JAVA8,
//!     ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//!     "me/acme/Point",
//!     Some("java/lang/Object"),
//! )?;
//!
//! let x = class.constants.get_field_ref("me/acme/Point", "x", "I")?;
//! let mut body = MethodBody::new();
//! body.push_instruction(Instruction::ALoad(0));
//! body.push_instruction(Instruction::GetField(x));
//! body.push_branch(BranchInstruction::IReturn);
//!
//! class.add_method(MethodSpec {
//!     access_flags: MethodAccessFlags::PUBLIC,
//!     name: String::from("getX"),
//!     descriptor: String::from("()I"),
//!     body: Some(body),
//!     exceptions: vec![],
//! })?;
//!
//! let class_bytes: Vec<u8> = class.serialize()?;
//! # Ok(class_bytes)
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
pub mod model;
mod names;

pub use access_flags::*;
pub use class_file::{
    ClassConstantIndex, Constant, ConstantIndex, ConstantsPool, FieldRefConstantIndex,
    InvokeDynamicConstantIndex, MethodRefConstantIndex, NameAndTypeConstantIndex,
    StringConstantIndex, Utf8ConstantIndex,
};
pub use descriptors::*;
pub use errors::*;
pub use names::*;
