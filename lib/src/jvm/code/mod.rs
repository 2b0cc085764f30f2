//! Bytecode representation and generation
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file - it contains the actual
//! executable instructions. Every one of the [bytecode instructions][0] is described by a static
//! [`Opcode`], whose [`StackEffect`] tells the verifier how the instruction transforms the frame.
//!
//! Branches are the only instructions whose encoding depends on where other instructions end up.
//! They target [`Label`]s and always use the two byte offset form, so the size of every
//! instruction is known as soon as it is constructed and a single pass assigns all offsets (see
//! [`Code::resolve_offsets`]).
//!
//! ### Code generation
//!
//! Since there is actually a little bit more that the JVM needs (see [`crate::jvm::verifier`]), it
//! can get quite tedious and error prone to generate valid bytecode. In order to aid in this
//! process, [`CodeBuilder`] provides an interface for generating method code from top to bottom
//! and doing the verification incrementally.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html#jvms-6.5

mod code;
mod code_builder;
mod decode;
mod instruction;
mod label;
pub mod opcode;

pub use code::*;
pub use code_builder::*;
pub use decode::*;
pub use instruction::*;
pub use label::*;
pub use opcode::{negate_branch, Opcode, StackEffect, ValueKind};
