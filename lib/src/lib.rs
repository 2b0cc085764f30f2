//! Class file generation for a small Java-like language
//!
//! The crate takes a type-checked syntax tree ([`ast`]) and produces JVM class files. Most of the
//! work happens in [`jvm::code::CodeBuilder`], which tracks the verifier's view of the operand
//! stack and locals alongside every instruction it emits. That way the `StackMapTable` needed by
//! the JVM's type-checking verifier falls out of code generation instead of requiring a separate
//! data-flow analysis.

pub mod ast;
pub mod jvm;
pub mod translate;
