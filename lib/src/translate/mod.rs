//! Translation from the type-checked syntax tree into class files
//!
//! [`translate_class`] is the entry point. Each method body is generated by a
//! [`MethodTranslator`], which emits instructions through a [`crate::jvm::code::CodeBuilder`] so
//! that the stack map frames come out of the same pass as the code.

mod class;
mod code_builder_exts;
mod errors;
mod locals;
mod method;
mod settings;

pub use class::*;
pub use code_builder_exts::*;
pub use errors::*;
pub use locals::*;
pub use method::*;
pub use settings::*;
