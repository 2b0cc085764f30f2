//! Manipulate JVM classes
//!
//! ### Simple example
//!
//! Consider the following simple Java class:
//!
//! ```java,ignore,no_run
//! public class Doubler {
//!     public static int twice(int x) {
//!         return x + x;
//!     }
//! }
//! ```
//!
//! Generating an analogous class file by hand can be done as follows (see [`crate::translate`]
//! for generating classes from syntax trees):
//!
//! ```
//! use classgen::jvm::class_file::{ClassFile, Method, Version};
//! use classgen::jvm::code::{opcode, CodeBuilder, Instruction, ValueKind};
//! use classgen::jvm::verifier::{OperandTypes, VerifierFrame};
//! use classgen::jvm::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! let class_name = BinaryName::from_string(String::from("demo/Doubler")).unwrap();
//! let mut constants = ConstantsPool::new();
//!
//! // Generate the method body
//! let descriptor = MethodDescriptor {
//!     parameters: vec![FieldType::int()],
//!     return_type: Some(FieldType::int()),
//! };
//! let this_type = RefType::Object(class_name.clone());
//! let entry_frame = VerifierFrame::entry(&this_type, true, false, &descriptor.parameters);
//! let mut code = CodeBuilder::new(&mut constants, entry_frame);
//! code.push_instruction(Instruction::load(ValueKind::Int, 0), OperandTypes::None)?;
//! code.push_instruction(Instruction::load(ValueKind::Int, 0), OperandTypes::None)?;
//! code.push_instruction(Instruction::make(&opcode::IADD, &[]), OperandTypes::None)?;
//! code.push_instruction(Instruction::make(&opcode::IRETURN, &[]), OperandTypes::None)?;
//! let code = code.result()?.serialize_code(&mut constants)?;
//!
//! let method = Method {
//!     access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     name_index: constants.get_utf8("twice")?,
//!     descriptor_index: constants.get_utf8(descriptor.render())?,
//!     attributes: vec![constants.get_attribute(code)?],
//! };
//!
//! // Finally, encode the class into bytes
//! let this_class = class_name.constant_index(&mut constants)?;
//! let super_class = BinaryName::OBJECT.constant_index(&mut constants)?;
//! let class_file = ClassFile {
//!     version: Version::JAVA8,
//!     constants: constants.into_constants(),
//!     access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//!     this_class,
//!     super_class,
//!     interfaces: vec![],
//!     fields: vec![],
//!     methods: vec![method],
//!     attributes: vec![],
//! };
//! let class_bytes: Vec<u8> = class_file.to_bytes()?;
//! assert_eq!(class_bytes[..4], ClassFile::MAGIC);
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
mod binary_format;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod members;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use binary_format::*;
pub use class_file::{
    ClassConstantIndex, Constant, ConstantData, ConstantIndex, ConstantPoolOverflow,
    ConstantsPool, ConstantsWriter, FieldRefConstantIndex, MethodRefConstantIndex,
    NameAndTypeConstantIndex, StringConstantIndex, Utf8ConstantIndex,
};
pub use descriptors::*;
pub use errors::*;
pub use members::*;
pub use names::*;
