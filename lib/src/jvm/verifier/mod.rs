//! Bytecode verification utilities
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`VerifierFrame`]) and the set of stack map frames for all
//! possible jump targets in a method is the _stack map table_.
//!
//! Knowing the stack map frame at a point in the code makes it possible to verify that the next
//! instruction makes sense (eg. `fadd` only makes sense if the top two elements on the stack are
//! of type `float`). The "types" used in verification (represented using [`VerificationType`])
//! are slightly augumented to take into account initialization and null.
//!
//! The JVM [verifies by type-checking][0]: it doesn't infer frames at jump targets, but reads
//! them from the [`crate::jvm::class_file::StackMapTable`] attribute of the method. Here, frames
//! are tracked while the code is generated (see [`VerifierFrame::verify_instruction`]) and
//! captured at every jump target. The captured frames are then delta-encoded into the most
//! compact stack map frame variants (see [`stack_map_table`]).
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod stack_map;
mod types;

pub use frame::*;
pub use stack_map::*;
pub use types::*;
