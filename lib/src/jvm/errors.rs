use crate::jvm::class_file::ConstantPoolOverflow;
use crate::jvm::code::{InstructionId, Label};
use crate::jvm::verifier::VerifierFrame;
use crate::jvm::Constant;

#[derive(Debug)]
pub enum Error {
    /// The constant pool cannot hold another entry
    ConstantPoolOverflow {
        constant: Constant,
        offset: u16,
    },
    IoError(std::io::Error),

    /// Method code is longer than the 65535 bytes a `Code` attribute can hold
    MethodCodeOverflow(usize),
    MethodCodeMaxStackOverflow(usize),
    MethodCodeMaxLocalsOverflow(usize),

    /// Branch offset does not fit in the signed 16-bit operand of the branch instruction
    BranchOffsetOverflow {
        branch_offset: usize,
        destination_offset: usize,
    },

    /// A label was jumped to, but never placed
    UnplacedLabel(Label),
    DuplicateLabel(Label),

    /// A label that was jumped to was placed after the last instruction
    LabelAtEndOfCode(Label),

    /// A backwards jump to a label which was placed where control could not reach
    UnreachableLabel(Label),

    /// Control can fall off the end of the method
    MethodCodeNotFinished,

    /// The simulator could not apply an instruction to the current frame
    VerifierError {
        instruction_id: InstructionId,
        instruction: String,
        kind: VerifierErrorKind,
        frame: VerifierFrame,
    },

    /// Two edges reaching the same label have frames that cannot be reconciled
    IncompatibleFrames(Label, VerifierFrame, VerifierFrame),

    /// Class file bytes do not describe a class we can read
    MalformedClassFile(String),
}

impl Error {
    /// Does this error mean the method exceeded a limit of the class file format?
    ///
    /// These are the only errors that can be caused by a well-typed input (rather than a bug in an
    /// earlier phase or in the generator itself).
    pub fn is_method_too_large(&self) -> bool {
        matches!(
            self,
            Error::ConstantPoolOverflow { .. }
                | Error::MethodCodeOverflow(_)
                | Error::MethodCodeMaxStackOverflow(_)
                | Error::MethodCodeMaxLocalsOverflow(_)
                | Error::BranchOffsetOverflow { .. }
        )
    }
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow {
            constant: overflow.constant,
            offset: overflow.offset,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierErrorKind {
    /// Popping from an empty stack
    EmptyStack,

    /// Reading a local slot which holds no value
    InvalidIndex(u16),

    /// Local variable instruction without a slot
    MissingLocal,

    /// Value on the stack has the wrong type for the instruction
    InvalidType,

    /// The instruction needs types from the syntax tree that weren't supplied
    MissingOperandTypes,

    /// Initializer called on something which isn't an uninitialized object
    NotUninitialized,

    /// Branching instruction pushed without a destination
    MissingDestination,
}

