use crate::jvm;

#[derive(Debug)]
pub enum Error {
    BytecodeGen(jvm::Error),

    /// Syntax tree shape that code generation does not handle (this means an earlier phase let
    /// something through that it should have rejected)
    UnsupportedNode(String),

    /// Use of a local that was never declared (or is out of scope)
    UnknownLocal(crate::ast::LocalId),

    /// `break` or `continue` outside of a (matching) loop
    MisplacedJump(Option<String>),

    /// Setting names that are not valid in a class file
    MalformedName(String),

    /// Methods which exceeded a limit of the class file format
    ///
    /// Code generation carries on with the other methods of the class when one is too large, so
    /// all of the failures get reported together.
    MethodsTooLarge(Vec<MethodTooLarge>),
}

/// Method that could not be generated since it exceeds a class file limit
#[derive(Debug)]
pub struct MethodTooLarge {
    pub class: jvm::BinaryName,
    pub method: jvm::UnqualifiedName,
    pub descriptor: String,
    pub error: jvm::Error,
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::BytecodeGen(err)
    }
}

impl From<jvm::ConstantPoolOverflow> for Error {
    fn from(err: jvm::ConstantPoolOverflow) -> Error {
        Error::BytecodeGen(err.into())
    }
}
