use std::fmt;

/// Opaque label standing in for the offset of an instruction which may not have been emitted yet
///
/// Labels are created by [`super::CodeBuilder::fresh_label`] and get bound to the next
/// instruction emitted after they are placed.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(pub(crate) usize);

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Handle of an instruction in the instruction arena of a method
///
/// Handles are assigned in emission order, so the handle is also the index of the instruction in
/// the final code.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct InstructionId(pub usize);

impl fmt::Debug for InstructionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("#{}", self.0))
    }
}
