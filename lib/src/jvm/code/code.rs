use crate::jvm::class_file::{self, BytecodeArray};
use crate::jvm::code::{Instruction, InstructionId, Label};
use crate::jvm::verifier::{stack_map_table, VerifierFrame};
use crate::jvm::{ConstantsPool, Error};
use std::collections::{BTreeMap, HashMap};

/// Method body, as produced by [`crate::jvm::code::CodeBuilder`]
///
/// Branch targets are still labels here, and the frames are still keyed by instruction index:
/// byte offsets only get assigned in [`Code::resolve_offsets`].
#[derive(Debug)]
pub struct Code {
    pub max_stack: usize,
    pub max_locals: usize,
    pub instructions: Vec<Instruction>,

    /// Implicit frame on entry to the method
    pub entry_frame: VerifierFrame,

    /// Frames at the instructions that get jumped to
    pub frames: BTreeMap<usize, VerifierFrame>,

    /// Instruction index of every placed label
    pub label_positions: HashMap<Label, usize>,
}

/// Largest code array a `Code` attribute can hold
const MAX_CODE_LENGTH: usize = u16::MAX as usize;

impl Code {
    /// Assign a byte offset to each instruction, then patch branch operands
    ///
    /// Returns the total length of the code. Instruction sizes are fixed when the instructions
    /// are constructed, so one pass over the code is enough.
    pub fn resolve_offsets(&mut self) -> Result<usize, Error> {
        let mut offset = 0;
        for instruction in &mut self.instructions {
            instruction.offset = Some(offset);
            offset += instruction.size();
        }
        let code_length = offset;
        if code_length > MAX_CODE_LENGTH {
            return Err(Error::MethodCodeOverflow(code_length));
        }

        let offsets: Vec<usize> = self
            .instructions
            .iter()
            .map(|instruction| instruction.offset.unwrap_or(0))
            .collect();
        for (index, instruction) in self.instructions.iter_mut().enumerate() {
            let target = match &instruction.jump {
                Some(jump) => jump.target,
                None => continue,
            };
            let target_index = *self
                .label_positions
                .get(&target)
                .ok_or(Error::UnplacedLabel(target))?;
            let destination_offset = *offsets
                .get(target_index)
                .ok_or(Error::LabelAtEndOfCode(target))?;
            let branch_offset = offsets[index];

            let delta = i16::try_from(destination_offset as isize - branch_offset as isize)
                .map_err(|_| Error::BranchOffsetOverflow {
                    branch_offset,
                    destination_offset,
                })?;
            instruction.operands = delta.to_be_bytes().to_vec();
        }

        log::trace!("Resolved offsets: {} bytes of code", code_length);
        Ok(code_length)
    }

    /// Offset of an instruction (only meaningful once offsets are resolved)
    pub fn offset_of(&self, instruction_id: InstructionId) -> Option<usize> {
        self.instructions
            .get(instruction_id.0)
            .and_then(|instruction| instruction.offset)
    }

    /// Produce the `Code` attribute for this method body
    ///
    /// This resolves offsets, encodes the instructions, and attaches a `StackMapTable` attribute
    /// (omitted when there are no jump targets).
    pub fn serialize_code(mut self, constants: &mut ConstantsPool) -> Result<class_file::Code, Error> {
        let code_length = self.resolve_offsets()?;
        let max_stack = u16::try_from(self.max_stack)
            .map_err(|_| Error::MethodCodeMaxStackOverflow(self.max_stack))?;
        let max_locals = u16::try_from(self.max_locals)
            .map_err(|_| Error::MethodCodeMaxLocalsOverflow(self.max_locals))?;

        let mut code_array = Vec::with_capacity(code_length);
        for instruction in &self.instructions {
            instruction.encode(&mut code_array);
        }

        // Offsets of `new` instructions fit in `u16` since the code length does
        let instructions = &self.instructions;
        let offset_of = |InstructionId(index): InstructionId| -> u16 {
            instructions
                .get(index)
                .and_then(|instruction| instruction.offset)
                .unwrap_or(0) as u16
        };

        let entry_frame = self.entry_frame.into_serializable(constants, offset_of)?;
        let mut frames = Vec::with_capacity(self.frames.len());
        for (index, frame) in &self.frames {
            let offset = instructions
                .get(*index)
                .and_then(|instruction| instruction.offset)
                .unwrap_or(code_length) as u16;
            frames.push((offset, frame.into_serializable(constants, offset_of)?));
        }

        let mut attributes = vec![];
        if !frames.is_empty() {
            let table = stack_map_table(&entry_frame, &frames);
            attributes.push(constants.get_attribute(table)?);
        }

        log::debug!(
            "Serialized code: {} bytes, {} frames, max stack {}, max locals {}",
            code_length,
            frames.len(),
            max_stack,
            max_locals
        );
        Ok(class_file::Code {
            max_stack,
            max_locals,
            code_array: BytecodeArray(code_array),
            exception_table: vec![],
            attributes,
        })
    }
}
