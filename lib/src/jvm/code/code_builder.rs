use crate::jvm::code::{Code, Instruction, InstructionId, Label, Opcode, StackEffect};
use crate::jvm::verifier::{OperandTypes, VerifierFrame, VerifierType};
use crate::jvm::{ConstantsPool, Error, VerifierErrorKind};
use std::collections::{BTreeMap, HashMap};

/// This provides a slightly simplified interface for building up method bodies. It does internal
/// bookkeeping to track frames, labels, reachability, and maximum stack and locals.
///
/// ### Constructing verification frames
///
/// Every instruction is simulated as it is pushed, so the frame at the current point of the code
/// is always known. Branches snapshot that frame for their destination label. When a label gets
/// placed, the frames of all edges reaching it so far (jumps and the fallthrough) are merged:
/// stacks must be identical, and locals that disagree are dropped to `Top`. Jumps backwards to a
/// label that was already placed must be compatible with the frame recorded there.
///
/// ### Tracking reachability
///
/// After an unconditional jump or a return, the code is unreachable until a label which has been
/// jumped to is placed. Instructions pushed while the code is unreachable are dropped: the JVM
/// verifier wants stack map frames even for dead code, and there is no frame to give.
pub struct CodeBuilder<'c> {
    /// Constants pool of the class (shared across all methods)
    pub constants: &'c mut ConstantsPool,

    /// Instructions so far (indexed by `InstructionId`)
    instructions: Vec<Instruction>,

    /// Labels created so far (indexed by `Label`)
    labels: Vec<LabelState>,

    /// Frame at each instruction index where a label was placed
    placed_frames: BTreeMap<usize, VerifierFrame>,

    /// Implicit frame on entry to the method
    entry_frame: VerifierFrame,

    /// Frame after the last instruction, or `None` if the code is currently unreachable
    current: Option<VerifierFrame>,

    max_stack: usize,
    max_locals: usize,
}

#[derive(Default)]
struct LabelState {
    /// Index of the instruction the label is bound to
    placed: Option<usize>,

    /// Frame that holds at the label (merged from all the edges seen so far)
    frame: Option<VerifierFrame>,

    /// Locals at or past this slot are out of scope at the label
    locals_limit: Option<usize>,

    /// Whether some branch targets the label
    jumped_to: bool,
}

impl<'c> CodeBuilder<'c> {
    /// Create a builder for a new method
    pub fn new(constants: &'c mut ConstantsPool, entry_frame: VerifierFrame) -> CodeBuilder<'c> {
        let max_locals = entry_frame.locals.len();
        CodeBuilder {
            constants,
            instructions: vec![],
            labels: vec![],
            placed_frames: BTreeMap::new(),
            current: Some(entry_frame.clone()),
            entry_frame,
            max_stack: 0,
            max_locals,
        }
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> Label {
        self.labels.push(LabelState::default());
        Label(self.labels.len() - 1)
    }

    /// Generate a fresh label at which only locals below `locals_limit` are in scope
    pub fn fresh_scoped_label(&mut self, locals_limit: usize) -> Label {
        self.labels.push(LabelState {
            locals_limit: Some(locals_limit),
            ..LabelState::default()
        });
        Label(self.labels.len() - 1)
    }

    /// Is the next instruction reachable?
    pub fn is_reachable(&self) -> bool {
        self.current.is_some()
    }

    /// Frame after the last instruction (if reachable)
    pub fn current_frame(&self) -> Option<&VerifierFrame> {
        self.current.as_ref()
    }

    /// Push a new (non-branching) instruction
    ///
    /// `operand_types` supplies the types the simulator can't derive from the instruction alone.
    pub fn push_instruction(
        &mut self,
        instruction: Instruction,
        operand_types: OperandTypes,
    ) -> Result<(), Error> {
        let instruction_id = InstructionId(self.instructions.len());
        let frame = match self.current.as_mut() {
            Some(frame) => frame,
            None => {
                log::trace!("Dropping unreachable {:?}", instruction);
                return Ok(());
            }
        };

        if instruction.opcode.effect.is_branch() {
            return Err(Error::VerifierError {
                instruction_id,
                instruction: format!("{:?}", instruction),
                kind: VerifierErrorKind::MissingDestination,
                frame: frame.clone(),
            });
        }

        let mut next_frame = frame.clone();
        next_frame
            .verify_instruction(instruction_id, &instruction, &operand_types)
            .map_err(|kind| Error::VerifierError {
                instruction_id,
                instruction: format!("{:?}", instruction),
                kind,
                frame: frame.clone(),
            })?;
        *frame = next_frame;

        log::trace!("{:?}: {:?}", instruction_id, instruction);
        self.max_stack = self.max_stack.max(frame.stack.len());
        self.max_locals = self.max_locals.max(frame.locals.len());
        if instruction.opcode.effect.is_unconditional() {
            self.current = None;
        }
        self.instructions.push(instruction);
        Ok(())
    }

    /// Push a branch instruction
    ///
    /// The frame after the branch pops its operands is the frame expected at `target`.
    pub fn push_branch(&mut self, opcode: &'static Opcode, target: Label) -> Result<(), Error> {
        let instruction_id = InstructionId(self.instructions.len());
        let frame = match self.current.as_mut() {
            Some(frame) => frame,
            None => {
                log::trace!("Dropping unreachable {:?} {:?}", opcode, target);
                return Ok(());
            }
        };

        // Apply the pops of the comparison
        let mut instruction = Instruction::branch(opcode, target, VerifierFrame::default());
        let mut next_frame = frame.clone();
        next_frame
            .verify_instruction(instruction_id, &instruction, &OperandTypes::None)
            .map_err(|kind| Error::VerifierError {
                instruction_id,
                instruction: format!("{:?}", instruction),
                kind,
                frame: frame.clone(),
            })?;
        *frame = next_frame;

        // Snapshot of the frame at the destination
        let state = self
            .labels
            .get_mut(target.0)
            .ok_or(Error::UnplacedLabel(target))?;
        let mut snapshot = frame.clone();
        if let Some(limit) = state.locals_limit {
            snapshot.kill_locals(limit);
        }
        state.jumped_to = true;

        match state.placed {
            // Backwards jump: the frame at the label is final
            Some(index) => {
                let placed_frame = self
                    .placed_frames
                    .get(&index)
                    .ok_or(Error::UnreachableLabel(target))?;
                if !placed_frame.accepts(&snapshot) {
                    return Err(Error::IncompatibleFrames(
                        target,
                        placed_frame.clone(),
                        snapshot,
                    ));
                }
            }

            // Forwards jump: merge into the frame expected at the label
            None => match state.frame.as_mut() {
                None => state.frame = Some(snapshot.clone()),
                Some(expected) => {
                    if !expected.merge(&snapshot) {
                        return Err(Error::IncompatibleFrames(
                            target,
                            expected.clone(),
                            snapshot,
                        ));
                    }
                }
            },
        }

        log::trace!("{:?}: {:?} {:?}", instruction_id, opcode, target);
        self.max_stack = self.max_stack.max(frame.stack.len());
        if opcode.effect == StackEffect::Goto {
            self.current = None;
        }
        if let Some(jump) = instruction.jump.as_mut() {
            jump.frame = snapshot;
        }
        self.instructions.push(instruction);
        Ok(())
    }

    /// Bind a label to the next instruction
    ///
    /// If the label was never jumped to and the code is unreachable, the code stays unreachable
    /// (and everything up to the next reachable label gets dropped).
    pub fn place_label(&mut self, label: Label) -> Result<(), Error> {
        let index = self.instructions.len();
        let state = self
            .labels
            .get_mut(label.0)
            .ok_or(Error::UnplacedLabel(label))?;
        if state.placed.is_some() {
            return Err(Error::DuplicateLabel(label));
        }
        state.placed = Some(index);

        let fallthrough = self.current.take().map(|mut frame| {
            if let Some(limit) = state.locals_limit {
                frame.kill_locals(limit);
            }
            frame
        });
        let merged = match (fallthrough, state.frame.take()) {
            (None, None) => {
                log::trace!("{:?} is unreachable", label);
                return Ok(());
            }
            (Some(frame), None) | (None, Some(frame)) => frame,
            (Some(mut fallthrough), Some(jumped)) => {
                if !fallthrough.merge(&jumped) {
                    return Err(Error::IncompatibleFrames(label, jumped, fallthrough));
                }
                fallthrough
            }
        };

        log::trace!("{:?}: {:?}", label, merged);
        state.frame = Some(merged.clone());
        self.placed_frames.insert(index, merged.clone());
        self.current = Some(merged);
        Ok(())
    }

    /// Drop all locals from `first_slot` onwards (eg. at the end of a block)
    pub fn kill_locals(&mut self, first_slot: usize) {
        if let Some(frame) = self.current.as_mut() {
            frame.kill_locals(first_slot);
        }
    }

    /// Make sure `max_locals` is at least `locals`
    ///
    /// Locals get allocated before they are written, and a declared local might never be written.
    pub fn note_locals(&mut self, locals: usize) {
        self.max_locals = self.max_locals.max(locals);
    }

    /// Generalize the type at the top of the stack (eg. before two edges with different
    /// reference types join)
    pub fn generalize_top_stack_type(&mut self, general_type: VerifierType) -> Result<(), Error> {
        let instruction_id = InstructionId(self.instructions.len());
        if let Some(frame) = self.current.as_mut() {
            let before = frame.clone();
            frame
                .generalize_top_stack_type(general_type)
                .map_err(|kind| Error::VerifierError {
                    instruction_id,
                    instruction: String::from("<generalize>"),
                    kind,
                    frame: before,
                })?;
        }
        Ok(())
    }

    /// Finish the method, checking that every label jumped to was placed
    pub fn result(self) -> Result<Code, Error> {
        if self.current.is_some() {
            return Err(Error::MethodCodeNotFinished);
        }

        let mut label_positions = HashMap::new();
        let mut frames = BTreeMap::new();
        for (idx, state) in self.labels.iter().enumerate() {
            let label = Label(idx);
            match state.placed {
                Some(index) => {
                    label_positions.insert(label, index);
                    if state.jumped_to {
                        if index >= self.instructions.len() {
                            return Err(Error::LabelAtEndOfCode(label));
                        }
                        let frame = self
                            .placed_frames
                            .get(&index)
                            .ok_or(Error::UnreachableLabel(label))?;
                        frames.insert(index, frame.clone());
                    }
                }
                None if state.jumped_to => return Err(Error::UnplacedLabel(label)),
                None => (),
            }
        }

        Ok(Code {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            instructions: self.instructions,
            entry_frame: self.entry_frame,
            frames,
            label_positions,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{opcode, ValueKind};
    use crate::jvm::verifier::VerificationType;

    fn int_param_frame() -> VerifierFrame {
        VerifierFrame {
            locals: vec![VerificationType::Integer],
            stack: vec![],
        }
    }

    fn simple(opcode: &'static Opcode) -> Instruction {
        Instruction::make(opcode, &[])
    }

    #[test]
    fn straight_line() {
        let mut constants = ConstantsPool::new();
        let mut builder = CodeBuilder::new(&mut constants, int_param_frame());
        builder
            .push_instruction(Instruction::load(ValueKind::Int, 0), OperandTypes::None)
            .unwrap();
        builder
            .push_instruction(simple(&opcode::DUP), OperandTypes::None)
            .unwrap();
        builder
            .push_instruction(simple(&opcode::IADD), OperandTypes::None)
            .unwrap();
        builder
            .push_instruction(simple(&opcode::IRETURN), OperandTypes::None)
            .unwrap();
        assert!(!builder.is_reachable());

        let code = builder.result().unwrap();
        assert_eq!(code.max_stack, 2);
        assert_eq!(code.max_locals, 1);
        assert!(code.frames.is_empty());
    }

    #[test]
    fn forward_jump_merges_locals() {
        let mut constants = ConstantsPool::new();
        let mut builder = CodeBuilder::new(&mut constants, int_param_frame());
        let else_label = builder.fresh_label();
        let end_label = builder.fresh_label();

        builder
            .push_instruction(Instruction::load(ValueKind::Int, 0), OperandTypes::None)
            .unwrap();
        builder.push_branch(&opcode::IFEQ, else_label).unwrap();
        builder
            .push_instruction(Instruction::push_int(1).unwrap(), OperandTypes::None)
            .unwrap();
        builder
            .push_instruction(Instruction::store(ValueKind::Int, 1), OperandTypes::None)
            .unwrap();
        builder.push_branch(&opcode::GOTO, end_label).unwrap();
        assert!(!builder.is_reachable());

        // Dropped, since it is unreachable
        builder
            .push_instruction(simple(&opcode::NOP), OperandTypes::None)
            .unwrap();

        builder.place_label(else_label).unwrap();
        assert_eq!(builder.current_frame(), Some(&int_param_frame()));
        builder
            .push_instruction(simple(&opcode::FCONST_0), OperandTypes::None)
            .unwrap();
        builder
            .push_instruction(Instruction::store(ValueKind::Float, 1), OperandTypes::None)
            .unwrap();
        builder.place_label(end_label).unwrap();

        // Slot 1 is an `int` on one edge and a `float` on the other
        assert_eq!(builder.current_frame(), Some(&int_param_frame()));
        builder
            .push_instruction(simple(&opcode::RETURN), OperandTypes::None)
            .unwrap();

        let code = builder.result().unwrap();
        assert_eq!(code.instructions.len(), 8);
        assert_eq!(code.frames.keys().copied().collect::<Vec<_>>(), vec![5, 7]);
        assert_eq!(code.max_locals, 2);
    }

    #[test]
    fn backward_jumps_check_the_placed_frame() {
        let mut constants = ConstantsPool::new();
        let mut builder = CodeBuilder::new(&mut constants, int_param_frame());
        let head = builder.fresh_label();
        builder.place_label(head).unwrap();
        builder
            .push_instruction(Instruction::push_int(2).unwrap(), OperandTypes::None)
            .unwrap();
        builder
            .push_instruction(Instruction::store(ValueKind::Int, 0), OperandTypes::None)
            .unwrap();
        builder.push_branch(&opcode::GOTO, head).unwrap();
        assert!(builder.result().is_ok());

        let mut constants = ConstantsPool::new();
        let mut builder = CodeBuilder::new(&mut constants, int_param_frame());
        let head = builder.fresh_label();
        builder.place_label(head).unwrap();
        builder
            .push_instruction(simple(&opcode::FCONST_1), OperandTypes::None)
            .unwrap();
        builder
            .push_instruction(Instruction::store(ValueKind::Float, 0), OperandTypes::None)
            .unwrap();
        assert!(matches!(
            builder.push_branch(&opcode::GOTO, head),
            Err(Error::IncompatibleFrames(..))
        ));
    }

    #[test]
    fn scoped_labels_drop_inner_locals() {
        let mut constants = ConstantsPool::new();
        let mut builder = CodeBuilder::new(&mut constants, int_param_frame());
        let exit = builder.fresh_scoped_label(1);
        builder
            .push_instruction(Instruction::push_int(7).unwrap(), OperandTypes::None)
            .unwrap();
        builder
            .push_instruction(Instruction::store(ValueKind::Int, 1), OperandTypes::None)
            .unwrap();
        builder.push_branch(&opcode::GOTO, exit).unwrap();
        builder.place_label(exit).unwrap();
        assert_eq!(builder.current_frame(), Some(&int_param_frame()));
    }

    #[test]
    fn unfinished_and_unplaced() {
        let mut constants = ConstantsPool::new();
        let builder = CodeBuilder::new(&mut constants, int_param_frame());
        assert!(matches!(builder.result(), Err(Error::MethodCodeNotFinished)));

        let mut constants = ConstantsPool::new();
        let mut builder = CodeBuilder::new(&mut constants, int_param_frame());
        let nowhere = builder.fresh_label();
        builder.push_branch(&opcode::GOTO, nowhere).unwrap();
        assert!(matches!(builder.result(), Err(Error::UnplacedLabel(_))));

        // Placing a label after an unconditional jump to it leaves control falling off the end
        let mut constants = ConstantsPool::new();
        let mut builder = CodeBuilder::new(&mut constants, int_param_frame());
        let end = builder.fresh_label();
        builder.push_branch(&opcode::GOTO, end).unwrap();
        builder.place_label(end).unwrap();
        assert!(builder.is_reachable());
        assert!(matches!(builder.result(), Err(Error::MethodCodeNotFinished)));
    }

    #[test]
    fn labels_in_dead_code_stay_unreachable() {
        let mut constants = ConstantsPool::new();
        let mut builder = CodeBuilder::new(&mut constants, int_param_frame());
        let dead = builder.fresh_label();
        builder
            .push_instruction(simple(&opcode::RETURN), OperandTypes::None)
            .unwrap();
        builder.place_label(dead).unwrap();
        assert!(!builder.is_reachable());
        builder.push_branch(&opcode::GOTO, dead).unwrap();
        assert!(matches!(
            builder.place_label(dead),
            Err(Error::DuplicateLabel(_))
        ));
        let code = builder.result().unwrap();
        assert_eq!(code.instructions.len(), 1);
    }

    #[test]
    fn stack_mismatch_at_a_join() {
        let mut constants = ConstantsPool::new();
        let mut builder = CodeBuilder::new(&mut constants, int_param_frame());
        let join = builder.fresh_label();
        builder
            .push_instruction(Instruction::load(ValueKind::Int, 0), OperandTypes::None)
            .unwrap();
        builder
            .push_instruction(Instruction::load(ValueKind::Int, 0), OperandTypes::None)
            .unwrap();
        builder.push_branch(&opcode::IFEQ, join).unwrap();
        builder
            .push_instruction(simple(&opcode::POP), OperandTypes::None)
            .unwrap();
        assert!(matches!(
            builder.place_label(join),
            Err(Error::IncompatibleFrames(..))
        ));
    }
}
