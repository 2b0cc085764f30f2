use super::*;
use crate::jvm::code::{array_type_from_code, Instruction, InstructionId, StackEffect, ValueKind};
use crate::jvm::{ClassConstantIndex, ConstantPoolOverflow, ConstantsPool, FieldType, RefType};
use crate::jvm::VerifierErrorKind;

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Besides just being able to produce stack map entries, tracking frames let's us check that the
/// bytecode being generated is consistent with the types the syntax tree claims it has.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Frame<Cls, U> {
    /// Local variables, indexed by slot
    pub locals: Vec<VerificationType<Cls, U>>,

    /// Types of values on the stack (the last element is the top of the stack)
    pub stack: Vec<VerificationType<Cls, U>>,
}

impl<Cls, U> Default for Frame<Cls, U> {
    fn default() -> Self {
        Frame {
            locals: vec![],
            stack: vec![],
        }
    }
}

/// Stack map frame stored during code generation
pub type VerifierFrame = Frame<RefType, InstructionId>;

/// Stack map frame ready to be encoded into a `StackMapTable`
pub type SerializableFrame = Frame<ClassConstantIndex, u16>;

/// Types of operands that can't be read off the instruction itself
///
/// These come from the syntax tree: the simulator never looks up fields, methods, or constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandTypes {
    None,

    /// Type of the value produced by the instruction (eg. the type of the field read by
    /// `getfield`, the class pushed by `checkcast`, or the declared type of the local written by
    /// a store)
    Value(VerifierType),

    /// Method call: how many arguments get popped and what gets pushed afterwards
    Call {
        arguments: usize,
        returns: Option<VerifierType>,
    },

    /// Constructor call: the uninitialized receiver becomes `class` once this returns
    Constructor { arguments: usize, class: RefType },
}

impl VerifierFrame {
    /// Frame on entry to a method
    pub fn entry(
        this_class: &RefType,
        is_static: bool,
        is_constructor: bool,
        parameters: &[FieldType],
    ) -> VerifierFrame {
        let mut locals = vec![];
        if is_constructor {
            locals.push(VerificationType::UninitializedThis);
        } else if !is_static {
            locals.push(VerificationType::Object(this_class.clone()));
        }
        locals.extend(parameters.iter().cloned().map(VerificationType::from));
        VerifierFrame {
            locals,
            stack: vec![],
        }
    }

    /// Update the frame to reflect the effects of the given instruction
    ///
    /// For branches, this only pops the operands of the comparison.
    pub fn verify_instruction(
        &mut self,
        instruction_id: InstructionId,
        instruction: &Instruction,
        operand_types: &OperandTypes,
    ) -> Result<(), VerifierErrorKind> {
        verify_instruction(self, instruction_id, instruction, operand_types)
    }

    /// Generalize a type at the top of the stack
    ///
    /// This is needed where two edges join with different (but compatible) reference types on
    /// the stack, eg. `cond ? null : "string"`.
    pub fn generalize_top_stack_type(
        &mut self,
        general_type: VerifierType,
    ) -> Result<(), VerifierErrorKind> {
        let specific_type = pop(&mut self.stack)?;
        if specific_type.is_reference() != general_type.is_reference() {
            return Err(VerifierErrorKind::InvalidType);
        }
        if !specific_type.is_reference() && specific_type != general_type {
            return Err(VerifierErrorKind::InvalidType);
        }
        self.stack.push(general_type);
        Ok(())
    }

    /// Drop all local variables from `first_slot` onwards (eg. when they go out of scope)
    pub fn kill_locals(&mut self, first_slot: usize) {
        self.locals.truncate(first_slot);
        self.trim_locals();
    }

    /// Remove trailing `Top` locals, which carry no information
    pub fn trim_locals(&mut self) {
        while let Some(VerificationType::Top) = self.locals.last() {
            self.locals.pop();
        }
    }

    /// Merge in a frame arriving from another edge
    ///
    /// Locals whose types disagree become `Top`. Stacks must match exactly, otherwise `false` is
    /// returned and the frame is left untouched.
    pub fn merge(&mut self, other: &VerifierFrame) -> bool {
        if self.stack != other.stack {
            return false;
        }
        if self.locals.len() < other.locals.len() {
            self.locals.resize(other.locals.len(), VerificationType::Top);
        }
        for (slot, local) in self.locals.iter_mut().enumerate() {
            if other.locals.get(slot) != Some(&*local) {
                *local = VerificationType::Top;
            }
        }
        self.trim_locals();
        true
    }

    /// Can control arriving with frame `incoming` continue with this frame?
    ///
    /// Every local this frame relies on must hold the same type in `incoming`.
    pub fn accepts(&self, incoming: &VerifierFrame) -> bool {
        self.stack == incoming.stack
            && self.locals.iter().enumerate().all(|(slot, local)| {
                *local == VerificationType::Top || incoming.locals.get(slot) == Some(local)
            })
    }

    /// Resolve the frame into its serializable form
    pub fn into_serializable(
        &self,
        constants: &mut ConstantsPool,
        offset_of: impl Fn(InstructionId) -> u16 + Copy,
    ) -> Result<SerializableFrame, ConstantPoolOverflow> {
        Ok(Frame {
            locals: self
                .locals
                .iter()
                .map(|t| t.into_serializable(constants, offset_of))
                .collect::<Result<_, _>>()?,
            stack: self
                .stack
                .iter()
                .map(|t| t.into_serializable(constants, offset_of))
                .collect::<Result<_, _>>()?,
        })
    }
}

fn verify_instruction(
    frame: &mut VerifierFrame,
    instruction_id: InstructionId,
    instruction: &Instruction,
    operand_types: &OperandTypes,
) -> Result<(), VerifierErrorKind> {
    use StackEffect::*;
    use VerificationType::{Float, Integer, Null, Uninitialized, UninitializedThis};

    let Frame { stack, locals } = frame;

    match instruction.opcode.effect {
        Nop | Goto | Return => (),

        PushInt => stack.push(Integer),
        PushFloat => stack.push(Float),
        PushNull => stack.push(Null),
        PushConstant => stack.push(produced_type(operand_types)?),

        LoadLocal(kind) => {
            let slot = local_slot(instruction)?;
            let local_type = match locals.get(slot as usize) {
                None | Some(VerificationType::Top) => {
                    return Err(VerifierErrorKind::InvalidIndex(slot))
                }
                Some(local_type) => local_type.clone(),
            };
            expect_kind(&local_type, kind)?;
            stack.push(local_type);
        }
        StoreLocal(kind) => {
            let slot = local_slot(instruction)? as usize;
            let value = pop_kind(stack, kind)?;

            // Locals hold their declared type, so that frames from different edges agree
            let stored = match operand_types {
                OperandTypes::Value(declared) => {
                    expect_kind(declared, kind)?;
                    declared.clone()
                }
                _ => value,
            };
            if locals.len() <= slot {
                locals.resize(slot + 1, VerificationType::Top);
            }
            locals[slot] = stored;
        }
        IncrementLocal => {
            let slot = local_slot(instruction)?;
            if locals.get(slot as usize) != Some(&Integer) {
                return Err(VerifierErrorKind::InvalidIndex(slot));
            }
        }

        Pop => {
            pop(stack)?;
        }
        Pop2 => {
            pop(stack)?;
            pop(stack)?;
        }
        Dup => {
            let value = pop(stack)?;
            stack.push(value.clone());
            stack.push(value);
        }
        DupX1 => {
            let value1 = pop(stack)?;
            let value2 = pop(stack)?;
            stack.push(value1.clone());
            stack.push(value2);
            stack.push(value1);
        }
        DupX2 => {
            let value1 = pop(stack)?;
            let value2 = pop(stack)?;
            let value3 = pop(stack)?;
            stack.push(value1.clone());
            stack.push(value3);
            stack.push(value2);
            stack.push(value1);
        }
        Dup2 => {
            let value1 = pop(stack)?;
            let value2 = pop(stack)?;
            stack.push(value2.clone());
            stack.push(value1.clone());
            stack.push(value2);
            stack.push(value1);
        }
        Swap => {
            let value1 = pop(stack)?;
            let value2 = pop(stack)?;
            stack.push(value1);
            stack.push(value2);
        }

        IntBinary => {
            pop_kind(stack, ValueKind::Int)?;
            pop_kind(stack, ValueKind::Int)?;
            stack.push(Integer);
        }
        FloatBinary => {
            pop_kind(stack, ValueKind::Float)?;
            pop_kind(stack, ValueKind::Float)?;
            stack.push(Float);
        }
        IntUnary => {
            pop_kind(stack, ValueKind::Int)?;
            stack.push(Integer);
        }
        FloatUnary => {
            pop_kind(stack, ValueKind::Float)?;
            stack.push(Float);
        }
        IntToFloat => {
            pop_kind(stack, ValueKind::Int)?;
            stack.push(Float);
        }
        FloatToInt => {
            pop_kind(stack, ValueKind::Float)?;
            stack.push(Integer);
        }
        FloatCompare => {
            pop_kind(stack, ValueKind::Float)?;
            pop_kind(stack, ValueKind::Float)?;
            stack.push(Integer);
        }

        ArrayLoad(kind) => {
            pop_kind(stack, ValueKind::Int)?;
            let array = pop_kind(stack, ValueKind::Reference)?;
            let element = match (kind, array) {
                (ValueKind::Int, _) => Integer,
                (ValueKind::Float, _) => Float,
                (ValueKind::Reference, Null) => Null,
                (ValueKind::Reference, VerificationType::Object(array_type)) => {
                    match array_type.component_type() {
                        Some(element_type @ FieldType::Ref(_)) => {
                            VerificationType::from(element_type)
                        }
                        _ => return Err(VerifierErrorKind::InvalidType),
                    }
                }
                (ValueKind::Reference, _) => return Err(VerifierErrorKind::InvalidType),
            };
            stack.push(element);
        }
        ArrayStore(kind) => {
            pop_kind(stack, kind)?;
            pop_kind(stack, ValueKind::Int)?;
            pop_kind(stack, ValueKind::Reference)?;
        }
        ArrayLength => {
            pop_kind(stack, ValueKind::Reference)?;
            stack.push(Integer);
        }

        NewObject => stack.push(Uninitialized(instruction_id)),
        NewPrimitiveArray => {
            pop_kind(stack, ValueKind::Int)?;
            let element_type = instruction
                .operands
                .first()
                .and_then(|code| array_type_from_code(*code))
                .ok_or(VerifierErrorKind::InvalidType)?;
            let array_type = RefType::array(FieldType::Base(element_type));
            stack.push(VerificationType::Object(array_type));
        }
        NewReferenceArray => {
            pop_kind(stack, ValueKind::Int)?;
            stack.push(produced_type(operand_types)?);
        }
        NewMultiArray => {
            let dimensions = instruction
                .operands
                .get(2)
                .copied()
                .ok_or(VerifierErrorKind::InvalidType)?;
            for _ in 0..dimensions {
                pop_kind(stack, ValueKind::Int)?;
            }
            stack.push(produced_type(operand_types)?);
        }

        GetStatic => stack.push(produced_type(operand_types)?),
        PutStatic => {
            pop(stack)?;
        }
        GetField => {
            pop_kind(stack, ValueKind::Reference)?;
            stack.push(produced_type(operand_types)?);
        }
        PutField => {
            pop(stack)?;
            pop_kind(stack, ValueKind::Reference)?;
        }

        Invoke => {
            let returns = pop_call(stack, operand_types)?;
            pop_kind(stack, ValueKind::Reference)?;
            stack.extend(returns);
        }
        InvokeStatic => {
            let returns = pop_call(stack, operand_types)?;
            stack.extend(returns);
        }
        InvokeSpecial => match operand_types {
            OperandTypes::Constructor { arguments, class } => {
                for _ in 0..*arguments {
                    pop(stack)?;
                }
                let receiver = pop(stack)?;
                if !matches!(receiver, UninitializedThis | Uninitialized(_)) {
                    return Err(VerifierErrorKind::NotUninitialized);
                }

                // Every copy of the receiver is now initialized
                let initialized = VerificationType::Object(class.clone());
                for value in stack.iter_mut().chain(locals.iter_mut()) {
                    if *value == receiver {
                        *value = initialized.clone();
                    }
                }
            }
            _ => {
                let returns = pop_call(stack, operand_types)?;
                pop_kind(stack, ValueKind::Reference)?;
                stack.extend(returns);
            }
        },

        CheckCast => {
            pop_kind(stack, ValueKind::Reference)?;
            stack.push(produced_type(operand_types)?);
        }
        InstanceOf => {
            pop_kind(stack, ValueKind::Reference)?;
            stack.push(Integer);
        }

        IfZero => {
            pop_kind(stack, ValueKind::Int)?;
        }
        IfCompare => {
            let value1 = pop(stack)?;
            let value2 = pop(stack)?;
            if value1.is_reference() != value2.is_reference()
                || (!value1.is_reference() && (value1 != Integer || value2 != Integer))
            {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        IfNull => {
            pop_kind(stack, ValueKind::Reference)?;
        }

        ReturnValue(kind) => {
            pop_kind(stack, kind)?;
        }
    }

    Ok(())
}

fn pop<A>(stack: &mut Vec<A>) -> Result<A, VerifierErrorKind> {
    stack.pop().ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_kind(
    stack: &mut Vec<VerifierType>,
    kind: ValueKind,
) -> Result<VerifierType, VerifierErrorKind> {
    let value = pop(stack)?;
    expect_kind(&value, kind)?;
    Ok(value)
}

fn expect_kind(value: &VerifierType, kind: ValueKind) -> Result<(), VerifierErrorKind> {
    let matches = match kind {
        ValueKind::Int => *value == VerificationType::Integer,
        ValueKind::Float => *value == VerificationType::Float,
        ValueKind::Reference => value.is_reference(),
    };
    if matches {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

fn local_slot(instruction: &Instruction) -> Result<u16, VerifierErrorKind> {
    instruction
        .local
        .or_else(|| instruction.opcode.implicit_local())
        .ok_or(VerifierErrorKind::MissingLocal)
}

fn produced_type(operand_types: &OperandTypes) -> Result<VerifierType, VerifierErrorKind> {
    match operand_types {
        OperandTypes::Value(value) => Ok(value.clone()),
        _ => Err(VerifierErrorKind::MissingOperandTypes),
    }
}

/// Pop the arguments of a call, returning what the call will push
fn pop_call(
    stack: &mut Vec<VerifierType>,
    operand_types: &OperandTypes,
) -> Result<Option<VerifierType>, VerifierErrorKind> {
    match operand_types {
        OperandTypes::Call { arguments, returns } => {
            for _ in 0..*arguments {
                pop(stack)?;
            }
            Ok(returns.clone())
        }
        _ => Err(VerifierErrorKind::MissingOperandTypes),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{opcode, Label};
    use crate::jvm::BinaryName;
    use crate::jvm::names::Name;

    fn point() -> RefType {
        RefType::Object(BinaryName::from_string("demo/Point".to_string()).unwrap())
    }

    fn run(
        frame: &mut VerifierFrame,
        instruction: Instruction,
        operand_types: OperandTypes,
    ) -> Result<(), VerifierErrorKind> {
        frame.verify_instruction(InstructionId(0), &instruction, &operand_types)
    }

    #[test]
    fn entry_frames() {
        let params = [FieldType::int(), FieldType::string()];
        let constructor = VerifierFrame::entry(&point(), false, true, &params);
        assert_eq!(
            constructor.locals,
            vec![
                VerificationType::UninitializedThis,
                VerificationType::Integer,
                VerificationType::from(FieldType::string())
            ]
        );
        let static_method = VerifierFrame::entry(&point(), true, false, &[]);
        assert!(static_method.locals.is_empty());
    }

    #[test]
    fn locals_and_arithmetic() {
        let mut frame = VerifierFrame::entry(&point(), true, false, &[FieldType::int()]);
        run(&mut frame, Instruction::load(ValueKind::Int, 0), OperandTypes::None).unwrap();
        run(&mut frame, Instruction::push_int(3).unwrap(), OperandTypes::None).unwrap();
        run(&mut frame, Instruction::make(&opcode::IMUL, &[]), OperandTypes::None).unwrap();
        run(&mut frame, Instruction::store(ValueKind::Int, 2), OperandTypes::None).unwrap();
        assert_eq!(
            frame.locals,
            vec![
                VerificationType::Integer,
                VerificationType::Top,
                VerificationType::Integer
            ]
        );
        assert!(frame.stack.is_empty());

        assert_eq!(
            run(&mut frame, Instruction::load(ValueKind::Int, 1), OperandTypes::None),
            Err(VerifierErrorKind::InvalidIndex(1))
        );
        assert_eq!(
            run(&mut frame, Instruction::make(&opcode::POP, &[]), OperandTypes::None),
            Err(VerifierErrorKind::EmptyStack)
        );
    }

    #[test]
    fn stores_record_the_declared_type() {
        let mut frame = VerifierFrame::default();
        let string = VerifierType::from(FieldType::string());
        run(&mut frame, Instruction::make(&opcode::ACONST_NULL, &[]), OperandTypes::None).unwrap();
        run(
            &mut frame,
            Instruction::store(ValueKind::Reference, 0),
            OperandTypes::Value(string.clone()),
        )
        .unwrap();
        assert_eq!(frame.locals, vec![string]);
    }

    #[test]
    fn duplication_copies_types() {
        let mut frame = VerifierFrame {
            locals: vec![],
            stack: vec![
                VerificationType::Object(point()),
                VerificationType::Integer,
                VerificationType::Float,
            ],
        };
        run(&mut frame, Instruction::make(&opcode::DUP_X2, &[]), OperandTypes::None).unwrap();
        assert_eq!(
            frame.stack,
            vec![
                VerificationType::Float,
                VerificationType::Object(point()),
                VerificationType::Integer,
                VerificationType::Float,
            ]
        );
        run(&mut frame, Instruction::make(&opcode::DUP2, &[]), OperandTypes::None).unwrap();
        assert_eq!(frame.stack.len(), 6);
        assert_eq!(frame.stack[4], VerificationType::Integer);
        assert_eq!(frame.stack[5], VerificationType::Float);
    }

    #[test]
    fn constructors_initialize_every_copy() {
        let mut frame = VerifierFrame::default();
        let new = InstructionId(4);
        frame
            .verify_instruction(
                new,
                &Instruction::with_constant(&opcode::NEW, crate::jvm::ConstantIndex(1)),
                &OperandTypes::None,
            )
            .unwrap();
        run(&mut frame, Instruction::make(&opcode::DUP, &[]), OperandTypes::None).unwrap();
        assert_eq!(
            frame.stack,
            vec![VerificationType::Uninitialized(new), VerificationType::Uninitialized(new)]
        );
        run(&mut frame, Instruction::push_int(1).unwrap(), OperandTypes::None).unwrap();
        run(
            &mut frame,
            Instruction::with_constant(&opcode::INVOKESPECIAL, crate::jvm::ConstantIndex(2)),
            OperandTypes::Constructor {
                arguments: 1,
                class: point(),
            },
        )
        .unwrap();
        assert_eq!(frame.stack, vec![VerificationType::Object(point())]);
    }

    #[test]
    fn arrays() {
        let mut frame = VerifierFrame::default();
        run(&mut frame, Instruction::push_int(2).unwrap(), OperandTypes::None).unwrap();
        run(
            &mut frame,
            Instruction::new_primitive_array(crate::jvm::BaseType::Float),
            OperandTypes::None,
        )
        .unwrap();
        assert_eq!(
            frame.stack,
            vec![VerificationType::Object(RefType::array(FieldType::float()))]
        );
        run(&mut frame, Instruction::push_int(0).unwrap(), OperandTypes::None).unwrap();
        run(&mut frame, Instruction::make(&opcode::FALOAD, &[]), OperandTypes::None).unwrap();
        assert_eq!(frame.stack, vec![VerificationType::Float]);

        let mut frame = VerifierFrame {
            locals: vec![],
            stack: vec![VerificationType::Object(RefType::array(FieldType::array(
                FieldType::int(),
            )))],
        };
        run(&mut frame, Instruction::push_int(0).unwrap(), OperandTypes::None).unwrap();
        run(&mut frame, Instruction::make(&opcode::AALOAD, &[]), OperandTypes::None).unwrap();
        assert_eq!(
            frame.stack,
            vec![VerificationType::Object(RefType::array(FieldType::int()))]
        );
    }

    #[test]
    fn merging_frames() {
        let string = VerifierType::from(FieldType::string());
        let mut frame = VerifierFrame {
            locals: vec![VerificationType::Integer, string.clone(), VerificationType::Float],
            stack: vec![],
        };
        let other = VerifierFrame {
            locals: vec![VerificationType::Integer, VerificationType::Float],
            stack: vec![],
        };
        assert!(frame.merge(&other));
        assert_eq!(frame.locals, vec![VerificationType::Integer]);

        let with_stack = VerifierFrame {
            locals: vec![VerificationType::Integer],
            stack: vec![VerificationType::Integer],
        };
        assert!(!frame.merge(&with_stack));
        assert_eq!(frame.locals, vec![VerificationType::Integer]);
    }

    #[test]
    fn accepting_frames() {
        let head = VerifierFrame {
            locals: vec![VerificationType::Integer, VerificationType::Top, VerificationType::Float],
            stack: vec![],
        };
        let back_edge = VerifierFrame {
            locals: vec![
                VerificationType::Integer,
                VerificationType::Integer,
                VerificationType::Float,
                VerificationType::Integer,
            ],
            stack: vec![],
        };
        assert!(head.accepts(&back_edge));
        assert!(!back_edge.accepts(&head));
    }

    #[test]
    fn branches_pop_their_operands() {
        let mut frame = VerifierFrame {
            locals: vec![],
            stack: vec![VerificationType::Null, VerificationType::Object(point())],
        };
        let branch = Instruction::branch(&opcode::IF_ACMPEQ, Label(0), VerifierFrame::default());
        run(&mut frame, branch, OperandTypes::None).unwrap();
        assert!(frame.stack.is_empty());

        let mut frame = VerifierFrame {
            locals: vec![],
            stack: vec![VerificationType::Float],
        };
        let branch = Instruction::branch(&opcode::IFEQ, Label(0), VerifierFrame::default());
        assert_eq!(
            run(&mut frame, branch, OperandTypes::None),
            Err(VerifierErrorKind::InvalidType)
        );
    }

    #[test]
    fn generalizing_the_top_of_the_stack() {
        let mut frame = VerifierFrame {
            locals: vec![],
            stack: vec![VerificationType::Null],
        };
        let string = VerifierType::from(FieldType::string());
        frame.generalize_top_stack_type(string.clone()).unwrap();
        assert_eq!(frame.stack, vec![string]);
        assert_eq!(
            frame.generalize_top_stack_type(VerificationType::Integer),
            Err(VerifierErrorKind::InvalidType)
        );
    }
}
