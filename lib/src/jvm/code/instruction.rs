use super::opcode::{self, Opcode, ValueKind, WIDE};
use super::Label;
use crate::jvm::verifier::VerifierFrame;
use crate::jvm::{BaseType, ConstantIndex};
use std::fmt;

/// One instruction in a method body
///
/// The size of an instruction is fixed once it is constructed: branches reserve their two offset
/// bytes up front and only get those bytes patched once all offsets are known.
#[derive(Clone)]
pub struct Instruction {
    pub opcode: &'static Opcode,

    /// Bytes following the opcode (these do not include the `wide` prefix)
    pub operands: Vec<u8>,

    /// Whether the instruction is prefixed by `wide`
    pub wide: bool,

    /// Offset of the instruction from the start of the method (unset until offsets are resolved)
    pub offset: Option<usize>,

    /// Constant pool entry referenced by the instruction
    pub constant: Option<ConstantIndex>,

    /// Local slot read or written by the instruction
    pub local: Option<u16>,

    /// Destination of a branching instruction
    pub jump: Option<Jump>,
}

/// Destination of a branch, along with the frame that holds when control gets there
#[derive(Clone, Debug)]
pub struct Jump {
    pub target: Label,
    pub frame: VerifierFrame,
}

impl Instruction {
    /// Make an instruction from an opcode and its operand bytes
    pub fn make(opcode: &'static Opcode, operands: &[u8]) -> Instruction {
        debug_assert_eq!(
            operands.len(),
            opcode.operand_bytes as usize,
            "Wrong operand count for {:?}",
            opcode
        );
        Instruction {
            opcode,
            operands: operands.to_vec(),
            wide: false,
            offset: None,
            constant: None,
            local: None,
            jump: None,
        }
    }

    /// Make an instruction whose operand is a two-byte constant pool index
    pub fn with_constant(opcode: &'static Opcode, index: impl Into<ConstantIndex>) -> Instruction {
        let index = index.into();
        let mut instruction = Instruction::make(opcode, &index.0.to_be_bytes());
        instruction.constant = Some(index);
        instruction
    }

    /// `invokeinterface`, which also encodes the number of argument slots
    pub fn invoke_interface(index: impl Into<ConstantIndex>, argument_slots: u8) -> Instruction {
        let index = index.into();
        let [hi, lo] = index.0.to_be_bytes();
        let mut instruction = Instruction::make(&opcode::INVOKEINTERFACE, &[hi, lo, argument_slots, 0]);
        instruction.constant = Some(index);
        instruction
    }

    /// `multianewarray`, which also encodes the number of dimensions to allocate
    pub fn new_multi_array(index: impl Into<ConstantIndex>, dimensions: u8) -> Instruction {
        let index = index.into();
        let [hi, lo] = index.0.to_be_bytes();
        let mut instruction = Instruction::make(&opcode::MULTIANEWARRAY, &[hi, lo, dimensions]);
        instruction.constant = Some(index);
        instruction
    }

    /// `newarray` for a primitive element type
    pub fn new_primitive_array(element_type: BaseType) -> Instruction {
        Instruction::make(&opcode::NEWARRAY, &[array_type_code(element_type)])
    }

    /// Load a constant from the pool, using `ldc` when the index fits in one byte
    pub fn load_constant(index: ConstantIndex) -> Instruction {
        let mut instruction = match u8::try_from(index.0) {
            Ok(short) => Instruction::make(&opcode::LDC, &[short]),
            Err(_) => Instruction::make(&opcode::LDC_W, &index.0.to_be_bytes()),
        };
        instruction.constant = Some(index);
        instruction
    }

    /// Push an integer without going through the constant pool, if possible
    pub fn push_int(value: i32) -> Option<Instruction> {
        let instruction = match value {
            -1 => Instruction::make(&opcode::ICONST_M1, &[]),
            0 => Instruction::make(&opcode::ICONST_0, &[]),
            1 => Instruction::make(&opcode::ICONST_1, &[]),
            2 => Instruction::make(&opcode::ICONST_2, &[]),
            3 => Instruction::make(&opcode::ICONST_3, &[]),
            4 => Instruction::make(&opcode::ICONST_4, &[]),
            5 => Instruction::make(&opcode::ICONST_5, &[]),
            _ => {
                if let Ok(byte) = i8::try_from(value) {
                    Instruction::make(&opcode::BIPUSH, &byte.to_be_bytes())
                } else if let Ok(short) = i16::try_from(value) {
                    Instruction::make(&opcode::SIPUSH, &short.to_be_bytes())
                } else {
                    return None;
                }
            }
        };
        Some(instruction)
    }

    /// Push a float without going through the constant pool, if possible
    ///
    /// Only positive `0.0`, `1.0`, and `2.0` have dedicated instructions.
    pub fn push_float(value: f32) -> Option<Instruction> {
        let opcode = match value.to_bits() {
            bits if bits == 0.0f32.to_bits() => &opcode::FCONST_0,
            bits if bits == 1.0f32.to_bits() => &opcode::FCONST_1,
            bits if bits == 2.0f32.to_bits() => &opcode::FCONST_2,
            _ => return None,
        };
        Some(Instruction::make(opcode, &[]))
    }

    /// Read a local variable slot
    pub fn load(kind: ValueKind, slot: u16) -> Instruction {
        let (short_forms, general) = match kind {
            ValueKind::Int => (LOAD_INT, &opcode::ILOAD),
            ValueKind::Float => (LOAD_FLOAT, &opcode::FLOAD),
            ValueKind::Reference => (LOAD_REFERENCE, &opcode::ALOAD),
        };
        Instruction::local_access(short_forms, general, slot)
    }

    /// Write a local variable slot
    pub fn store(kind: ValueKind, slot: u16) -> Instruction {
        let (short_forms, general) = match kind {
            ValueKind::Int => (STORE_INT, &opcode::ISTORE),
            ValueKind::Float => (STORE_FLOAT, &opcode::FSTORE),
            ValueKind::Reference => (STORE_REFERENCE, &opcode::ASTORE),
        };
        Instruction::local_access(short_forms, general, slot)
    }

    fn local_access(
        short_forms: [&'static Opcode; 4],
        general: &'static Opcode,
        slot: u16,
    ) -> Instruction {
        let mut instruction = if let Some(short_form) = short_forms.get(slot as usize).copied() {
            Instruction::make(short_form, &[])
        } else if let Ok(byte) = u8::try_from(slot) {
            Instruction::make(general, &[byte])
        } else {
            let mut wide = Instruction::make(general, &[0]);
            wide.operands = slot.to_be_bytes().to_vec();
            wide.wide = true;
            wide
        };
        instruction.local = Some(slot);
        instruction
    }

    /// Add a constant to an `int` local (`iinc`)
    pub fn increment(slot: u16, delta: i16) -> Instruction {
        let mut instruction = match (u8::try_from(slot), i8::try_from(delta)) {
            (Ok(slot), Ok(delta)) => Instruction::make(&opcode::IINC, &[slot, delta as u8]),
            _ => {
                let mut wide = Instruction::make(&opcode::IINC, &[0, 0]);
                let [slot_hi, slot_lo] = slot.to_be_bytes();
                let [delta_hi, delta_lo] = delta.to_be_bytes();
                wide.operands = vec![slot_hi, slot_lo, delta_hi, delta_lo];
                wide.wide = true;
                wide
            }
        };
        instruction.local = Some(slot);
        instruction
    }

    /// Branching instruction, whose offset bytes are filled in once the target offset is known
    pub fn branch(opcode: &'static Opcode, target: Label, frame: VerifierFrame) -> Instruction {
        debug_assert!(opcode.effect.is_branch(), "{:?} does not branch", opcode);
        let mut instruction = Instruction::make(opcode, &[0, 0]);
        instruction.jump = Some(Jump { target, frame });
        instruction
    }

    /// Total size in bytes, including the opcode and the `wide` prefix
    pub fn size(&self) -> usize {
        1 + usize::from(self.wide) + self.operands.len()
    }

    /// Append the encoded instruction
    pub fn encode(&self, code: &mut Vec<u8>) {
        if self.wide {
            code.push(WIDE);
        }
        code.push(self.opcode.code);
        code.extend_from_slice(&self.operands);
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wide {
            f.write_str("wide ")?;
        }
        f.write_str(self.opcode.mnemonic)?;
        if let Some(jump) = &self.jump {
            write!(f, " {:?}", jump.target)
        } else if let Some(local) = self.local {
            match self.opcode.implicit_local() {
                Some(_) => Ok(()),
                None => write!(f, " {}", local),
            }
        } else if let Some(constant) = self.constant {
            write!(f, " #{}", constant.0)
        } else {
            for operand in &self.operands {
                write!(f, " {}", operand)?;
            }
            Ok(())
        }
    }
}

/// Type codes used by `newarray`
pub fn array_type_code(element_type: BaseType) -> u8 {
    match element_type {
        BaseType::Boolean => 4,
        BaseType::Float => 6,
        BaseType::Int => 10,
    }
}

/// Inverse of [`array_type_code`]
pub fn array_type_from_code(code: u8) -> Option<BaseType> {
    match code {
        4 => Some(BaseType::Boolean),
        6 => Some(BaseType::Float),
        10 => Some(BaseType::Int),
        _ => None,
    }
}

static LOAD_INT: [&Opcode; 4] = [
    &opcode::ILOAD_0,
    &opcode::ILOAD_1,
    &opcode::ILOAD_2,
    &opcode::ILOAD_3,
];
static LOAD_FLOAT: [&Opcode; 4] = [
    &opcode::FLOAD_0,
    &opcode::FLOAD_1,
    &opcode::FLOAD_2,
    &opcode::FLOAD_3,
];
static LOAD_REFERENCE: [&Opcode; 4] = [
    &opcode::ALOAD_0,
    &opcode::ALOAD_1,
    &opcode::ALOAD_2,
    &opcode::ALOAD_3,
];
static STORE_INT: [&Opcode; 4] = [
    &opcode::ISTORE_0,
    &opcode::ISTORE_1,
    &opcode::ISTORE_2,
    &opcode::ISTORE_3,
];
static STORE_FLOAT: [&Opcode; 4] = [
    &opcode::FSTORE_0,
    &opcode::FSTORE_1,
    &opcode::FSTORE_2,
    &opcode::FSTORE_3,
];
static STORE_REFERENCE: [&Opcode; 4] = [
    &opcode::ASTORE_0,
    &opcode::ASTORE_1,
    &opcode::ASTORE_2,
    &opcode::ASTORE_3,
];

#[cfg(test)]
mod test {
    use super::*;

    fn bytes(instruction: &Instruction) -> Vec<u8> {
        let mut code = vec![];
        instruction.encode(&mut code);
        assert_eq!(code.len(), instruction.size());
        code
    }

    #[test]
    fn local_access_forms() {
        assert_eq!(bytes(&Instruction::load(ValueKind::Int, 0)), vec![0x1a]);
        assert_eq!(bytes(&Instruction::load(ValueKind::Reference, 3)), vec![0x2d]);
        assert_eq!(bytes(&Instruction::store(ValueKind::Float, 4)), vec![0x38, 4]);
        assert_eq!(bytes(&Instruction::store(ValueKind::Int, 255)), vec![0x36, 255]);
        assert_eq!(
            bytes(&Instruction::load(ValueKind::Int, 256)),
            vec![WIDE, 0x15, 1, 0]
        );
        assert_eq!(Instruction::load(ValueKind::Int, 256).local, Some(256));
    }

    #[test]
    fn integer_pushes() {
        let push = |value| Instruction::push_int(value).map(|i| bytes(&i));
        assert_eq!(push(-1), Some(vec![0x02]));
        assert_eq!(push(5), Some(vec![0x08]));
        assert_eq!(push(6), Some(vec![0x10, 6]));
        assert_eq!(push(-128), Some(vec![0x10, 0x80]));
        assert_eq!(push(1000), Some(vec![0x11, 0x03, 0xe8]));
        assert_eq!(push(40000), None);
    }

    #[test]
    fn float_pushes() {
        assert_eq!(Instruction::push_float(1.0).map(|i| i.opcode.code), Some(0x0c));
        assert!(Instruction::push_float(-0.0).is_none());
        assert!(Instruction::push_float(0.5).is_none());
    }

    #[test]
    fn constant_loads() {
        assert_eq!(bytes(&Instruction::load_constant(ConstantIndex(200))), vec![0x12, 200]);
        assert_eq!(
            bytes(&Instruction::load_constant(ConstantIndex(300))),
            vec![0x13, 1, 44]
        );
        let getfield = Instruction::with_constant(&opcode::GETFIELD, ConstantIndex(7));
        assert_eq!(bytes(&getfield), vec![0xb4, 0, 7]);
        assert_eq!(getfield.constant, Some(ConstantIndex(7)));
    }

    #[test]
    fn increments() {
        assert_eq!(bytes(&Instruction::increment(2, -1)), vec![0x84, 2, 0xff]);
        assert_eq!(
            bytes(&Instruction::increment(2, 1000)),
            vec![WIDE, 0x84, 0, 2, 0x03, 0xe8]
        );
        assert_eq!(
            bytes(&Instruction::increment(300, 1)),
            vec![WIDE, 0x84, 1, 44, 0, 1]
        );
    }

    #[test]
    fn branches_reserve_their_offset() {
        let goto = Instruction::branch(&opcode::GOTO, Label(0), VerifierFrame::default());
        assert_eq!(goto.size(), 3);
        assert_eq!(format!("{:?}", goto), "goto l0");
    }
}
