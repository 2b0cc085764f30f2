use super::opcode::{Opcode, WIDE};
use crate::jvm::Error;
use std::fmt;

/// Instruction read back out of a code array
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Offset of the first byte of the instruction (the `wide` prefix, if there is one)
    pub offset: usize,
    pub opcode: &'static Opcode,
    pub operands: Vec<u8>,
    pub wide: bool,
}

impl DecodedInstruction {
    /// Size of the instruction, including the `wide` prefix
    pub fn size(&self) -> usize {
        1 + usize::from(self.wide) + self.operands.len()
    }

    /// Absolute destination offset of a branch
    pub fn branch_destination(&self) -> Option<usize> {
        if !self.opcode.effect.is_branch() {
            return None;
        }
        let delta = i16::from_be_bytes([*self.operands.first()?, *self.operands.get(1)?]);
        usize::try_from(self.offset as isize + delta as isize).ok()
    }

    /// Operand as an unsigned 16-bit value (eg. a constant pool index)
    pub fn u16_operand(&self) -> Option<u16> {
        Some(u16::from_be_bytes([*self.operands.first()?, *self.operands.get(1)?]))
    }
}

impl fmt::Debug for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5}: ", self.offset)?;
        if self.wide {
            f.write_str("wide ")?;
        }
        f.write_str(self.opcode.mnemonic)?;
        if let Some(destination) = self.branch_destination() {
            return write!(f, " {}", destination);
        }
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

/// Split a code array back into instructions
///
/// Only opcodes the generator knows about can be decoded.
pub fn decode_instructions(code: &[u8]) -> Result<Vec<DecodedInstruction>, Error> {
    let mut instructions = vec![];
    let mut offset = 0;

    while offset < code.len() {
        let wide = code[offset] == WIDE;
        let opcode_offset = offset + usize::from(wide);
        let opcode = code
            .get(opcode_offset)
            .and_then(|code| Opcode::from_code(*code))
            .ok_or_else(|| {
                Error::MalformedClassFile(format!("Unknown opcode at offset {}", opcode_offset))
            })?;

        let operand_bytes = if wide {
            if !opcode.has_local_operand() {
                let msg = format!("{:?} cannot be widened (offset {})", opcode, offset);
                return Err(Error::MalformedClassFile(msg));
            }
            2 * opcode.operand_bytes as usize
        } else {
            opcode.operand_bytes as usize
        };

        let operands_start = opcode_offset + 1;
        let operands = code
            .get(operands_start..operands_start + operand_bytes)
            .ok_or_else(|| {
                Error::MalformedClassFile(format!("Truncated {:?} at offset {}", opcode, offset))
            })?
            .to_vec();

        let instruction = DecodedInstruction {
            offset,
            opcode,
            operands,
            wide,
        };
        offset += instruction.size();
        instructions.push(instruction);
    }

    Ok(instructions)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcode;

    #[test]
    fn decode_simple_code() {
        let code = [0x1a, 0x9e, 0x00, 0x09, 0xc4, 0x84, 0x01, 0x00, 0xff, 0xff, 0xa7, 0xff, 0xf6, 0xb1];
        let decoded = decode_instructions(&code).unwrap();
        let summary: Vec<(usize, &str, bool)> = decoded
            .iter()
            .map(|i| (i.offset, i.opcode.mnemonic, i.wide))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "iload_0", false),
                (1, "ifle", false),
                (4, "iinc", true),
                (10, "goto", false),
                (13, "return", false),
            ]
        );
        assert_eq!(decoded[1].branch_destination(), Some(10));
        assert_eq!(decoded[3].branch_destination(), Some(0));
        assert_eq!(decoded[2].operands, vec![0x01, 0x00, 0xff, 0xff]);
        assert_eq!(decoded[0].opcode, &opcode::ILOAD_0);
    }

    #[test]
    fn reject_bad_code() {
        assert!(decode_instructions(&[0xba]).is_err());
        assert!(decode_instructions(&[0x10]).is_err());
        assert!(decode_instructions(&[WIDE, 0x60]).is_err());
    }
}
