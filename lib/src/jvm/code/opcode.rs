//! Static descriptions of the [JVM instructions][0] the generator emits
//!
//! Every opcode is described exactly once, as a `static`, and instructions refer to their opcode
//! by reference. The [`StackEffect`] of an opcode is what the verifier uses to simulate the
//! instruction.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html#jvms-6.5

use std::fmt;

/// Which family of values an instruction operates on
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueKind {
    /// `int` and `boolean` values
    Int,
    Float,
    Reference,
}

/// How an instruction transforms the operand stack (and locals)
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum StackEffect {
    Nop,

    PushInt,
    PushFloat,
    PushNull,

    /// `ldc` and `ldc_w`: the pushed type depends on the constant
    PushConstant,

    LoadLocal(ValueKind),
    StoreLocal(ValueKind),

    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Swap,

    IntBinary,
    FloatBinary,
    IntUnary,
    FloatUnary,
    IntToFloat,
    FloatToInt,
    FloatCompare,

    /// `iinc`: the stack is untouched, but the local must hold an `int`
    IncrementLocal,

    /// Load an array element of the given kind
    ArrayLoad(ValueKind),

    /// Store an array element of the given kind
    ArrayStore(ValueKind),
    ArrayLength,

    NewObject,
    NewPrimitiveArray,
    NewReferenceArray,
    NewMultiArray,

    GetStatic,
    PutStatic,
    GetField,
    PutField,

    /// `invokevirtual` and `invokeinterface`
    Invoke,
    InvokeSpecial,
    InvokeStatic,

    CheckCast,
    InstanceOf,

    /// Branch after popping one `int`
    IfZero,

    /// Branch after popping two values of the same kind
    IfCompare,

    /// Branch after popping one reference
    IfNull,
    Goto,

    Return,
    ReturnValue(ValueKind),
}

impl StackEffect {
    /// Does the instruction carry a 16-bit branch offset?
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            StackEffect::IfZero | StackEffect::IfCompare | StackEffect::IfNull | StackEffect::Goto
        )
    }

    /// Is control never able to fall through to the next instruction?
    pub fn is_unconditional(&self) -> bool {
        matches!(
            self,
            StackEffect::Goto | StackEffect::Return | StackEffect::ReturnValue(_)
        )
    }
}

/// Immutable description of one opcode
pub struct Opcode {
    /// Numeric code of the instruction
    pub code: u8,

    /// Name used when printing bytecode
    pub mnemonic: &'static str,

    /// Number of bytes following the opcode (outside of a `wide` prefix)
    pub operand_bytes: u8,

    pub effect: StackEffect,
}

impl Opcode {
    /// Size of the instruction in bytes (outside of a `wide` prefix)
    pub fn size(&self) -> usize {
        1 + self.operand_bytes as usize
    }

    /// Local slot encoded into the opcode itself (eg. `iload_2`)
    pub fn implicit_local(&self) -> Option<u16> {
        let base = match self.code {
            0x1a..=0x1d => 0x1a,
            0x22..=0x25 => 0x22,
            0x2a..=0x2d => 0x2a,
            0x3b..=0x3e => 0x3b,
            0x43..=0x46 => 0x43,
            0x4b..=0x4e => 0x4b,
            _ => return None,
        };
        Some((self.code - base) as u16)
    }

    /// Does the opcode take a local slot operand which can be widened with the `wide` prefix?
    pub fn has_local_operand(&self) -> bool {
        self.implicit_local().is_none()
            && matches!(
                self.effect,
                StackEffect::LoadLocal(_) | StackEffect::StoreLocal(_) | StackEffect::IncrementLocal
            )
    }

    /// Look up an opcode from its numeric code
    pub fn from_code(code: u8) -> Option<&'static Opcode> {
        ALL.iter().copied().find(|opcode| opcode.code == code)
    }
}

impl PartialEq for Opcode {
    fn eq(&self, other: &Opcode) -> bool {
        self.code == other.code
    }
}

impl Eq for Opcode {}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic)
    }
}

/// Prefix which widens the local slot operand of the next instruction to two bytes
pub const WIDE: u8 = 0xc4;

macro_rules! opcodes {
    ($($name:ident = $code:literal, $mnemonic:literal, $operand_bytes:literal, $effect:expr;)*) => {
        $(
            pub static $name: Opcode = Opcode {
                code: $code,
                mnemonic: $mnemonic,
                operand_bytes: $operand_bytes,
                effect: $effect,
            };
        )*

        /// Every opcode, ordered by numeric code
        pub static ALL: &[&Opcode] = &[$(&$name),*];
    };
}

use StackEffect::*;
use ValueKind::*;

opcodes! {
    NOP = 0x00, "nop", 0, Nop;
    ACONST_NULL = 0x01, "aconst_null", 0, PushNull;
    ICONST_M1 = 0x02, "iconst_m1", 0, PushInt;
    ICONST_0 = 0x03, "iconst_0", 0, PushInt;
    ICONST_1 = 0x04, "iconst_1", 0, PushInt;
    ICONST_2 = 0x05, "iconst_2", 0, PushInt;
    ICONST_3 = 0x06, "iconst_3", 0, PushInt;
    ICONST_4 = 0x07, "iconst_4", 0, PushInt;
    ICONST_5 = 0x08, "iconst_5", 0, PushInt;
    FCONST_0 = 0x0b, "fconst_0", 0, PushFloat;
    FCONST_1 = 0x0c, "fconst_1", 0, PushFloat;
    FCONST_2 = 0x0d, "fconst_2", 0, PushFloat;
    BIPUSH = 0x10, "bipush", 1, PushInt;
    SIPUSH = 0x11, "sipush", 2, PushInt;
    LDC = 0x12, "ldc", 1, PushConstant;
    LDC_W = 0x13, "ldc_w", 2, PushConstant;

    ILOAD = 0x15, "iload", 1, LoadLocal(Int);
    FLOAD = 0x17, "fload", 1, LoadLocal(Float);
    ALOAD = 0x19, "aload", 1, LoadLocal(Reference);
    ILOAD_0 = 0x1a, "iload_0", 0, LoadLocal(Int);
    ILOAD_1 = 0x1b, "iload_1", 0, LoadLocal(Int);
    ILOAD_2 = 0x1c, "iload_2", 0, LoadLocal(Int);
    ILOAD_3 = 0x1d, "iload_3", 0, LoadLocal(Int);
    FLOAD_0 = 0x22, "fload_0", 0, LoadLocal(Float);
    FLOAD_1 = 0x23, "fload_1", 0, LoadLocal(Float);
    FLOAD_2 = 0x24, "fload_2", 0, LoadLocal(Float);
    FLOAD_3 = 0x25, "fload_3", 0, LoadLocal(Float);
    ALOAD_0 = 0x2a, "aload_0", 0, LoadLocal(Reference);
    ALOAD_1 = 0x2b, "aload_1", 0, LoadLocal(Reference);
    ALOAD_2 = 0x2c, "aload_2", 0, LoadLocal(Reference);
    ALOAD_3 = 0x2d, "aload_3", 0, LoadLocal(Reference);
    IALOAD = 0x2e, "iaload", 0, ArrayLoad(Int);
    FALOAD = 0x30, "faload", 0, ArrayLoad(Float);
    AALOAD = 0x32, "aaload", 0, ArrayLoad(Reference);
    BALOAD = 0x33, "baload", 0, ArrayLoad(Int);

    ISTORE = 0x36, "istore", 1, StoreLocal(Int);
    FSTORE = 0x38, "fstore", 1, StoreLocal(Float);
    ASTORE = 0x3a, "astore", 1, StoreLocal(Reference);
    ISTORE_0 = 0x3b, "istore_0", 0, StoreLocal(Int);
    ISTORE_1 = 0x3c, "istore_1", 0, StoreLocal(Int);
    ISTORE_2 = 0x3d, "istore_2", 0, StoreLocal(Int);
    ISTORE_3 = 0x3e, "istore_3", 0, StoreLocal(Int);
    FSTORE_0 = 0x43, "fstore_0", 0, StoreLocal(Float);
    FSTORE_1 = 0x44, "fstore_1", 0, StoreLocal(Float);
    FSTORE_2 = 0x45, "fstore_2", 0, StoreLocal(Float);
    FSTORE_3 = 0x46, "fstore_3", 0, StoreLocal(Float);
    ASTORE_0 = 0x4b, "astore_0", 0, StoreLocal(Reference);
    ASTORE_1 = 0x4c, "astore_1", 0, StoreLocal(Reference);
    ASTORE_2 = 0x4d, "astore_2", 0, StoreLocal(Reference);
    ASTORE_3 = 0x4e, "astore_3", 0, StoreLocal(Reference);
    IASTORE = 0x4f, "iastore", 0, ArrayStore(Int);
    FASTORE = 0x51, "fastore", 0, ArrayStore(Float);
    AASTORE = 0x53, "aastore", 0, ArrayStore(Reference);
    BASTORE = 0x54, "bastore", 0, ArrayStore(Int);

    POP = 0x57, "pop", 0, Pop;
    POP2 = 0x58, "pop2", 0, Pop2;
    DUP = 0x59, "dup", 0, Dup;
    DUP_X1 = 0x5a, "dup_x1", 0, DupX1;
    DUP_X2 = 0x5b, "dup_x2", 0, DupX2;
    DUP2 = 0x5c, "dup2", 0, Dup2;
    SWAP = 0x5f, "swap", 0, Swap;

    IADD = 0x60, "iadd", 0, IntBinary;
    FADD = 0x62, "fadd", 0, FloatBinary;
    ISUB = 0x64, "isub", 0, IntBinary;
    FSUB = 0x66, "fsub", 0, FloatBinary;
    IMUL = 0x68, "imul", 0, IntBinary;
    FMUL = 0x6a, "fmul", 0, FloatBinary;
    IDIV = 0x6c, "idiv", 0, IntBinary;
    FDIV = 0x6e, "fdiv", 0, FloatBinary;
    IREM = 0x70, "irem", 0, IntBinary;
    FREM = 0x72, "frem", 0, FloatBinary;
    INEG = 0x74, "ineg", 0, IntUnary;
    FNEG = 0x76, "fneg", 0, FloatUnary;
    ISHL = 0x78, "ishl", 0, IntBinary;
    ISHR = 0x7a, "ishr", 0, IntBinary;
    IUSHR = 0x7c, "iushr", 0, IntBinary;
    IAND = 0x7e, "iand", 0, IntBinary;
    IOR = 0x80, "ior", 0, IntBinary;
    IXOR = 0x82, "ixor", 0, IntBinary;
    IINC = 0x84, "iinc", 2, IncrementLocal;
    I2F = 0x86, "i2f", 0, IntToFloat;
    F2I = 0x8b, "f2i", 0, FloatToInt;
    FCMPL = 0x95, "fcmpl", 0, FloatCompare;
    FCMPG = 0x96, "fcmpg", 0, FloatCompare;

    IFEQ = 0x99, "ifeq", 2, IfZero;
    IFNE = 0x9a, "ifne", 2, IfZero;
    IFLT = 0x9b, "iflt", 2, IfZero;
    IFGE = 0x9c, "ifge", 2, IfZero;
    IFGT = 0x9d, "ifgt", 2, IfZero;
    IFLE = 0x9e, "ifle", 2, IfZero;
    IF_ICMPEQ = 0x9f, "if_icmpeq", 2, IfCompare;
    IF_ICMPNE = 0xa0, "if_icmpne", 2, IfCompare;
    IF_ICMPLT = 0xa1, "if_icmplt", 2, IfCompare;
    IF_ICMPGE = 0xa2, "if_icmpge", 2, IfCompare;
    IF_ICMPGT = 0xa3, "if_icmpgt", 2, IfCompare;
    IF_ICMPLE = 0xa4, "if_icmple", 2, IfCompare;
    IF_ACMPEQ = 0xa5, "if_acmpeq", 2, IfCompare;
    IF_ACMPNE = 0xa6, "if_acmpne", 2, IfCompare;
    GOTO = 0xa7, "goto", 2, Goto;

    IRETURN = 0xac, "ireturn", 0, ReturnValue(Int);
    FRETURN = 0xae, "freturn", 0, ReturnValue(Float);
    ARETURN = 0xb0, "areturn", 0, ReturnValue(Reference);
    RETURN = 0xb1, "return", 0, Return;

    GETSTATIC = 0xb2, "getstatic", 2, GetStatic;
    PUTSTATIC = 0xb3, "putstatic", 2, PutStatic;
    GETFIELD = 0xb4, "getfield", 2, GetField;
    PUTFIELD = 0xb5, "putfield", 2, PutField;
    INVOKEVIRTUAL = 0xb6, "invokevirtual", 2, Invoke;
    INVOKESPECIAL = 0xb7, "invokespecial", 2, InvokeSpecial;
    INVOKESTATIC = 0xb8, "invokestatic", 2, InvokeStatic;
    INVOKEINTERFACE = 0xb9, "invokeinterface", 4, Invoke;

    NEW = 0xbb, "new", 2, NewObject;
    NEWARRAY = 0xbc, "newarray", 1, NewPrimitiveArray;
    ANEWARRAY = 0xbd, "anewarray", 2, NewReferenceArray;
    ARRAYLENGTH = 0xbe, "arraylength", 0, ArrayLength;
    CHECKCAST = 0xc0, "checkcast", 2, CheckCast;
    INSTANCEOF = 0xc1, "instanceof", 2, InstanceOf;
    MULTIANEWARRAY = 0xc5, "multianewarray", 3, NewMultiArray;
    IFNULL = 0xc6, "ifnull", 2, IfNull;
    IFNONNULL = 0xc7, "ifnonnull", 2, IfNull;
}

/// Negated form of a conditional branch (eg. `ifeq` for `ifne`)
pub fn negate_branch(opcode: &'static Opcode) -> Option<&'static Opcode> {
    let negated = match opcode.code {
        0x99..=0xa6 => {
            // Conditional branches come in pairs: `ifeq`/`ifne`, `iflt`/`ifge`, ...
            if (opcode.code - 0x99) % 2 == 0 {
                opcode.code + 1
            } else {
                opcode.code - 1
            }
        }
        0xc6 => 0xc7,
        0xc7 => 0xc6,
        _ => return None,
    };
    Opcode::from_code(negated)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_is_sorted_and_unique() {
        for pair in ALL.windows(2) {
            assert!(pair[0].code < pair[1].code, "{:?} {:?}", pair[0], pair[1]);
        }
        assert!(Opcode::from_code(WIDE).is_none());
    }

    #[test]
    fn lookup_by_code() {
        assert_eq!(Opcode::from_code(0xb1), Some(&RETURN));
        assert_eq!(Opcode::from_code(0x84).map(|op| op.mnemonic), Some("iinc"));
        assert_eq!(Opcode::from_code(0xff), None);
    }

    #[test]
    fn implicit_locals() {
        assert_eq!(ILOAD_0.implicit_local(), Some(0));
        assert_eq!(ALOAD_3.implicit_local(), Some(3));
        assert_eq!(FSTORE_2.implicit_local(), Some(2));
        assert_eq!(ILOAD.implicit_local(), None);
        assert!(ILOAD.has_local_operand());
        assert!(IINC.has_local_operand());
        assert!(!ISTORE_1.has_local_operand());
        assert!(!BIPUSH.has_local_operand());
    }

    #[test]
    fn negated_branches() {
        assert_eq!(negate_branch(&IFEQ), Some(&IFNE));
        assert_eq!(negate_branch(&IFGT), Some(&IFLE));
        assert_eq!(negate_branch(&IF_ICMPLT), Some(&IF_ICMPGE));
        assert_eq!(negate_branch(&IF_ACMPNE), Some(&IF_ACMPEQ));
        assert_eq!(negate_branch(&IFNONNULL), Some(&IFNULL));
        assert_eq!(negate_branch(&GOTO), None);
    }
}
