use crate::jvm::code::InstructionId;
use crate::jvm::{
    BaseType, ClassConstantIndex, ConstantPoolOverflow, ConstantsPool, ConstantsWriter,
    Deserialize, FieldType, RefType, Serialize,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Error, ErrorKind};

/// These types are from [this hierarchy][0]
///
/// Every type occupies exactly one slot (there are no `long` or `double` values to track).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unused or unusable slot
    Top,
    Integer,
    Float,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    ///   - while generating code, `U` is the handle of the `new` instruction
    ///   - when serializing into a classfile, `U` is the `u16` offset of that `new` instruction
    ///     from the start of the method body
    Uninitialized(U),
}

/// Verification type used while generating code
pub type VerifierType = VerificationType<RefType, InstructionId>;

impl<Cls, U> VerificationType<Cls, U> {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top | VerificationType::Integer | VerificationType::Float => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    pub fn map<C2, U2, E>(
        &self,
        map_class: impl Fn(&Cls) -> Result<C2, E>,
        map_uninitialized: impl Fn(&U) -> Result<U2, E>,
    ) -> Result<VerificationType<C2, U2>, E> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)?),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit)?)
            }
        })
    }
}

impl<U> From<FieldType> for VerificationType<RefType, U> {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int) | FieldType::Base(BaseType::Boolean) => {
                VerificationType::Integer
            }
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl<U> From<RefType> for VerificationType<RefType, U> {
    fn from(ref_type: RefType) -> Self {
        VerificationType::Object(ref_type)
    }
}

impl VerifierType {
    /// Resolve the type into its serializable form
    ///
    /// `offset_of` maps the handle of a `new` instruction to its final offset.
    pub fn into_serializable(
        &self,
        constants: &mut ConstantsPool,
        offset_of: impl Fn(InstructionId) -> u16,
    ) -> Result<VerificationType<ClassConstantIndex, u16>, ConstantPoolOverflow> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(ref_type) => {
                VerificationType::Object(ref_type.constant_index(constants)?)
            }
            VerificationType::Uninitialized(instruction) => {
                VerificationType::Uninitialized(offset_of(*instruction))
            }
        })
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for VerificationType<ClassConstantIndex, u16> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(match u8::deserialize(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ClassConstantIndex::deserialize(reader)?),
            8 => VerificationType::Uninitialized(u16::deserialize(reader)?),
            tag @ (3 | 4) => {
                let msg = format!("64-bit verification type (tag {}) is not supported", tag);
                return Err(Error::new(ErrorKind::InvalidData, msg));
            }
            tag => {
                let msg = format!("Unknown verification type tag {}", tag);
                return Err(Error::new(ErrorKind::InvalidData, msg));
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BinaryName, ConstantIndex};

    #[test]
    fn field_types_collapse_to_verifier_types() {
        assert_eq!(VerifierType::from(FieldType::boolean()), VerificationType::Integer);
        assert_eq!(VerifierType::from(FieldType::int()), VerificationType::Integer);
        assert_eq!(VerifierType::from(FieldType::float()), VerificationType::Float);
        assert_eq!(
            VerifierType::from(FieldType::string()),
            VerificationType::Object(RefType::Object(BinaryName::STRING))
        );
        assert!(VerifierType::from(FieldType::array(FieldType::int())).is_reference());
        assert!(!VerifierType::Top.is_reference());
    }

    #[test]
    fn serializable_objects_go_through_the_pool() {
        let mut constants = ConstantsPool::new();
        let string = VerifierType::from(FieldType::string());
        let uninit = VerifierType::Uninitialized(InstructionId(3));
        let offset_of = |id: InstructionId| id.0 as u16 * 2;

        let serializable = string.into_serializable(&mut constants, offset_of).unwrap();
        assert_eq!(
            serializable,
            VerificationType::Object(ClassConstantIndex(ConstantIndex(2)))
        );
        assert_eq!(
            uninit.into_serializable(&mut constants, offset_of).unwrap(),
            VerificationType::Uninitialized(6)
        );
    }

    #[test]
    fn long_and_double_tags_are_rejected() {
        let err = VerificationType::<ClassConstantIndex, u16>::deserialize(&mut &[4u8][..]);
        assert!(err.is_err());
        let top = VerificationType::<ClassConstantIndex, u16>::deserialize(&mut &[0u8][..]);
        assert_eq!(top.unwrap(), VerificationType::Top);
    }
}
