use crate::jvm::class_file::{Attribute, AttributeLike};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::names::Name;
use crate::jvm::{
    BinaryName, Deserialize, Error, FieldRef, MethodRef, RefType, Serialize,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::result::Result;

/// Class file constants pool builder
///
/// The pool is append only: once a constant is inserted, its index never changes, and inserting
/// an equal constant again returns the existing index. One pool is shared by all of the methods
/// of a class, so it gets threaded explicitly through code generation.
#[derive(Debug, Default)]
pub struct ConstantsPool {
    constants: Vec<Constant>,

    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    fieldrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    methodrefs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    utf8s: HashMap<String, Utf8ConstantIndex>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool::default()
    }

    /// Number of constants in the pool
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: indexing starts at 1 and the pool count (which is one more than the largest index)
    /// must itself fit in a `u16`.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let offset = self.constants.len() + 1;
        if offset >= u16::MAX as usize {
            return Err(ConstantPoolOverflow {
                constant,
                offset: offset as u16,
            });
        }

        log::trace!("Constant #{} = {:?}", offset, constant);
        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Look up a constant by its index
    pub fn get(&self, index: ConstantIndex) -> Option<&Constant> {
        (index.0 as usize)
            .checked_sub(1)
            .and_then(|idx| self.constants.get(idx))
    }

    /// Consume the pool and return the final vector of constants (the first element has index 1)
    pub fn into_constants(self) -> Vec<Constant> {
        self.constants
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        let cow = utf8.into();

        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            Ok(*idx)
        } else {
            let owned = cow.into_owned();
            let constant = Constant::Utf8(owned.clone());
            let idx = Utf8ConstantIndex(self.push_constant(constant)?);
            self.utf8s.insert(owned, idx);
            Ok(idx)
        }
    }

    /// Get or insert a class constant from the constant pool
    pub fn get_class(
        &mut self,
        name: Utf8ConstantIndex,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.classes.get(&name) {
            Ok(*idx)
        } else {
            let idx = ClassConstantIndex(self.push_constant(Constant::Class(name))?);
            self.classes.insert(name, idx);
            Ok(idx)
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(
        &mut self,
        utf8: Utf8ConstantIndex,
    ) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            let constant = Constant::String(utf8);
            let idx = StringConstantIndex(self.push_constant(constant)?);
            self.strings.insert(utf8, idx);
            Ok(idx)
        }
    }

    /// Get or insert an integer constant from the constant pool
    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.integers.get(&integer) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Integer(integer))?;
            self.integers.insert(integer, idx);
            Ok(idx)
        }
    }

    /// Get or insert a float constant from the constant pool
    ///
    /// Floats are deduplicated by their bits, so `0.0` and `-0.0` (or different NaNs) are kept
    /// apart.
    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let bits = float.to_bits();
        if let Some(idx) = self.floats.get(&bits) {
            Ok(*idx)
        } else {
            let idx = self.push_constant(Constant::Float(float))?;
            self.floats.insert(bits, idx);
            Ok(idx)
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name_and_type_key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&name_and_type_key) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
            self.name_and_types.insert(name_and_type_key, idx);
            Ok(idx)
        }
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        attribute.serialize(&mut info).map_err(Error::IoError)?;

        Ok(Attribute { name_index, info })
    }
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: u16,
}

/// Constants as in the constant pool
///
/// Code generation only ever produces the first few kinds, but the reader accepts every kind a
/// Java 8 class file can contain.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long` (only ever read, takes two pool entries)
    Long(i64),

    /// Constant primitive of type `double` (only ever read, takes two pool entries)
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle` (only ever read)
    MethodHandle { kind: u8, member: ConstantIndex },

    /// Method type (only ever read)
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed call site (only ever read)
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },
}

impl Constant {
    /// Number of constant pool entries the constant occupies
    pub fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle { kind, member } => {
                15u8.serialize(writer)?;
                kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let constant = match u8::deserialize(reader)? {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = crate::jvm::read_bytes(reader, len as usize)?;
                let string = decode_modified_utf8(&bytes).ok_or_else(|| {
                    std::io::Error::new(ErrorKind::InvalidData, "Invalid modified UTF-8")
                })?;
                Constant::Utf8(string)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                kind: u8::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            other => {
                let msg = format!("Unknown constant pool tag {}", other);
                return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
            }
        };
        Ok(constant)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    let mut units = [0u16; 2];
    for c in string.chars() {
        for unit in c.encode_utf16(&mut units).iter() {
            let code = *unit as u32;
            if code != 0 && code < 0x80 {
                buffer.push(code as u8);
            } else if code < 0x800 {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            } else {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Returns `None` if the bytes are not valid modified UTF-8 (or encode unpaired surrogates).
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(b1) = iter.next() {
        let unit = if b1 & 0b1000_0000 == 0 {
            b1 as u16
        } else if b1 & 0b1110_0000 == 0b1100_0000 {
            let b2 = continuation(iter.next())?;
            ((b1 as u16 & 0x1F) << 6) | b2
        } else if b1 & 0b1111_0000 == 0b1110_0000 {
            let b2 = continuation(iter.next())?;
            let b3 = continuation(iter.next())?;
            ((b1 as u16 & 0x0F) << 12) | (b2 << 6) | b3
        } else {
            return None;
        };
        units.push(unit);
    }
    String::from_utf16(&units).ok()
}

fn continuation(byte: Option<u8>) -> Option<u16> {
    match byte {
        Some(b) if b & 0b1100_0000 == 0b1000_0000 => Some((b & 0x3F) as u16),
        _ => None,
    }
}


#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct StringConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct FieldRefConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct MethodRefConstantIndex(pub ConstantIndex);

macro_rules! typed_constant_index {
    ($($index:ident),*) => {
        $(
            impl From<$index> for ConstantIndex {
                fn from(index: $index) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $index {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $index {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                    Ok($index(ConstantIndex::deserialize(reader)?))
                }
            }
        )*
    };
}

typed_constant_index!(
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    ClassConstantIndex,
    FieldRefConstantIndex,
    MethodRefConstantIndex
);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

pub trait ConstantsWriter<Index = ConstantIndex> {
    /// Get or insert a constant into the constant pool and return the associated index
    fn constant_index(
        &self,
        constants_pool: &mut ConstantsPool,
    ) -> Result<Index, ConstantPoolOverflow>;
}

/// Write a `CONSTANT_Class_info` (array types use their descriptor as the name)
impl ConstantsWriter<ClassConstantIndex> for RefType {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name = constants.get_utf8(self.class_name())?;
        constants.get_class(name)
    }
}

/// Write a `CONSTANT_Class_info`
impl ConstantsWriter<ClassConstantIndex> for BinaryName {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name = constants.get_utf8(self.as_str())?;
        constants.get_class(name)
    }
}

/// Write a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
impl ConstantsWriter<MethodRefConstantIndex> for MethodRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let class_idx = self.class.constant_index(constants)?;
        let method_utf8 = constants.get_utf8(self.name.as_str())?;
        let desc_utf8 = constants.get_utf8(self.descriptor.render())?;
        let name_and_type_idx = constants.get_name_and_type(method_utf8, desc_utf8)?;

        let key = (class_idx, name_and_type_idx, self.is_interface);
        if let Some(idx) = constants.methodrefs.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodRef {
                class: class_idx,
                name_and_type: name_and_type_idx,
                is_interface: self.is_interface,
            };
            let idx = MethodRefConstantIndex(constants.push_constant(constant)?);
            constants.methodrefs.insert(key, idx);
            Ok(idx)
        }
    }
}

/// Write a `CONSTANT_Fieldref_info`
impl ConstantsWriter<FieldRefConstantIndex> for FieldRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let class_idx = self.class.constant_index(constants)?;
        let field_utf8 = constants.get_utf8(self.name.as_str())?;
        let desc_utf8 = constants.get_utf8(self.descriptor.render())?;
        let name_and_type_idx = constants.get_name_and_type(field_utf8, desc_utf8)?;

        let key = (class_idx, name_and_type_idx);
        if let Some(idx) = constants.fieldrefs.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::FieldRef(class_idx, name_and_type_idx);
            let idx = FieldRefConstantIndex(constants.push_constant(constant)?);
            constants.fieldrefs.insert(key, idx);
            Ok(idx)
        }
    }
}

/// Constants which can be loaded onto the stack with `ldc`
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantData {
    Integer(i32),
    Float(f32),
    String(String),
}

impl ConstantsWriter<ConstantIndex> for ConstantData {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        match self {
            ConstantData::Integer(integer) => constants.get_integer(*integer),
            ConstantData::Float(float) => constants.get_float(*float),
            ConstantData::String(string) => {
                let str_utf8 = constants.get_utf8(string.as_str())?;
                Ok(constants.get_string(str_utf8)?.into())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{FieldType, MethodDescriptor, UnqualifiedName};

    #[test]
    fn indices_start_at_one_and_are_deduplicated() {
        let mut pool = ConstantsPool::new();
        let first = pool.get_utf8("first").unwrap();
        let second = pool.get_utf8("second").unwrap();
        assert_eq!(first.0, ConstantIndex(1));
        assert_eq!(second.0, ConstantIndex(2));
        assert_eq!(pool.get_utf8("first").unwrap(), first);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(ConstantIndex(0)), None);
        assert_eq!(
            pool.get(ConstantIndex(2)),
            Some(&Constant::Utf8("second".to_string()))
        );
    }

    #[test]
    fn member_references_share_their_parts() {
        let mut pool = ConstantsPool::new();
        let class = BinaryName::from_string("demo/Counter".to_string()).unwrap();
        let field = FieldRef {
            class: class.clone(),
            name: UnqualifiedName::from_string("count".to_string()).unwrap(),
            descriptor: FieldType::int(),
            is_static: false,
        };
        let method = MethodRef::virtual_method(
            class.clone(),
            UnqualifiedName::from_string("bump".to_string()).unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        );

        let field_idx = field.constant_index(&mut pool).unwrap();
        let size_after_field = pool.len();
        assert_eq!(field.constant_index(&mut pool).unwrap(), field_idx);
        assert_eq!(pool.len(), size_after_field);

        let method_idx = method.constant_index(&mut pool).unwrap();
        assert_ne!(ConstantIndex::from(method_idx), ConstantIndex::from(field_idx));

        // class name, class, name, descriptor, name and type, field, name, descriptor, name and
        // type, method
        assert_eq!(pool.len(), 10);
    }

    #[test]
    fn float_constants_compare_bits() {
        let mut pool = ConstantsPool::new();
        let zero = pool.get_float(0.0).unwrap();
        let negative_zero = pool.get_float(-0.0).unwrap();
        assert_ne!(zero, negative_zero);
        assert_eq!(pool.get_float(0.0).unwrap(), zero);
    }

    #[test]
    fn array_classes_use_descriptors() {
        let mut pool = ConstantsPool::new();
        let array = RefType::array(FieldType::int());
        array.constant_index(&mut pool).unwrap();
        assert_eq!(
            pool.get(ConstantIndex(1)),
            Some(&Constant::Utf8("[I".to_string()))
        );
    }

    #[test]
    fn overflowing_the_pool() {
        let mut pool = ConstantsPool::new();
        for i in 0..(u16::MAX as i32 - 2) {
            pool.get_integer(i).unwrap();
        }
        assert_eq!(pool.len(), 65533);
        assert!(pool.get_integer(-1).is_ok());
        assert!(pool.get_integer(-2).is_err());
    }
}
