use crate::jvm::class_file::{
    Attribute, AttributeLike, ClassConstantIndex, Code, Constant, ConstantIndex, Field, Method,
    Utf8ConstantIndex, Version,
};
use crate::jvm::verifier::{SerializableFrame, VerificationType};
use crate::jvm::{
    BaseType, ClassAccessFlags, Deserialize, Error, FieldType, MethodAccessFlags, MethodDescriptor,
    Name, ParseDescriptor, Serialize, UnqualifiedName,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub version: Version,

    /// Constants, in order (the first one has index 1)
    pub constants: Vec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut class_file = fs::File::create(path)?;
        self.serialize(&mut class_file)
    }

    /// Parse a class file from its bytes
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut cursor = bytes;
        let class = ClassFile::deserialize(&mut cursor).map_err(|err| match err.kind() {
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
                Error::MalformedClassFile(err.to_string())
            }
            _ => Error::IoError(err),
        })?;
        if !cursor.is_empty() {
            let msg = format!("{} trailing bytes after class", cursor.len());
            return Err(Error::MalformedClassFile(msg));
        }
        Ok(class)
    }

    /// Serialize the class file into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Look up a constant by index (accounting for `long` and `double` taking two slots)
    pub fn constant(&self, index: ConstantIndex) -> Option<&Constant> {
        let mut current = 1;
        for constant in &self.constants {
            if current == index.0 as usize {
                return Some(constant);
            } else if current > index.0 as usize {
                return None;
            }
            current += constant.width();
        }
        None
    }

    /// Look up a UTF-8 constant
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Option<&str> {
        match self.constant(index.0) {
            Some(Constant::Utf8(string)) => Some(string),
            _ => None,
        }
    }

    /// Look up the name of a class constant
    pub fn class_name(&self, index: ClassConstantIndex) -> Option<&str> {
        match self.constant(index.0) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => None,
        }
    }

    /// Find and decode the first attribute of a given type in a list of attributes
    pub fn find_attribute<A: AttributeLike>(
        &self,
        attributes: &[Attribute],
    ) -> Result<Option<A>, Error> {
        for attribute in attributes {
            if self.utf8(attribute.name_index) == Some(A::NAME) {
                let decoded = A::from_info(&attribute.info)
                    .map_err(|err| Error::MalformedClassFile(err.to_string()))?;
                return Ok(Some(decoded));
            }
        }
        Ok(None)
    }

    /// Find a method by name and descriptor
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods.iter().find(|method| {
            self.utf8(method.name_index) == Some(name)
                && self.utf8(method.descriptor_index) == Some(descriptor)
        })
    }

    /// Decode the `Code` attribute of a method
    pub fn method_code(&self, method: &Method) -> Result<Option<Code>, Error> {
        self.find_attribute::<Code>(&method.attributes)
    }

    /// Find the class constant for a class name (eg. `java/lang/String` or `[I`)
    pub fn find_class(&self, name: &str) -> Option<ClassConstantIndex> {
        let mut current = 1;
        for constant in &self.constants {
            if let Constant::Class(class_name) = constant {
                if self.utf8(*class_name) == Some(name) {
                    return Some(ClassConstantIndex(ConstantIndex(current)));
                }
            }
            current += constant.width() as u16;
        }
        None
    }

    /// Implicit frame on entry to a method, which its stack map table is relative to
    ///
    /// Parameters of a reference type which has no class constant come out as `top`.
    pub fn entry_frame(&self, method: &Method) -> Result<SerializableFrame, Error> {
        let descriptor = self
            .utf8(method.descriptor_index)
            .ok_or_else(|| Error::MalformedClassFile("Missing method descriptor".to_string()))?;
        let descriptor = MethodDescriptor::parse(descriptor)
            .map_err(|err| Error::MalformedClassFile(err.to_string()))?;

        let mut locals = vec![];
        if self.utf8(method.name_index) == Some(UnqualifiedName::INIT.as_str()) {
            locals.push(VerificationType::UninitializedThis);
        } else if !method.access_flags.contains(MethodAccessFlags::STATIC) {
            locals.push(VerificationType::Object(self.this_class));
        }
        for parameter in &descriptor.parameters {
            locals.push(match parameter {
                FieldType::Base(BaseType::Float) => VerificationType::Float,
                FieldType::Base(_) => VerificationType::Integer,
                FieldType::Ref(ref_type) => self
                    .find_class(&ref_type.class_name())
                    .map_or(VerificationType::Top, VerificationType::Object),
            });
        }

        Ok(SerializableFrame {
            locals,
            stack: vec![],
        })
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;

        let constant_pool_count: usize = 1 + self.constants.iter().map(Constant::width).sum::<usize>();
        (constant_pool_count as u16).serialize(writer)?;
        for constant in &self.constants {
            constant.serialize(writer)?;
        }

        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            let msg = format!("Bad magic number {:02X?}", magic);
            return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
        }
        let version = Version::deserialize(reader)?;

        let constant_pool_count = u16::deserialize(reader)? as usize;
        let mut constants = vec![];
        let mut next_index = 1;
        while next_index < constant_pool_count {
            let constant = Constant::deserialize(reader)?;
            next_index += constant.width();
            constants.push(constant);
        }

        Ok(ClassFile {
            version,
            constants,
            access_flags: ClassAccessFlags::deserialize(reader)?,
            this_class: ClassConstantIndex::deserialize(reader)?,
            super_class: ClassConstantIndex::deserialize(reader)?,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}
