use super::{BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};

/// Resolved reference to a field
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    /// Class declaring the field
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    pub is_static: bool,
}

/// Resolved reference to a method or constructor
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    /// Class (or interface) declaring the method
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub is_static: bool,
    pub is_private: bool,
    pub is_interface: bool,
}

impl MethodRef {
    /// Constructor of `class` with the given parameters
    pub fn constructor(class: BinaryName, parameters: Vec<FieldType>) -> MethodRef {
        MethodRef {
            class,
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor {
                parameters,
                return_type: None,
            },
            is_static: false,
            is_private: false,
            is_interface: false,
        }
    }

    /// Ordinary instance method of a class
    pub fn virtual_method(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
    ) -> MethodRef {
        MethodRef {
            class,
            name,
            descriptor,
            is_static: false,
            is_private: false,
            is_interface: false,
        }
    }

    /// Static method of a class
    pub fn static_method(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
    ) -> MethodRef {
        MethodRef {
            is_static: true,
            ..MethodRef::virtual_method(class, name, descriptor)
        }
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }

    /// Which `invoke*` instruction calls this method
    ///
    /// `via_super` is for calls of the form `super.foo()`, which must not be dispatched
    /// virtually.
    pub fn invoke_type(&self, via_super: bool) -> InvokeType {
        if self.is_static {
            InvokeType::Static
        } else if via_super || self.is_private || self.is_constructor() {
            InvokeType::Special
        } else if self.is_interface {
            InvokeType::Interface
        } else {
            InvokeType::Virtual
        }
    }

    /// Type of the receiver object
    pub fn owner_type(&self) -> RefType {
        RefType::Object(self.class.clone())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}
