use crate::jvm::code::{opcode, CodeBuilder, Instruction, Opcode, ValueKind};
use crate::jvm::verifier::{OperandTypes, VerifierType};
use crate::jvm::{
    BaseType, ConstantData, ConstantsWriter, Error, FieldRef, FieldType, InvokeType, MethodRef,
    RefType,
};

/// Helpers for emitting common instruction sequences
pub trait CodeBuilderExts {
    /// Push an instruction that has no operands
    fn simple(&mut self, opcode: &'static Opcode) -> Result<(), Error>;

    /// Push an integer constant onto the stack
    fn const_int(&mut self, integer: i32) -> Result<(), Error>;

    /// Push a float constant onto the stack
    fn const_float(&mut self, float: f32) -> Result<(), Error>;

    /// Push a constant string to the stack
    fn const_string(&mut self, string: &str) -> Result<(), Error>;

    /// Get a local at a particular slot
    fn get_local(&mut self, slot: u16, field_type: &FieldType) -> Result<(), Error>;

    /// Set a local at a particular slot
    fn set_local(&mut self, slot: u16, field_type: &FieldType) -> Result<(), Error>;

    /// Return from the method
    fn return_(&mut self, field_type: Option<&FieldType>) -> Result<(), Error>;

    /// Read a static or instance field
    fn get_field(&mut self, field: &FieldRef) -> Result<(), Error>;

    /// Write a static or instance field
    fn put_field(&mut self, field: &FieldRef) -> Result<(), Error>;

    /// Call a method (but not a constructor)
    fn invoke(&mut self, method: &MethodRef, via_super: bool) -> Result<(), Error>;

    /// Call a constructor on an uninitialized object, which becomes `initialized`
    fn invoke_constructor(&mut self, method: &MethodRef, initialized: RefType)
        -> Result<(), Error>;

    /// Allocate an uninitialized object
    fn new_object(&mut self, class: &RefType) -> Result<(), Error>;

    /// Allocate an array, popping lengths for the first `dimensions` dimensions
    fn new_array(&mut self, array_type: &RefType, dimensions: usize) -> Result<(), Error>;

    /// Cast a reference to a more specific type
    fn checkcast(&mut self, ref_type: &RefType) -> Result<(), Error>;

    fn instanceof(&mut self, ref_type: &RefType) -> Result<(), Error>;

    /// Load an element from an array with the given element type
    fn array_load(&mut self, element_type: &FieldType) -> Result<(), Error>;

    /// Store an element into an array with the given element type
    fn array_store(&mut self, element_type: &FieldType) -> Result<(), Error>;
}

/// Family of instructions that operate on a value of this type
pub fn value_kind(field_type: &FieldType) -> ValueKind {
    match field_type {
        FieldType::Base(BaseType::Int | BaseType::Boolean) => ValueKind::Int,
        FieldType::Base(BaseType::Float) => ValueKind::Float,
        FieldType::Ref(_) => ValueKind::Reference,
    }
}

impl<'c> CodeBuilderExts for CodeBuilder<'c> {
    fn simple(&mut self, opcode: &'static Opcode) -> Result<(), Error> {
        self.push_instruction(Instruction::make(opcode, &[]), OperandTypes::None)
    }

    fn const_int(&mut self, integer: i32) -> Result<(), Error> {
        match Instruction::push_int(integer) {
            Some(instruction) => self.push_instruction(instruction, OperandTypes::None),
            None => {
                let index = ConstantData::Integer(integer).constant_index(self.constants)?;
                self.push_instruction(
                    Instruction::load_constant(index),
                    OperandTypes::Value(VerifierType::Integer),
                )
            }
        }
    }

    fn const_float(&mut self, float: f32) -> Result<(), Error> {
        match Instruction::push_float(float) {
            Some(instruction) => self.push_instruction(instruction, OperandTypes::None),
            None => {
                let index = ConstantData::Float(float).constant_index(self.constants)?;
                self.push_instruction(
                    Instruction::load_constant(index),
                    OperandTypes::Value(VerifierType::Float),
                )
            }
        }
    }

    fn const_string(&mut self, string: &str) -> Result<(), Error> {
        let index = ConstantData::String(string.to_string()).constant_index(self.constants)?;
        self.push_instruction(
            Instruction::load_constant(index),
            OperandTypes::Value(VerifierType::from(FieldType::string())),
        )
    }

    fn get_local(&mut self, slot: u16, field_type: &FieldType) -> Result<(), Error> {
        let instruction = Instruction::load(value_kind(field_type), slot);
        self.push_instruction(instruction, OperandTypes::None)
    }

    fn set_local(&mut self, slot: u16, field_type: &FieldType) -> Result<(), Error> {
        let instruction = Instruction::store(value_kind(field_type), slot);
        let declared = VerifierType::from(field_type.clone());
        self.push_instruction(instruction, OperandTypes::Value(declared))
    }

    fn return_(&mut self, field_type: Option<&FieldType>) -> Result<(), Error> {
        let opcode = match field_type.map(value_kind) {
            None => &opcode::RETURN,
            Some(ValueKind::Int) => &opcode::IRETURN,
            Some(ValueKind::Float) => &opcode::FRETURN,
            Some(ValueKind::Reference) => &opcode::ARETURN,
        };
        self.simple(opcode)
    }

    fn get_field(&mut self, field: &FieldRef) -> Result<(), Error> {
        let opcode = if field.is_static {
            &opcode::GETSTATIC
        } else {
            &opcode::GETFIELD
        };
        let index = field.constant_index(self.constants)?;
        let field_type = VerifierType::from(field.descriptor.clone());
        self.push_instruction(
            Instruction::with_constant(opcode, index),
            OperandTypes::Value(field_type),
        )
    }

    fn put_field(&mut self, field: &FieldRef) -> Result<(), Error> {
        let opcode = if field.is_static {
            &opcode::PUTSTATIC
        } else {
            &opcode::PUTFIELD
        };
        let index = field.constant_index(self.constants)?;
        self.push_instruction(Instruction::with_constant(opcode, index), OperandTypes::None)
    }

    fn invoke(&mut self, method: &MethodRef, via_super: bool) -> Result<(), Error> {
        let index = method.constant_index(self.constants)?;
        let arguments = method.descriptor.parameters.len();
        let instruction = match method.invoke_type(via_super) {
            InvokeType::Virtual => Instruction::with_constant(&opcode::INVOKEVIRTUAL, index),
            InvokeType::Special => Instruction::with_constant(&opcode::INVOKESPECIAL, index),
            InvokeType::Static => Instruction::with_constant(&opcode::INVOKESTATIC, index),
            InvokeType::Interface => {
                let argument_slots = method.descriptor.parameter_length(true) as u8;
                Instruction::invoke_interface(index, argument_slots)
            }
        };
        let returns = method.descriptor.return_type.clone().map(VerifierType::from);
        self.push_instruction(instruction, OperandTypes::Call { arguments, returns })
    }

    fn invoke_constructor(
        &mut self,
        method: &MethodRef,
        initialized: RefType,
    ) -> Result<(), Error> {
        let index = method.constant_index(self.constants)?;
        self.push_instruction(
            Instruction::with_constant(&opcode::INVOKESPECIAL, index),
            OperandTypes::Constructor {
                arguments: method.descriptor.parameters.len(),
                class: initialized,
            },
        )
    }

    fn new_object(&mut self, class: &RefType) -> Result<(), Error> {
        let index = class.constant_index(self.constants)?;
        self.push_instruction(Instruction::with_constant(&opcode::NEW, index), OperandTypes::None)
    }

    fn new_array(&mut self, array_type: &RefType, dimensions: usize) -> Result<(), Error> {
        let produced = OperandTypes::Value(VerifierType::Object(array_type.clone()));
        match (dimensions, array_type.component_type()) {
            (1, Some(FieldType::Base(element_type))) => self.push_instruction(
                Instruction::new_primitive_array(element_type),
                OperandTypes::None,
            ),
            (1, Some(FieldType::Ref(element_type))) => {
                let index = element_type.constant_index(self.constants)?;
                self.push_instruction(
                    Instruction::with_constant(&opcode::ANEWARRAY, index),
                    produced,
                )
            }
            _ => {
                let index = array_type.constant_index(self.constants)?;
                let instruction = Instruction::new_multi_array(index, dimensions as u8);
                self.push_instruction(instruction, produced)
            }
        }
    }

    fn checkcast(&mut self, ref_type: &RefType) -> Result<(), Error> {
        let index = ref_type.constant_index(self.constants)?;
        self.push_instruction(
            Instruction::with_constant(&opcode::CHECKCAST, index),
            OperandTypes::Value(VerifierType::Object(ref_type.clone())),
        )
    }

    fn instanceof(&mut self, ref_type: &RefType) -> Result<(), Error> {
        let index = ref_type.constant_index(self.constants)?;
        self.push_instruction(
            Instruction::with_constant(&opcode::INSTANCEOF, index),
            OperandTypes::None,
        )
    }

    fn array_load(&mut self, element_type: &FieldType) -> Result<(), Error> {
        let opcode = match element_type {
            FieldType::Base(BaseType::Boolean) => &opcode::BALOAD,
            FieldType::Base(BaseType::Int) => &opcode::IALOAD,
            FieldType::Base(BaseType::Float) => &opcode::FALOAD,
            FieldType::Ref(_) => &opcode::AALOAD,
        };
        self.simple(opcode)
    }

    fn array_store(&mut self, element_type: &FieldType) -> Result<(), Error> {
        let opcode = match element_type {
            FieldType::Base(BaseType::Boolean) => &opcode::BASTORE,
            FieldType::Base(BaseType::Int) => &opcode::IASTORE,
            FieldType::Base(BaseType::Float) => &opcode::FASTORE,
            FieldType::Ref(_) => &opcode::AASTORE,
        };
        self.simple(opcode)
    }
}
