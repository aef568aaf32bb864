use super::{RegisterClass, VMStorage};

/// Registers and stack conventions of a platform's C calling convention
///
/// Register lists are in allocation order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ABIDescriptor {
    pub integer_inputs: &'static [VMStorage],
    pub float_inputs: &'static [VMStorage],
    pub integer_outputs: &'static [VMStorage],
    pub float_outputs: &'static [VMStorage],

    /// Registers not preserved across a call
    pub volatile_integers: &'static [VMStorage],
    pub volatile_floats: &'static [VMStorage],

    /// Alignment of the stack pointer at a call, in bytes
    pub stack_alignment: u32,

    /// Reserved area at the bottom of the outgoing argument area, in bytes
    pub header_size: u32,

    /// Temporaries available to call stubs
    pub scratch1: VMStorage,
    pub scratch2: VMStorage,
}

impl ABIDescriptor {
    /// Argument registers of a class
    pub fn inputs(&self, class: RegisterClass) -> &'static [VMStorage] {
        match class {
            RegisterClass::Integer => self.integer_inputs,
            RegisterClass::Float => self.float_inputs,
        }
    }

    /// Return value registers of a class
    pub fn outputs(&self, class: RegisterClass) -> &'static [VMStorage] {
        match class {
            RegisterClass::Integer => self.integer_outputs,
            RegisterClass::Float => self.float_outputs,
        }
    }

    pub fn volatiles(&self, class: RegisterClass) -> &'static [VMStorage] {
        match class {
            RegisterClass::Integer => self.volatile_integers,
            RegisterClass::Float => self.volatile_floats,
        }
    }

    /// Is the storage preserved by the callee?
    pub fn is_volatile(&self, storage: &VMStorage) -> bool {
        match storage.register_class() {
            Some(class) => self.volatiles(class).contains(storage),
            None => false,
        }
    }
}
