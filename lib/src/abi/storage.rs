use std::fmt;

/// Kind of register a value can be passed in
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RegisterClass {
    Integer,
    Float,
}

impl RegisterClass {
    pub const ALL: [RegisterClass; 2] = [RegisterClass::Integer, RegisterClass::Float];

    /// Position of the class in per-class tables
    pub fn index(self) -> usize {
        match self {
            RegisterClass::Integer => 0,
            RegisterClass::Float => 1,
        }
    }
}

/// Location a native argument or return value lives in
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum VMStorage {
    Register {
        class: RegisterClass,
        index: u16,
        name: &'static str,
    },

    /// Slot in the outgoing argument area, at an offset from the stack pointer at the call
    Stack { offset: u32, size: u16 },
}

impl VMStorage {
    pub const fn integer(index: u16, name: &'static str) -> VMStorage {
        VMStorage::Register {
            class: RegisterClass::Integer,
            index,
            name,
        }
    }

    pub const fn float(index: u16, name: &'static str) -> VMStorage {
        VMStorage::Register {
            class: RegisterClass::Float,
            index,
            name,
        }
    }

    pub const fn stack(offset: u32, size: u16) -> VMStorage {
        VMStorage::Stack { offset, size }
    }

    /// Register class, or `None` for stack slots
    pub fn register_class(&self) -> Option<RegisterClass> {
        match self {
            VMStorage::Register { class, .. } => Some(*class),
            VMStorage::Stack { .. } => None,
        }
    }

    pub fn is_stack(&self) -> bool {
        matches!(self, VMStorage::Stack { .. })
    }
}

impl fmt::Debug for VMStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VMStorage::Register { name, .. } => f.write_str(name),
            VMStorage::Stack { offset, size } => write!(f, "stack[{}:{}]", offset, size),
        }
    }
}

impl fmt::Display for VMStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
