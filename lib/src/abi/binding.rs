use super::{Error, FunctionDescriptor, MemoryLayout, VMStorage, ValueKind};
use crate::jvm::RenderDescriptor;
use std::fmt;

/// Managed type of a value moved by a binding
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Carrier {
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Boolean,

    /// Address of native memory
    Address,

    /// Region of native memory (how aggregates are carried)
    Segment,
}

impl Carrier {
    pub fn for_value(kind: ValueKind) -> Carrier {
        match kind {
            ValueKind::Byte => Carrier::Byte,
            ValueKind::Short => Carrier::Short,
            ValueKind::Char => Carrier::Char,
            ValueKind::Int => Carrier::Int,
            ValueKind::Long => Carrier::Long,
            ValueKind::Float => Carrier::Float,
            ValueKind::Double => Carrier::Double,
            ValueKind::Boolean => Carrier::Boolean,
            ValueKind::Address => Carrier::Address,
        }
    }

    /// Carrier a managed signature must use for a layout
    pub fn for_layout(layout: &MemoryLayout) -> Result<Carrier, Error> {
        match layout {
            MemoryLayout::Value(value) => Ok(Carrier::for_value(value.kind)),
            MemoryLayout::Struct(_) | MemoryLayout::Union(_) => Ok(Carrier::Segment),
            MemoryLayout::Sequence(_) | MemoryLayout::Padding(_) => Err(Error::UnsupportedLayout(
                format!("{} can't be passed by value", layout.render()),
            )),
        }
    }

    /// Integral carrier wide enough for a chunk of an aggregate
    pub fn for_chunk_size(size: u64) -> Carrier {
        match size {
            1 => Carrier::Byte,
            2 => Carrier::Short,
            3 | 4 => Carrier::Int,
            _ => Carrier::Long,
        }
    }

    /// Bytes a value of this carrier occupies in native memory
    pub fn byte_width(self) -> u64 {
        match self {
            Carrier::Byte | Carrier::Boolean => 1,
            Carrier::Short | Carrier::Char => 2,
            Carrier::Int | Carrier::Float => 4,
            Carrier::Long | Carrier::Double | Carrier::Address | Carrier::Segment => 8,
        }
    }
}

/// One step of a binding program
///
/// Binding programs run on an operand stack of managed values. A downcall argument program starts
/// with the argument on the stack and ends with it empty, a downcall return program starts empty
/// and ends with the return value. Upcalls are the other way around.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Binding {
    /// Pop a value and write it to native storage
    VmStore { storage: VMStorage, carrier: Carrier },

    /// Read a value from native storage and push it
    VmLoad { storage: VMStorage, carrier: Carrier },

    /// Pop a value, pop a segment, and write `byte_width` bytes of the value into the segment
    BufferStore {
        offset: u64,
        carrier: Carrier,
        byte_width: u64,
    },

    /// Pop a segment and push the `byte_width` bytes read from it
    BufferLoad {
        offset: u64,
        carrier: Carrier,
        byte_width: u64,
    },

    /// Pop a segment and push a fresh copy of it
    Copy { size: u64, alignment: u64 },

    /// Push a fresh segment
    Allocate { size: u64, alignment: u64 },

    /// Pop an address and push it as a segment of the given size
    BoxAddress { size: u64, alignment: u64 },

    /// Pop a segment and push its address
    UnboxAddress,

    /// Duplicate the top of the stack
    Dup,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::VmStore { storage, carrier } => write!(f, "vm_store({}, {:?})", storage, carrier),
            Binding::VmLoad { storage, carrier } => write!(f, "vm_load({}, {:?})", storage, carrier),
            Binding::BufferStore {
                offset,
                carrier,
                byte_width,
            } => write!(f, "buffer_store({}, {:?}, {})", offset, carrier, byte_width),
            Binding::BufferLoad {
                offset,
                carrier,
                byte_width,
            } => write!(f, "buffer_load({}, {:?}, {})", offset, carrier, byte_width),
            Binding::Copy { size, alignment } => write!(f, "copy({}, {})", size, alignment),
            Binding::Allocate { size, alignment } => write!(f, "allocate({}, {})", size, alignment),
            Binding::BoxAddress { size, alignment } => {
                write!(f, "box_address({}, {})", size, alignment)
            }
            Binding::UnboxAddress => f.write_str("unbox_address"),
            Binding::Dup => f.write_str("dup"),
        }
    }
}

/// Managed side of a call signature
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodType {
    pub parameters: Vec<Carrier>,

    /// `None` for `void`
    pub return_type: Option<Carrier>,
}

impl MethodType {
    pub fn new(parameters: Vec<Carrier>, return_type: Option<Carrier>) -> MethodType {
        MethodType {
            parameters,
            return_type,
        }
    }

    /// Managed signature that carries each layout of a native signature
    pub fn from_descriptor(descriptor: &FunctionDescriptor) -> Result<MethodType, Error> {
        let parameters = descriptor
            .arguments
            .iter()
            .map(Carrier::for_layout)
            .collect::<Result<Vec<_>, _>>()?;
        let return_type = descriptor
            .return_layout
            .as_ref()
            .map(Carrier::for_layout)
            .transpose()?;
        Ok(MethodType {
            parameters,
            return_type,
        })
    }
}

/// Binding programs for every argument and for the return value of a call
///
/// When the return value is passed in memory, `method_type` and `descriptor` describe the
/// call as it actually happens: there is an extra leading address argument for the return buffer
/// and no return value.
#[derive(Clone, PartialEq, Debug)]
pub struct CallingSequence {
    pub for_upcall: bool,
    pub method_type: MethodType,
    pub descriptor: FunctionDescriptor,

    /// One program per argument, in argument order
    pub argument_bindings: Vec<Vec<Binding>>,
    pub return_bindings: Vec<Binding>,

    /// Layout of the value returned through the leading buffer argument
    pub return_in_memory: Option<MemoryLayout>,

    /// Index (among `argument_bindings`) of the first variadic argument
    pub first_variadic: Option<usize>,
}

impl CallingSequence {
    pub fn argument_count(&self) -> usize {
        self.argument_bindings.len()
    }

    pub fn argument_bindings(&self, index: usize) -> &[Binding] {
        &self.argument_bindings[index]
    }

    pub fn has_return_bindings(&self) -> bool {
        !self.return_bindings.is_empty()
    }

    /// Every storage read or written, in binding order
    pub fn storages(&self) -> impl Iterator<Item = VMStorage> + '_ {
        self.argument_bindings
            .iter()
            .flatten()
            .chain(self.return_bindings.iter())
            .filter_map(|binding| match binding {
                Binding::VmStore { storage, .. } | Binding::VmLoad { storage, .. } => {
                    Some(*storage)
                }
                _ => None,
            })
    }
}

/// Result of arranging a call
#[derive(Clone, PartialEq, Debug)]
pub struct Bindings {
    pub calling_sequence: CallingSequence,
    pub is_in_memory_return: bool,
}
