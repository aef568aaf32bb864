use super::Carrier;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Layout that is neither a scalar, a pointer, nor an aggregate the classifier recognizes
    UnsupportedLayout(String),

    /// Layout that can't be constructed (misaligned member, bad reshape, malformed text, ...)
    InvalidLayout(String),

    /// Number of carriers doesn't match the number of argument layouts
    ParameterCountMismatch { expected: usize, found: usize },

    /// Carrier at `index` can't carry the corresponding layout (`None` is the return)
    CarrierMismatch {
        index: Option<usize>,
        expected: Carrier,
        found: Carrier,
    },

    /// Return carrier and return layout disagree on whether there is a return value
    ReturnMismatch {
        expected: Option<Carrier>,
        found: Option<Carrier>,
    },

    /// First variadic index is past the end of the argument list
    InvalidVariadicIndex { index: usize, arity: usize },

    /// Running a binding program failed
    Execution(ExecutionErrorKind),
}

impl From<ExecutionErrorKind> for Error {
    fn from(kind: ExecutionErrorKind) -> Error {
        Error::Execution(kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionErrorKind {
    /// Binding needed a value, but the operand stack was empty
    StackUnderflow,

    /// Values left over on the operand stack after a binding program finished
    LeftoverValues(usize),

    /// Value on the stack doesn't have the carrier the binding expects
    TypeMismatch { expected: Carrier, found: String },

    /// Binding can't move values of this carrier through native storage
    UnsupportedCarrier(Carrier),

    /// Access outside of allocated native memory (or outside of a segment)
    OutOfBounds { address: u64, size: u64 },

    /// Native stack slot that was never written
    UninitializedStorage(String),

    /// Wrong number of values passed to a downcall or returned from an upcall target
    ArgumentCount { expected: usize, found: usize },

    /// Upcall target returned nothing, but the signature has a return value
    MissingReturnValue,
}
