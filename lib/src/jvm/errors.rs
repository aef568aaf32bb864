use super::class_file::ConstantPoolOverflow;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    ConstantPoolOverflow(ConstantPoolOverflow),

    /// A method or field descriptor could not be parsed
    BadDescriptor(String),

    /// Two frames in the same stack map resolve to the same bytecode offset
    DuplicateFrameOffset(u16),

    /// A frame in a stack map table is malformed (or can't be represented)
    ///
    /// `frame_index` is the position of the frame in the table.
    InvalidStackMapFrame {
        frame_index: usize,
        kind: StackMapErrorKind,
    },
}

impl From<ConstantPoolOverflow> for Error {
    fn from(err: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapErrorKind {
    /// Frame type tag in the reserved `128-245` range
    UnusedFrameType(u8),

    /// A larval prefix was followed by another larval prefix instead of a base frame
    NestedLarvalFrame,

    /// Chop frame removes more locals than the previous frame had
    ChopPastStart { chopped: u8, locals: usize },

    /// Frame has pending unset fields, but `this` is not uninitialized in its locals
    UnsetFieldsWithoutUninitializedThis,

    /// Unknown `verification_type_info` tag
    InvalidVerificationTypeTag(u8),

    /// Constant pool index that is missing or refers to the wrong kind of constant
    InvalidConstantIndex(u16),

    /// Bytecode offset that can't be mapped to (or from) a label
    InvalidOffset(u32),

    /// Label that the label resolver can't place in the code
    UnboundLabel,

    /// Offset delta would be negative (frames are not strictly increasing)
    NegativeOffsetDelta(i64),

    /// Locals, stack, or unset fields don't fit in a `u16` count
    TooManyEntries(usize),

    /// Bytes remaining after the last frame
    TrailingBytes(usize),

    /// Input ended in the middle of a frame
    UnexpectedEnd,
}

/// Reading from an in-memory buffer only ever fails by running out of input
impl From<std::io::Error> for StackMapErrorKind {
    fn from(_: std::io::Error) -> StackMapErrorKind {
        StackMapErrorKind::UnexpectedEnd
    }
}
