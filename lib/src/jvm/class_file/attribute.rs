use crate::jvm::class_file::{
    ClassConstantIndex, ConstantsPool, Deserialize, NameAndTypeConstantIndex, Serialize,
    Utf8ConstantIndex,
};
use crate::jvm::verifier::VerificationType;
use crate::jvm::{Error, StackMapErrorKind};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;

    /// Serialize into a named attribute, interning the name in the constant pool
    fn into_attribute(self, constants: &mut ConstantsPool) -> Result<Attribute, Error> {
        let name_index = constants.get_utf8(Self::NAME)?;
        let mut info = vec![];
        self.serialize(&mut info)?;
        Ok(Attribute { name_index, info })
    }
}

/// Serialized verification types refer to classes by constant index and to uninitialized objects
/// by the bytecode offset of their `new` instruction
pub type RawVerificationType = VerificationType<ClassConstantIndex, u16>;

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl StackMapTable {
    /// Read the body of a `StackMapTable` attribute, requiring that all of the input is used
    pub fn read(bytes: &[u8]) -> Result<StackMapTable, Error> {
        let mut reader = bytes;
        let invalid = |frame_index, kind| Error::InvalidStackMapFrame { frame_index, kind };

        let count = u16::deserialize(&mut reader).map_err(|err| invalid(0, err.into()))?;
        let mut frames = Vec::with_capacity(count as usize);
        for frame_index in 0..count as usize {
            let frame = StackMapFrame::read(&mut reader).map_err(|kind| invalid(frame_index, kind))?;
            frames.push(frame);
        }

        if !reader.is_empty() {
            let kind = StackMapErrorKind::TrailingBytes(reader.len());
            return Err(invalid(count as usize, kind));
        }
        Ok(StackMapTable(frames))
    }
}

/// Field whose assignment is still pending in a larval frame
///
/// Identified by the class declaring it and its name and type.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct UnsetFieldIndices {
    pub class: ClassConstantIndex,
    pub name_and_type: NameAndTypeConstantIndex,
}

impl Serialize for UnsetFieldIndices {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.class.serialize(writer)?;
        self.name_and_type.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for UnsetFieldIndices {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(UnsetFieldIndices {
            class: ClassConstantIndex::deserialize(reader)?,
            name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: RawVerificationType,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<RawVerificationType>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<RawVerificationType>,
        stack: Vec<RawVerificationType>,
    },

    /// Prefix updating the set of unset fields, followed by the actual frame
    ///
    /// `base` is never itself an `EarlyLarval` frame.
    /// Tag: 246
    EarlyLarval {
        unset_fields: Vec<UnsetFieldIndices>,
        base: Box<StackMapFrame>,
    },
}

impl StackMapFrame {
    pub const SAME_LOCALS_ONE_STACK_EXTENDED: u8 = 247;
    pub const SAME_LOCALS_NO_STACK_EXTENDED: u8 = 251;
    pub const FULL: u8 = 255;
    pub const EARLY_LARVAL: u8 = 246;

    /// Offset delta stored in the frame
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
            StackMapFrame::EarlyLarval { base, .. } => base.offset_delta(),
        }
    }

    /// Tag byte this frame serializes with
    ///
    /// For a larval prefix, this is the tag of the base frame.
    pub fn frame_type(&self) -> u8 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta } if *offset_delta <= 63 => {
                *offset_delta as u8
            }
            StackMapFrame::SameLocalsNoStack { .. } => Self::SAME_LOCALS_NO_STACK_EXTENDED,
            StackMapFrame::SameLocalsOneStack { offset_delta, .. } if *offset_delta <= 63 => {
                *offset_delta as u8 + 64
            }
            StackMapFrame::SameLocalsOneStack { .. } => Self::SAME_LOCALS_ONE_STACK_EXTENDED,
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => 251 - chopped_k,
            StackMapFrame::AppendLocalsNoStack { locals, .. } => 251 + locals.len() as u8,
            StackMapFrame::Full { .. } => Self::FULL,
            StackMapFrame::EarlyLarval { base, .. } => base.frame_type(),
        }
    }

    /// Read one frame, including a larval prefix if there is one
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<StackMapFrame, StackMapErrorKind> {
        let tag = u8::deserialize(reader)?;
        if tag != Self::EARLY_LARVAL {
            return Self::read_base(tag, reader);
        }

        let unset_fields = Vec::<UnsetFieldIndices>::deserialize(reader)?;
        let base_tag = u8::deserialize(reader)?;
        if base_tag == Self::EARLY_LARVAL {
            return Err(StackMapErrorKind::NestedLarvalFrame);
        }
        let base = Box::new(Self::read_base(base_tag, reader)?);
        Ok(StackMapFrame::EarlyLarval { unset_fields, base })
    }

    fn read_base<R: ReadBytesExt>(tag: u8, reader: &mut R) -> Result<StackMapFrame, StackMapErrorKind> {
        let frame = match tag {
            0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: (tag - 64) as u16,
                stack: VerificationType::read(reader)?,
            },
            128..=246 => return Err(StackMapErrorKind::UnusedFrameType(tag)),
            Self::SAME_LOCALS_ONE_STACK_EXTENDED => StackMapFrame::SameLocalsOneStack {
                offset_delta: u16::deserialize(reader)?,
                stack: VerificationType::read(reader)?,
            },
            248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
                chopped_k: 251 - tag,
            },
            Self::SAME_LOCALS_NO_STACK_EXTENDED => StackMapFrame::SameLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
            },
            252..=254 => {
                let offset_delta = u16::deserialize(reader)?;
                let locals = (0..tag - 251)
                    .map(|_| VerificationType::read(reader))
                    .collect::<Result<_, _>>()?;
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            Self::FULL => {
                let offset_delta = u16::deserialize(reader)?;
                let locals = read_verification_types(reader)?;
                let stack = read_verification_types(reader)?;
                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
        };
        Ok(frame)
    }
}

fn read_verification_types<R: ReadBytesExt>(
    reader: &mut R,
) -> Result<Vec<RawVerificationType>, StackMapErrorKind> {
    let count = u16::deserialize(reader)?;
    (0..count).map(|_| VerificationType::read(reader)).collect()
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                self.frame_type().serialize(writer)?;
                if *offset_delta > 63 {
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                self.frame_type().serialize(writer)?;
                if *offset_delta > 63 {
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                assert!(
                    0 < *chopped_k && *chopped_k < 4,
                    "ChopLocalsNoStack chops 1-3 locals"
                );
                self.frame_type().serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                assert!(
                    0 < locals.len() && locals.len() < 4,
                    "AppendLocalsNoStack adds 1-3 locals"
                );
                self.frame_type().serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                Self::FULL.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }

            // `early_larval_frame`
            StackMapFrame::EarlyLarval { unset_fields, base } => {
                assert!(
                    !matches!(**base, StackMapFrame::EarlyLarval { .. }),
                    "EarlyLarval prefixes a base frame"
                );
                Self::EARLY_LARVAL.serialize(writer)?;
                unset_fields.serialize(writer)?;
                base.serialize(writer)?;
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantIndex;
    use VerificationType::*;

    fn bytes_of(frame: &StackMapFrame) -> Vec<u8> {
        let mut bytes = vec![];
        frame.serialize(&mut bytes).unwrap();
        bytes
    }

    fn read_back(bytes: &[u8]) -> Result<StackMapFrame, StackMapErrorKind> {
        let mut reader = bytes;
        let frame = StackMapFrame::read(&mut reader)?;
        assert!(reader.is_empty(), "Leftover bytes {:?}", reader);
        Ok(frame)
    }

    #[test]
    fn compact_and_extended_forms() {
        let same = StackMapFrame::SameLocalsNoStack { offset_delta: 63 };
        assert_eq!(bytes_of(&same), vec![63]);

        let same_extended = StackMapFrame::SameLocalsNoStack { offset_delta: 64 };
        assert_eq!(bytes_of(&same_extended), vec![251, 0, 64]);

        let one_stack = StackMapFrame::SameLocalsOneStack {
            offset_delta: 5,
            stack: Integer,
        };
        assert_eq!(bytes_of(&one_stack), vec![69, 1]);

        let one_stack_extended = StackMapFrame::SameLocalsOneStack {
            offset_delta: 300,
            stack: Uninitialized(7),
        };
        assert_eq!(bytes_of(&one_stack_extended), vec![247, 1, 44, 8, 0, 7]);

        for frame in [same, same_extended, one_stack, one_stack_extended] {
            assert_eq!(read_back(&bytes_of(&frame)).unwrap(), frame);
        }
    }

    #[test]
    fn chop_append_and_full() {
        let chop = StackMapFrame::ChopLocalsNoStack {
            offset_delta: 2,
            chopped_k: 3,
        };
        assert_eq!(bytes_of(&chop), vec![248, 0, 2]);

        let class = ClassConstantIndex(ConstantIndex(9));
        let append = StackMapFrame::AppendLocalsNoStack {
            offset_delta: 1,
            locals: vec![Long, Object(class)],
        };
        assert_eq!(bytes_of(&append), vec![253, 0, 1, 4, 7, 0, 9]);

        let full = StackMapFrame::Full {
            offset_delta: 0,
            locals: vec![Top, UninitializedThis],
            stack: vec![Null],
        };
        assert_eq!(bytes_of(&full), vec![255, 0, 0, 0, 2, 0, 6, 0, 1, 5]);

        for frame in [chop, append, full] {
            assert_eq!(read_back(&bytes_of(&frame)).unwrap(), frame);
        }
    }

    #[test]
    fn larval_prefix() {
        let field = UnsetFieldIndices {
            class: ClassConstantIndex(ConstantIndex(3)),
            name_and_type: NameAndTypeConstantIndex(ConstantIndex(4)),
        };
        let larval = StackMapFrame::EarlyLarval {
            unset_fields: vec![field],
            base: Box::new(StackMapFrame::SameLocalsNoStack { offset_delta: 2 }),
        };
        assert_eq!(bytes_of(&larval), vec![246, 0, 1, 0, 3, 0, 4, 2]);
        assert_eq!(larval.frame_type(), 2);
        assert_eq!(read_back(&bytes_of(&larval)).unwrap(), larval);

        assert_eq!(
            read_back(&[246, 0, 0, 246, 0, 0, 2]),
            Err(StackMapErrorKind::NestedLarvalFrame)
        );
    }

    #[test]
    fn malformed_frames() {
        assert_eq!(
            read_back(&[128]),
            Err(StackMapErrorKind::UnusedFrameType(128))
        );
        assert_eq!(
            read_back(&[245]),
            Err(StackMapErrorKind::UnusedFrameType(245))
        );
        assert_eq!(read_back(&[255, 0]), Err(StackMapErrorKind::UnexpectedEnd));
        assert_eq!(
            read_back(&[64, 9]),
            Err(StackMapErrorKind::InvalidVerificationTypeTag(9))
        );
    }

    #[test]
    fn table_trailing_bytes() {
        assert!(matches!(
            StackMapTable::read(&[0, 1, 3, 0]),
            Err(Error::InvalidStackMapFrame {
                frame_index: 1,
                kind: StackMapErrorKind::TrailingBytes(1),
            })
        ));
        assert_eq!(
            StackMapTable::read(&[0, 1, 3]).unwrap(),
            StackMapTable(vec![StackMapFrame::SameLocalsNoStack { offset_delta: 3 }])
        );
    }
}
