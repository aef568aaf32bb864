use crate::jvm::class_file::{ClassConstantIndex, Deserialize, Serialize};
use crate::jvm::{BaseType, FieldType, RefType, StackMapErrorKind};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot (eg. a local that was never written, or the second half of a wide local)
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    /// `U` identifies the `new` instruction: a label while frames are being built up or
    /// inspected, and a `u16` offset from the start of the method body once serialized.
    Uninitialized(U),
}

impl<Cls, U> VerificationType<Cls, U> {
    pub const TOP_TAG: u8 = 0;
    pub const INTEGER_TAG: u8 = 1;
    pub const FLOAT_TAG: u8 = 2;
    pub const DOUBLE_TAG: u8 = 3;
    pub const LONG_TAG: u8 = 4;
    pub const NULL_TAG: u8 = 5;
    pub const UNINITIALIZED_THIS_TAG: u8 = 6;
    pub const OBJECT_TAG: u8 = 7;
    pub const UNINITIALIZED_TAG: u8 = 8;

    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    /// Tag used for this type in `verification_type_info`
    pub fn tag(&self) -> u8 {
        match self {
            VerificationType::Top => Self::TOP_TAG,
            VerificationType::Integer => Self::INTEGER_TAG,
            VerificationType::Float => Self::FLOAT_TAG,
            VerificationType::Double => Self::DOUBLE_TAG,
            VerificationType::Long => Self::LONG_TAG,
            VerificationType::Null => Self::NULL_TAG,
            VerificationType::UninitializedThis => Self::UNINITIALIZED_THIS_TAG,
            VerificationType::Object(_) => Self::OBJECT_TAG,
            VerificationType::Uninitialized(_) => Self::UNINITIALIZED_TAG,
        }
    }

    pub fn map<C2, U2>(
        &self,
        map_class: impl FnOnce(&Cls) -> C2,
        map_uninitialized: impl FnOnce(&U) -> U2,
    ) -> VerificationType<C2, U2> {
        match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit))
            }
        }
    }

    /// Like [`Self::map`], but the mappings can fail
    pub fn try_map<C2, U2, E>(
        &self,
        map_class: impl FnOnce(&Cls) -> Result<C2, E>,
        map_uninitialized: impl FnOnce(&U) -> Result<U2, E>,
    ) -> Result<VerificationType<C2, U2>, E> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)?),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit)?)
            }
        })
    }
}

impl<C, U> From<FieldType<C>> for VerificationType<RefType<C>, U> {
    fn from(field_type: FieldType<C>) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            VerificationType::Object(cls) => cls.serialize(writer)?,
            VerificationType::Uninitialized(off) => off.serialize(writer)?,
            _ => (),
        };
        Ok(())
    }
}

impl VerificationType<ClassConstantIndex, u16> {
    /// Read a `verification_type_info`
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<Self, StackMapErrorKind> {
        let verification_type = match u8::deserialize(reader)? {
            Self::TOP_TAG => VerificationType::Top,
            Self::INTEGER_TAG => VerificationType::Integer,
            Self::FLOAT_TAG => VerificationType::Float,
            Self::DOUBLE_TAG => VerificationType::Double,
            Self::LONG_TAG => VerificationType::Long,
            Self::NULL_TAG => VerificationType::Null,
            Self::UNINITIALIZED_THIS_TAG => VerificationType::UninitializedThis,
            Self::OBJECT_TAG => VerificationType::Object(ClassConstantIndex::deserialize(reader)?),
            Self::UNINITIALIZED_TAG => VerificationType::Uninitialized(u16::deserialize(reader)?),
            other => return Err(StackMapErrorKind::InvalidVerificationTypeTag(other)),
        };
        Ok(verification_type)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantIndex;
    use crate::jvm::BinaryName;

    type RawType = VerificationType<ClassConstantIndex, u16>;

    #[test]
    fn field_types() {
        let vtype: VerificationType<RefType<BinaryName>, u16> = FieldType::Base(BaseType::Char).into();
        assert_eq!(vtype, VerificationType::Integer);

        let vtype: VerificationType<RefType<BinaryName>, u16> = FieldType::object(BinaryName::STRING).into();
        assert_eq!(vtype, VerificationType::Object(RefType::Object(BinaryName::STRING)));
        assert!(vtype.is_reference());
        assert!(!VerificationType::<(), ()>::Top.is_reference());
    }

    #[test]
    fn serialized_form() {
        let object: RawType = VerificationType::Object(ClassConstantIndex(ConstantIndex(0x102)));
        let mut bytes = vec![];
        object.serialize(&mut bytes).unwrap();
        RawType::Top.serialize(&mut bytes).unwrap();
        RawType::Uninitialized(3).serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![7, 1, 2, 0, 8, 0, 3]);

        let mut reader = &bytes[..];
        assert_eq!(RawType::read(&mut reader), Ok(object));
        assert_eq!(RawType::read(&mut reader), Ok(RawType::Top));
        assert_eq!(RawType::read(&mut reader), Ok(RawType::Uninitialized(3)));
        assert_eq!(RawType::read(&mut reader), Err(StackMapErrorKind::UnexpectedEnd));
    }

    #[test]
    fn try_map_short_circuits() {
        let uninit: VerificationType<u16, u16> = VerificationType::Uninitialized(40);
        let mapped: Result<VerificationType<u16, u32>, &str> =
            uninit.try_map(|c| Ok(*c), |_| Err("no label"));
        assert_eq!(mapped, Err("no label"));

        let long: VerificationType<u16, u16> = VerificationType::Long;
        let mapped: Result<VerificationType<String, u32>, &str> =
            long.try_map(|_| Err("unused"), |_| Err("unused"));
        assert_eq!(mapped, Ok(VerificationType::Long));
    }
}
