use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///   - everything multi-byte is big-endian
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Inverse of [`Serialize`]
///
/// Running out of input surfaces as an [`std::io::ErrorKind::UnexpectedEof`] error.
pub trait Deserialize: Sized {
    /// Deserialize construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u8()
    }
}

impl Deserialize for u16 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u16::<BigEndian>()
    }
}

impl Deserialize for u32 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u32::<BigEndian>()
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let len = u16::deserialize(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn big_endian_integers() {
        let mut bytes = vec![];
        0x12u8.serialize(&mut bytes).unwrap();
        0x3456u16.serialize(&mut bytes).unwrap();
        0x789a_bcdeu32.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde]);

        let mut reader: &[u8] = &bytes;
        assert_eq!(u8::deserialize(&mut reader).unwrap(), 0x12);
        assert_eq!(u16::deserialize(&mut reader).unwrap(), 0x3456);
        assert_eq!(u32::deserialize(&mut reader).unwrap(), 0x789a_bcde);
        assert!(reader.is_empty());
    }

    #[test]
    fn length_prefixed_vectors() {
        let mut bytes = vec![];
        vec![1u16, 2, 3].serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 3, 0, 1, 0, 2, 0, 3]);

        // Length claims more elements than there are bytes
        let mut truncated: &[u8] = &[0, 3, 0, 1];
        let err = Vec::<u16>::deserialize(&mut truncated).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
