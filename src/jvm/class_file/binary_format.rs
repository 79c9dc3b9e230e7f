use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()>;
}

/// Counterpart of [`Serialize`] for reading class file structures back
///
/// Reading can fail for more reasons than writing (truncated input, invalid tags), so this
/// returns the class-format [`Error`] instead of a plain IO error.
pub trait Deserialize: Sized {
    /// Read the construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error>;
}

macro_rules! primitive_format {
    ($typ:ty, $write:ident, $read:ident) => {
        impl Serialize for $typ {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        }

        impl Deserialize for $typ {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                Ok(reader.$read::<BigEndian>()?)
            }
        }
    };
}

primitive_format!(u16, write_u16, read_u16);
primitive_format!(u32, write_u32, read_u32);
primitive_format!(u64, write_u64, read_u64);
primitive_format!(i16, write_i16, read_i16);
primitive_format!(i32, write_i32, read_i32);
primitive_format!(i64, write_i64, read_i64);
primitive_format!(f32, write_f32, read_f32);
primitive_format!(f64, write_f64, read_f64);

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_u8()?)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i8(*self)
    }
}

impl Deserialize for i8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_i8()?)
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Read exactly `len` raw bytes
pub fn read_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>, Error> {
    let mut buffer = vec![0; len];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn big_endian_and_length_prefixed() {
        let mut out = vec![];
        vec![0x0102u16, 0xA0B0].serialize(&mut out).unwrap();
        assert_eq!(out, vec![0, 2, 1, 2, 0xA0, 0xB0]);

        let read = Vec::<u16>::deserialize(&mut Cursor::new(&out)).unwrap();
        assert_eq!(read, vec![0x0102, 0xA0B0]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let result = u32::deserialize(&mut Cursor::new(&[0u8, 1]));
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
