//! Little-endian primitive reading and writing for module images.
//!
//! The [`CilIO`] trait abstracts over the fixed-size primitives stored in images and method
//! bodies, and [`read_le_at`] / [`write_le_at`] provide bounds-checked cursor access on top of it.

use crate::{Error::OutOfBounds, Result};

/// Endian-aware conversion for the fixed-size primitives found in module images.
pub trait CilIO: Sized {
    /// The byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}

/// Safely writes `value` in little-endian byte order at `offset`, advancing it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too small.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    if *offset + bytes.len() > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    *offset += bytes.len();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_advances_offset() {
        let data = [0x01, 0x00, 0x02, 0x00];
        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 1);
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 2);
        assert_eq!(offset, 4);
        assert!(matches!(read_le_at::<u8>(&data, &mut offset), Err(OutOfBounds)));
    }

    #[test]
    fn write_then_read_float() {
        let mut data = [0u8; 8];
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, 2.5f64).unwrap();
        let mut offset = 0;
        assert_eq!(read_le_at::<f64>(&data, &mut offset).unwrap(), 2.5);
    }

    #[test]
    fn write_out_of_bounds() {
        let mut data = [0u8; 2];
        let mut offset = 1;
        assert!(write_le_at(&mut data, &mut offset, 7u32).is_err());
        assert_eq!(offset, 1);
    }
}
