//! The byte cursor used by every decoder, and the DWARF initial length field.

use gimli::ReaderOffset;

use crate::error::{Error, Result};

/// A `gimli::Reader` over an in-memory section.
///
/// All section-relative offsets are `usize`, which lets decoders compute
/// offsets with `offset_from` and report them as plain numbers.
pub trait Reader: gimli::Reader<Offset = usize> + Send + Sync {}

impl<'input, Endian> Reader for gimli::EndianSlice<'input, Endian> where
    Endian: gimli::Endianity + Send + Sync
{
}

/// The 32-bit length value announcing that a 64-bit length follows.
pub const DWARF64_ESCAPE: u32 = 0xffff_ffff;

/// The length prefix that opens every unit, set and line program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialLength {
    pub format: gimli::Format,
    /// Number of bytes following the length field itself.
    pub length: u64,
}

impl InitialLength {
    /// Read the 4-byte length, and the 8-byte one after it when the escape
    /// value is present.
    pub fn read<R: Reader>(input: &mut R) -> Result<Self> {
        let value = input.read_u32()?;
        if value == DWARF64_ESCAPE {
            Ok(InitialLength {
                format: gimli::Format::Dwarf64,
                length: input.read_u64()?,
            })
        } else {
            Ok(InitialLength {
                format: gimli::Format::Dwarf32,
                length: u64::from(value),
            })
        }
    }

    /// Size of the length field as encoded.
    pub fn size(&self) -> usize {
        match self.format {
            gimli::Format::Dwarf32 => 4,
            gimli::Format::Dwarf64 => 12,
        }
    }

    /// Split the bytes covered by this length off `input`.
    pub(crate) fn split<R: Reader>(&self, input: &mut R) -> Result<R> {
        split_len(input, self.length)
    }
}

/// Split `length` bytes off the front of `input`, failing if fewer remain.
pub(crate) fn split_len<R: Reader>(input: &mut R, length: u64) -> Result<R> {
    match usize::from_u64(length) {
        Ok(len) if len <= input.len() => Ok(input.split(len)?),
        _ => Err(Error::LengthOutOfBounds { length }),
    }
}

/// Read a section offset, 4 or 8 bytes wide depending on `format`.
pub(crate) fn read_offset<R: Reader>(input: &mut R, format: gimli::Format) -> Result<u64> {
    Ok(input.read_word(format)?.into_u64())
}

/// Offset of `input`'s cursor within `section`.
pub(crate) fn position<R: Reader>(input: &R, section: &R) -> u64 {
    input.offset_from(section) as u64
}

/// Read a NUL-terminated string, replacing invalid UTF-8.
pub(crate) fn read_cstr<R: Reader>(input: &mut R) -> Result<String> {
    let bytes = input.read_null_terminated_slice()?;
    Ok(bytes.to_string_lossy()?.into_owned())
}

/// Read a length-prefixed block of bytes.
pub(crate) fn read_block<R: Reader>(input: &mut R, len: u64) -> Result<Vec<u8>> {
    let len = usize::from_u64(len)?;
    let block = input.split(len)?;
    Ok(block.to_slice()?.into_owned())
}

/// Read a 3-byte unsigned integer in the reader's byte order.
pub(crate) fn read_u24<R: Reader>(input: &mut R) -> Result<u64> {
    use gimli::Endianity;

    let mut buf = [0u8; 3];
    for byte in buf.iter_mut() {
        *byte = input.read_u8()?;
    }
    let value = if input.endian().is_big_endian() {
        (u64::from(buf[0]) << 16) | (u64::from(buf[1]) << 8) | u64::from(buf[2])
    } else {
        (u64::from(buf[2]) << 16) | (u64::from(buf[1]) << 8) | u64::from(buf[0])
    };
    Ok(value)
}
