//! `.debug_str` splitting.

use crate::error::Result;
use crate::reader::Reader;

/// Split the string section on NUL bytes.
///
/// A section that ends with a NUL does not produce a trailing empty string,
/// and a final run without a NUL is still returned.
pub fn split_strings<R: Reader>(section: &R) -> Result<Vec<String>> {
    let bytes = section.to_slice()?;
    let mut strings = Vec::new();
    let mut remaining: &[u8] = &bytes;
    while !remaining.is_empty() {
        let (string, rest) = match remaining.iter().position(|&b| b == 0) {
            Some(nul) => (&remaining[..nul], &remaining[nul + 1..]),
            None => (remaining, &[][..]),
        };
        strings.push(String::from_utf8_lossy(string).into_owned());
        remaining = rest;
    }
    Ok(strings)
}
