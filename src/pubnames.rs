//! `.debug_pubnames`, `.debug_pubtypes` and their GNU variants.

use fallible_iterator::FallibleIterator;

use crate::error::{Context, Diagnostic, Error, Result};
use crate::model::{PubEntry, PubSection};
use crate::reader::{position, read_cstr, read_offset, InitialLength, Reader};

/// Iterator over the sets of one public names or types section.
#[derive(Debug, Clone)]
pub struct PubSets<R: Reader> {
    name: &'static str,
    section: R,
    input: R,
    gnu_style: bool,
}

impl<R: Reader> PubSets<R> {
    /// `gnu_style` selects the layout with a descriptor byte per entry.
    pub fn new(name: &'static str, section: R, gnu_style: bool) -> Self {
        PubSets {
            name,
            input: section.clone(),
            section,
            gnu_style,
        }
    }
}

impl<R: Reader> FallibleIterator for PubSets<R> {
    type Item = PubSection;
    type Error = Error;

    fn next(&mut self) -> Result<Option<PubSection>> {
        if self.input.is_empty() {
            return Ok(None);
        }
        let offset = position(&self.input, &self.section);
        match parse_set(&mut self.input, offset, self.gnu_style).context(self.name, offset) {
            Ok(set) => Ok(Some(set)),
            Err(err) => {
                self.input.empty();
                Err(err)
            }
        }
    }
}

/// Decode one public names or types section. An absent section yields no
/// sets; a malformed one keeps the sets read before the failure.
pub fn decode_pub_section<R: Reader>(
    name: &'static str,
    section: &R,
    gnu_style: bool,
) -> (Vec<PubSection>, Option<Diagnostic>) {
    let mut sets = Vec::new();
    let mut iter = PubSets::new(name, section.clone(), gnu_style);
    loop {
        match iter.next() {
            Ok(Some(set)) => sets.push(set),
            Ok(None) => break,
            Err(err) => return (sets, Some(Diagnostic::from_error(name, err))),
        }
    }
    if !sets.is_empty() {
        tracing::debug!(section = name, sets = sets.len(), "decoded public name sets");
    }
    (sets, None)
}

fn parse_set<R: Reader>(input: &mut R, offset: u64, gnu_style: bool) -> Result<PubSection> {
    let initial = InitialLength::read(input)?;
    let mut rest = initial.split(input)?;

    let version = rest.read_u16()?;
    let unit_offset = read_offset(&mut rest, initial.format)?;
    let unit_size = read_offset(&mut rest, initial.format)?;

    let mut entries = Vec::new();
    while !rest.is_empty() {
        let die_offset = read_offset(&mut rest, initial.format)?;
        let descriptor = if gnu_style {
            Some(rest.read_u8()?)
        } else {
            None
        };
        // The list closes with a bare zero offset in most producers.
        let name = if rest.is_empty() {
            String::new()
        } else {
            read_cstr(&mut rest)?
        };
        entries.push(PubEntry {
            die_offset,
            descriptor,
            name,
        });
    }

    Ok(PubSection {
        offset,
        format: initial.format,
        length: initial.length,
        version,
        unit_offset,
        unit_size,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gimli::{EndianSlice, LittleEndian};

    fn section(bytes: &[u8]) -> EndianSlice<LittleEndian> {
        EndianSlice::new(bytes, LittleEndian)
    }

    #[rustfmt::skip]
    const PUBNAMES: &[u8] = &[
        0x1d, 0, 0, 0,            // length
        2, 0,                     // version
        0, 0, 0, 0,               // unit offset
        0x40, 0, 0, 0,            // unit size
        0x2a, 0, 0, 0, b'm', b'a', b'i', b'n', 0,
        0x35, 0, 0, 0, b'f', 0,
        0, 0, 0, 0,               // terminator
    ];

    #[test]
    fn decodes_entries_up_to_the_length_bound() {
        let (sets, diagnostic) = decode_pub_section(".debug_pubnames", &section(PUBNAMES), false);
        assert!(diagnostic.is_none());
        assert_eq!(sets.len(), 1);
        let set = &sets[0];
        assert_eq!(set.version, 2);
        assert_eq!(set.unit_size, 0x40);
        assert_eq!(set.entries.len(), 3);
        assert_eq!(set.entries[0].die_offset, 0x2a);
        assert_eq!(set.entries[0].name, "main");
        assert_eq!(set.entries[1].name, "f");
        assert_eq!(set.entries[2].die_offset, 0);
        assert_eq!(set.entries[2].name, "");
        assert!(set.entries.iter().all(|entry| entry.descriptor.is_none()));
    }

    #[rustfmt::skip]
    #[test]
    fn gnu_style_reads_descriptors() {
        let bytes = [
            0x11, 0, 0, 0,
            2, 0,
            0, 0, 0, 0,
            0x40, 0, 0, 0,
            0x2a, 0, 0, 0, 0x30, b'x', 0,
        ];
        let (sets, _) = decode_pub_section(".debug_gnu_pubnames", &section(&bytes), true);
        assert_eq!(sets[0].entries[0].descriptor, Some(0x30));
        assert_eq!(sets[0].entries[0].name, "x");
    }

    #[test]
    fn dwarf64_set_uses_eight_byte_offsets() {
        let mut bytes = vec![0xff; 4];
        bytes.extend_from_slice(&39u64.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&0x100u64.to_le_bytes());
        bytes.extend_from_slice(&0x80u64.to_le_bytes());
        bytes.extend_from_slice(&0x2au64.to_le_bytes());
        bytes.extend_from_slice(b"main\0");
        bytes.extend_from_slice(&0u64.to_le_bytes());

        let (sets, diagnostic) = decode_pub_section(".debug_pubnames", &section(&bytes), false);
        assert!(diagnostic.is_none());
        let set = &sets[0];
        assert_eq!(set.format, gimli::Format::Dwarf64);
        assert_eq!(set.length, 39);
        assert_eq!(set.unit_offset, 0x100);
        assert_eq!(set.unit_size, 0x80);
        assert_eq!(set.entries.len(), 2);
        assert_eq!(set.entries[0].die_offset, 0x2a);
        assert_eq!(set.entries[0].name, "main");
        assert_eq!(set.entries[1].name, "");
    }

    #[rustfmt::skip]
    #[test]
    fn every_gnu_pubtypes_set_is_decoded() {
        let mut bytes = Vec::new();
        for (unit_offset, die, name) in [(0u8, 0x2au8, b'i'), (0x40, 0x4b, b'u')] {
            bytes.extend_from_slice(&[
                0x16, 0, 0, 0,
                2, 0,
                unit_offset, 0, 0, 0,
                0x40, 0, 0, 0,
                die, 0, 0, 0, 0x90, name, 0,
                0, 0, 0, 0, 0,
            ]);
        }
        let (sets, diagnostic) = decode_pub_section(".debug_gnu_pubtypes", &section(&bytes), true);
        assert!(diagnostic.is_none());
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].offset, 26);
        assert_eq!(sets[1].unit_offset, 0x40);
        assert_eq!(sets[1].entries[0].descriptor, Some(0x90));
        assert_eq!(sets[1].entries[0].name, "u");
        assert_eq!(sets[1].entries[1].descriptor, Some(0));
    }

    #[test]
    fn absent_section_is_empty() {
        let (sets, diagnostic) = decode_pub_section(".debug_pubtypes", &section(&[]), false);
        assert!(sets.is_empty());
        assert!(diagnostic.is_none());
    }

    #[test]
    fn truncated_set_is_reported() {
        let (sets, diagnostic) =
            decode_pub_section(".debug_pubnames", &section(&PUBNAMES[..20]), false);
        assert!(sets.is_empty());
        assert_eq!(diagnostic.unwrap().section, ".debug_pubnames");
    }
}
