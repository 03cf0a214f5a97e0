//! `.debug_abbrev` decoding.

use crate::error::{Diagnostic, Result};
use crate::model::{AbbreviationDeclaration, AbbreviationSet, AttributeSpec};
use crate::reader::{position, Reader};
use crate::sections::DEBUG_ABBREV;

/// Decode every abbreviation set in the section, back to back.
///
/// Sets decoded before a failure are kept; the failure itself is returned as
/// a diagnostic.
pub fn decode_abbrev<R: Reader>(section: &R) -> (Vec<AbbreviationSet>, Option<Diagnostic>) {
    let mut input = section.clone();
    let mut sets = Vec::new();
    while !input.is_empty() {
        let offset = position(&input, section);
        match parse_set(&mut input, offset) {
            Ok(set) => sets.push(set),
            Err(err) => return (sets, Some(Diagnostic::new(DEBUG_ABBREV, offset, err))),
        }
    }
    tracing::debug!(sets = sets.len(), "decoded abbreviation sets");
    (sets, None)
}

/// Decode the single set starting at `offset`.
pub fn decode_abbrev_set<R: Reader>(section: &R, offset: u64) -> Result<AbbreviationSet> {
    let mut input = section.clone();
    input.skip(offset as usize)?;
    parse_set(&mut input, offset)
}

fn parse_set<R: Reader>(input: &mut R, offset: u64) -> Result<AbbreviationSet> {
    let mut declarations = Vec::new();
    while let Some(decl) = parse_declaration(input)? {
        declarations.push(decl);
    }
    Ok(AbbreviationSet {
        offset,
        declarations,
    })
}

fn parse_declaration<R: Reader>(input: &mut R) -> Result<Option<AbbreviationDeclaration>> {
    let code = input.read_uleb128()?;
    if code == 0 {
        return Ok(None);
    }
    let tag = gimli::DwTag(input.read_uleb128_u16()?);
    let children = gimli::DwChildren(input.read_u8()?);

    let mut attributes = Vec::new();
    loop {
        let name = gimli::DwAt(input.read_uleb128_u16()?);
        let form = gimli::DwForm(input.read_uleb128_u16()?);
        if name.0 == 0 && form.0 == 0 {
            break;
        }
        let implicit_const = if form == gimli::DW_FORM_implicit_const {
            Some(input.read_sleb128()?)
        } else {
            None
        };
        attributes.push(AttributeSpec {
            name,
            form,
            implicit_const,
        });
    }

    Ok(Some(AbbreviationDeclaration {
        code,
        tag,
        children,
        attributes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gimli::{EndianSlice, LittleEndian};

    fn section(bytes: &[u8]) -> EndianSlice<LittleEndian> {
        EndianSlice::new(bytes, LittleEndian)
    }

    #[rustfmt::skip]
    const TWO_SETS: &[u8] = &[
        // set 0
        0x01, 0x11, 0x01,       // code 1, DW_TAG_compile_unit, children
        0x03, 0x08,             // DW_AT_name, DW_FORM_string
        0x10, 0x17,             // DW_AT_stmt_list, DW_FORM_sec_offset
        0x00, 0x00,
        0x02, 0x2e, 0x00,       // code 2, DW_TAG_subprogram, no children
        0x0b, 0x21, 0x7d,       // DW_AT_byte_size, DW_FORM_implicit_const -3
        0x00, 0x00,
        0x00,
        // set 1
        0x01, 0x24, 0x00,       // code 1, DW_TAG_base_type
        0x00, 0x00,
        0x00,
    ];

    #[test]
    fn decodes_sets_back_to_back() {
        let (sets, diagnostic) = decode_abbrev(&section(TWO_SETS));
        assert_eq!(diagnostic, None);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].offset, 0);
        assert_eq!(sets[0].declarations.len(), 2);
        assert_eq!(sets[1].offset, 18);
        assert_eq!(sets[1].declarations.len(), 1);

        let cu = sets[0].get(1).unwrap();
        assert_eq!(cu.tag, gimli::DW_TAG_compile_unit);
        assert!(cu.has_children());
        assert_eq!(cu.attributes.len(), 2);
        assert_eq!(cu.attributes[1].name, gimli::DW_AT_stmt_list);
        assert_eq!(cu.attributes[1].form, gimli::DW_FORM_sec_offset);
        assert_eq!(cu.attributes[1].implicit_const, None);

        let sub = sets[0].get(2).unwrap();
        assert!(!sub.has_children());
        assert_eq!(sub.attributes[0].implicit_const, Some(-3));
    }

    #[test]
    fn set_at_offset() {
        let set = decode_abbrev_set(&section(TWO_SETS), 18).unwrap();
        assert_eq!(set.offset, 18);
        assert_eq!(set.declarations[0].tag, gimli::DW_TAG_base_type);
    }

    #[test]
    fn truncated_set_is_reported() {
        let bytes = [0x01, 0x11, 0x01, 0x03, 0x08, 0x00, 0x00, 0x00, 0x01, 0x24];
        let (sets, diagnostic) = decode_abbrev(&section(&bytes));
        assert_eq!(sets.len(), 1);
        let diagnostic = diagnostic.unwrap();
        assert_eq!(diagnostic.section, ".debug_abbrev");
        assert_eq!(diagnostic.offset, 8);
    }

    #[test]
    fn empty_section_has_no_sets() {
        let (sets, diagnostic) = decode_abbrev(&section(&[]));
        assert!(sets.is_empty());
        assert!(diagnostic.is_none());
    }
}
