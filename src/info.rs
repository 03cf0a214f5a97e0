//! `.debug_info` decoding: unit headers and the flattened DIE tree.

use std::collections::HashMap;

use gimli::constants::*;

use crate::abbrev::decode_abbrev_set;
use crate::error::{Context, Diagnostic, Error, Result};
use crate::model::{
    AbbreviationDeclaration, AbbreviationSet, AttributeSpec, AttributeValue, CompileUnit, Entry,
    UnitExtra,
};
use crate::reader::{
    position, read_block, read_cstr, read_offset, read_u24, InitialLength, Reader,
};
use crate::sections::{DEBUG_ABBREV, DEBUG_INFO};

/// Longest `DW_FORM_indirect` chain followed before giving up.
pub const MAX_INDIRECTIONS: usize = 16;

/// What a form needs to know about the unit it is read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub format: gimli::Format,
    pub version: u16,
    pub address_size: u8,
}

/// A unit header, before any DIE is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHeader {
    pub offset: u64,
    pub length: u64,
    pub encoding: Encoding,
    pub unit_type: Option<gimli::DwUt>,
    pub abbr_offset: u64,
    pub extra: UnitExtra,
}

/// Read the header at the front of `input`, returning it together with the
/// rest of the unit.
pub fn read_unit_header<R: Reader>(input: &mut R, offset: u64) -> Result<(UnitHeader, R)> {
    let initial = InitialLength::read(input)?;
    let mut rest = initial.split(input)?;
    let format = initial.format;

    let version = rest.read_u16()?;
    if !(2..=5).contains(&version) {
        return Err(Error::UnsupportedUnitVersion(version));
    }

    let (unit_type, abbr_offset, address_size) = if version >= 5 {
        let unit_type = gimli::DwUt(rest.read_u8()?);
        let address_size = rest.read_u8()?;
        let abbr_offset = read_offset(&mut rest, format)?;
        (Some(unit_type), abbr_offset, address_size)
    } else {
        let abbr_offset = read_offset(&mut rest, format)?;
        let address_size = rest.read_u8()?;
        (None, abbr_offset, address_size)
    };

    let extra = match unit_type {
        Some(DW_UT_skeleton) | Some(DW_UT_split_compile) => UnitExtra::DwoId(rest.read_u64()?),
        Some(DW_UT_type) | Some(DW_UT_split_type) => UnitExtra::Type {
            signature: rest.read_u64()?,
            type_offset: read_offset(&mut rest, format)?,
        },
        _ => UnitExtra::None,
    };

    let header = UnitHeader {
        offset,
        length: initial.length,
        encoding: Encoding {
            format,
            version,
            address_size,
        },
        unit_type,
        abbr_offset,
        extra,
    };
    Ok((header, rest))
}

/// The address size of every unit whose header can be read, in order.
///
/// Stops quietly at the first unreadable header; decoding the DIE tree
/// reports that failure.
pub fn unit_address_sizes<R: Reader>(section: &R) -> Vec<u8> {
    let mut input = section.clone();
    let mut sizes = Vec::new();
    while !input.is_empty() {
        let offset = position(&input, section);
        match read_unit_header(&mut input, offset) {
            Ok((header, _)) => sizes.push(header.encoding.address_size),
            Err(_) => break,
        }
    }
    sizes
}

/// Result of decoding `.debug_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInfo {
    pub units: Vec<CompileUnit>,
    /// `DW_AT_stmt_list` of each unit's root DIE, parallel to `units`.
    pub stmt_lists: Vec<Option<u64>>,
    /// Abbreviation sets read on demand for units whose abbreviation offset
    /// is not the start of any set passed in.
    pub abbrev_sets: Vec<AbbreviationSet>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Decode every unit of `.debug_info`.
///
/// An unknown abbreviation code ends its unit only; decoding resumes at the
/// next unit header. Any other failure stops the decode. Either way, units
/// and entries fully read before it are kept and the entry being read is
/// dropped.
pub fn decode_info<R: Reader>(
    debug_info: &R,
    debug_abbrev: &R,
    abbrev_sets: &[AbbreviationSet],
) -> DecodedInfo {
    let mut decoded = DecodedInfo {
        units: Vec::new(),
        stmt_lists: Vec::new(),
        abbrev_sets: Vec::new(),
        diagnostics: Vec::new(),
    };
    let mut input = debug_info.clone();
    while !input.is_empty() {
        let offset = position(&input, debug_info);
        let (header, mut entries_input) = match read_unit_header(&mut input, offset) {
            Ok(header) => header,
            Err(err) => {
                decoded.diagnostics.push(Diagnostic::new(DEBUG_INFO, offset, err));
                break;
            }
        };

        let abbr_offset = header.abbr_offset;
        let known = abbrev_sets.iter().find(|set| set.offset == abbr_offset);
        let loaded = decoded
            .abbrev_sets
            .iter()
            .position(|set| set.offset == abbr_offset);
        let set = match known {
            Some(set) => set,
            None => match loaded {
                Some(i) => &decoded.abbrev_sets[i],
                None => match decode_abbrev_set(debug_abbrev, abbr_offset) {
                    Ok(set) => {
                        decoded.abbrev_sets.push(set);
                        &decoded.abbrev_sets[decoded.abbrev_sets.len() - 1]
                    }
                    Err(err) => {
                        decoded
                            .diagnostics
                            .push(Diagnostic::new(DEBUG_ABBREV, abbr_offset, err));
                        break;
                    }
                },
            },
        };

        let mut unit = CompileUnit {
            offset,
            format: header.encoding.format,
            length: header.length,
            version: header.encoding.version,
            unit_type: header.unit_type,
            abbr_offset,
            address_size: header.encoding.address_size,
            extra: header.extra,
            entries: Vec::new(),
        };
        let walker = EntryWalker::new(debug_info, set, header.encoding);
        let result = walker.read_entries(&mut entries_input, &mut unit.entries);
        decoded.stmt_lists.push(stmt_list(&unit, set));
        decoded.units.push(unit);
        if let Err(err) = result {
            // The unit header bounds the unit, so `input` is already at the
            // next one.
            let resumable = is_unknown_abbreviation(&err);
            decoded.diagnostics.push(Diagnostic::from_error(DEBUG_INFO, err));
            if !resumable {
                break;
            }
        }
    }
    tracing::debug!(units = decoded.units.len(), "decoded compile units");
    decoded
}

fn is_unknown_abbreviation(err: &Error) -> bool {
    match err {
        Error::UnknownAbbreviation { .. } => true,
        Error::Section { source, .. } => is_unknown_abbreviation(source),
        _ => false,
    }
}

/// The line program offset named by the unit's root DIE.
fn stmt_list(unit: &CompileUnit, set: &AbbreviationSet) -> Option<u64> {
    let root = unit.entries.first()?;
    let decl = set.get(root.abbr_code)?;
    let (_, value) = decl
        .attributes
        .iter()
        .zip(&root.values)
        .find(|(spec, _)| spec.name == DW_AT_stmt_list)?;
    match value.resolved() {
        AttributeValue::Unsigned(offset) => Some(*offset),
        _ => None,
    }
}

struct EntryWalker<'a, R: Reader> {
    section: &'a R,
    set: &'a AbbreviationSet,
    declarations: HashMap<u64, &'a AbbreviationDeclaration>,
    encoding: Encoding,
}

impl<'a, R: Reader> EntryWalker<'a, R> {
    fn new(section: &'a R, set: &'a AbbreviationSet, encoding: Encoding) -> Self {
        let declarations = set
            .declarations
            .iter()
            .map(|decl| (decl.code, decl))
            .collect();
        EntryWalker {
            section,
            set,
            declarations,
            encoding,
        }
    }

    /// Walk the DIEs of one unit in pre-order until the root's children are
    /// closed or the unit runs out of bytes.
    fn read_entries(&self, input: &mut R, entries: &mut Vec<Entry>) -> Result<()> {
        let mut depth = 0isize;
        while !input.is_empty() {
            let offset = position(input, self.section);
            let code = input.read_uleb128().context(DEBUG_INFO, offset)?;
            if code == 0 {
                entries.push(Entry {
                    offset,
                    abbr_code: 0,
                    values: Vec::new(),
                });
                depth -= 1;
                if depth <= 0 {
                    break;
                }
                continue;
            }

            let decl = match self.declarations.get(&code) {
                Some(decl) => *decl,
                None => {
                    entries.push(Entry {
                        offset,
                        abbr_code: code,
                        values: Vec::new(),
                    });
                    return Err(Error::UnknownAbbreviation {
                        code,
                        abbr_offset: self.set.offset,
                    })
                    .context(DEBUG_INFO, offset);
                }
            };

            let mut values = Vec::with_capacity(decl.attributes.len());
            for spec in &decl.attributes {
                let value = read_attribute(input, spec, self.encoding).context(DEBUG_INFO, offset)?;
                values.push(value);
            }
            entries.push(Entry {
                offset,
                abbr_code: code,
                values,
            });

            if decl.has_children() {
                depth += 1;
            } else if depth == 0 {
                break;
            }
        }
        Ok(())
    }
}

/// Read one attribute, following `DW_FORM_indirect` to the actual form.
pub fn read_attribute<R: Reader>(
    input: &mut R,
    spec: &AttributeSpec,
    encoding: Encoding,
) -> Result<AttributeValue> {
    let mut form = spec.form;
    let mut chain = Vec::new();
    while form == DW_FORM_indirect {
        if chain.len() == MAX_INDIRECTIONS {
            return Err(Error::IndirectionLimit(MAX_INDIRECTIONS));
        }
        form = gimli::DwForm(input.read_uleb128_u16()?);
        chain.push(form);
    }

    let implicit_const = if form == spec.form {
        spec.implicit_const
    } else {
        None
    };
    let mut value = read_form_value(input, form, implicit_const, encoding)?;
    for form in chain.into_iter().rev() {
        value = AttributeValue::Indirect {
            form,
            value: Box::new(value),
        };
    }
    Ok(value)
}

/// Read the value of a concrete (non-indirect) form.
pub fn read_form_value<R: Reader>(
    input: &mut R,
    form: gimli::DwForm,
    implicit_const: Option<i64>,
    encoding: Encoding,
) -> Result<AttributeValue> {
    let value = match form {
        DW_FORM_addr => AttributeValue::Unsigned(input.read_address(encoding.address_size)?),
        DW_FORM_addrx | DW_FORM_GNU_addr_index => AttributeValue::Unsigned(input.read_uleb128()?),
        DW_FORM_addrx1 => AttributeValue::Unsigned(u64::from(input.read_u8()?)),
        DW_FORM_addrx2 => AttributeValue::Unsigned(u64::from(input.read_u16()?)),
        DW_FORM_addrx3 => AttributeValue::Unsigned(read_u24(input)?),
        DW_FORM_addrx4 => AttributeValue::Unsigned(u64::from(input.read_u32()?)),

        DW_FORM_ref_addr => {
            // DWARF 2 encodes these as addresses, later versions as offsets.
            if encoding.version <= 2 {
                AttributeValue::Unsigned(input.read_address(encoding.address_size)?)
            } else {
                AttributeValue::Unsigned(read_offset(input, encoding.format)?)
            }
        }
        DW_FORM_ref1 => AttributeValue::Unsigned(u64::from(input.read_u8()?)),
        DW_FORM_ref2 => AttributeValue::Unsigned(u64::from(input.read_u16()?)),
        DW_FORM_ref4 => AttributeValue::Unsigned(u64::from(input.read_u32()?)),
        DW_FORM_ref8 | DW_FORM_ref_sig8 => AttributeValue::Unsigned(input.read_u64()?),
        DW_FORM_ref_udata => AttributeValue::Unsigned(input.read_uleb128()?),
        DW_FORM_GNU_ref_alt => {
            AttributeValue::Unsigned(read_offset(input, encoding.format)?)
        }

        DW_FORM_exprloc | DW_FORM_block => {
            let len = input.read_uleb128()?;
            AttributeValue::Block(read_block(input, len)?)
        }
        DW_FORM_block1 => {
            let len = input.read_u8()?;
            AttributeValue::Block(read_block(input, u64::from(len))?)
        }
        DW_FORM_block2 => {
            let len = input.read_u16()?;
            AttributeValue::Block(read_block(input, u64::from(len))?)
        }
        DW_FORM_block4 => {
            let len = input.read_u32()?;
            AttributeValue::Block(read_block(input, u64::from(len))?)
        }
        DW_FORM_data16 => AttributeValue::Block(read_block(input, 16)?),

        DW_FORM_data1 | DW_FORM_flag => AttributeValue::Unsigned(u64::from(input.read_u8()?)),
        DW_FORM_data2 => AttributeValue::Unsigned(u64::from(input.read_u16()?)),
        DW_FORM_data4 | DW_FORM_ref_sup4 => AttributeValue::Unsigned(u64::from(input.read_u32()?)),
        DW_FORM_data8 | DW_FORM_ref_sup8 => AttributeValue::Unsigned(input.read_u64()?),
        DW_FORM_sdata => AttributeValue::Unsigned(input.read_sleb128()? as u64),
        DW_FORM_udata => AttributeValue::Unsigned(input.read_uleb128()?),
        DW_FORM_implicit_const => match implicit_const {
            Some(value) => AttributeValue::Unsigned(value as u64),
            None => return Err(Error::UnsupportedForm(form)),
        },

        DW_FORM_string => AttributeValue::String(read_cstr(input)?),

        DW_FORM_strp
        | DW_FORM_sec_offset
        | DW_FORM_line_strp
        | DW_FORM_strp_sup
        | DW_FORM_GNU_strp_alt => {
            AttributeValue::Unsigned(read_offset(input, encoding.format)?)
        }
        DW_FORM_strx | DW_FORM_GNU_str_index | DW_FORM_loclistx | DW_FORM_rnglistx => {
            AttributeValue::Unsigned(input.read_uleb128()?)
        }
        DW_FORM_strx1 => AttributeValue::Unsigned(u64::from(input.read_u8()?)),
        DW_FORM_strx2 => AttributeValue::Unsigned(u64::from(input.read_u16()?)),
        DW_FORM_strx3 => AttributeValue::Unsigned(read_u24(input)?),
        DW_FORM_strx4 => AttributeValue::Unsigned(u64::from(input.read_u32()?)),

        DW_FORM_flag_present => AttributeValue::Unsigned(1),

        _ => return Err(Error::UnsupportedForm(form)),
    };
    Ok(value)
}
