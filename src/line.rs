//! `.debug_line` decoding.
//!
//! The opcode stream is kept as written; rows are never computed here. A
//! consumer that wants the line matrix runs the program itself using the
//! header's line base, line range and opcode base.

use crate::error::{Context, Diagnostic, Error, Result};
use crate::info::{read_form_value, Encoding};
use crate::model::{
    AttributeValue, EntryFormat, EntryTables, ExtendedOperand, FileEntry, LineOpcode, LineTable,
    StandardOperand,
};
use crate::reader::{read_cstr, read_offset, split_len, InitialLength, Reader};
use crate::sections::DEBUG_LINE;

/// Decode the line program at `offset` for a unit with the given address
/// size.
pub fn decode_line_table<R: Reader>(
    debug_line: &R,
    offset: u64,
    address_size: u8,
) -> Result<LineTable> {
    let mut input = debug_line.clone();
    input.skip(offset as usize).context(DEBUG_LINE, offset)?;
    parse_program(&mut input, offset, address_size).context(DEBUG_LINE, offset)
}

/// Decode the line program of every unit that has one, in unit order.
///
/// A program that fails to decode is skipped and reported.
pub fn decode_line_tables<R, I>(debug_line: &R, programs: I) -> (Vec<LineTable>, Vec<Diagnostic>)
where
    R: Reader,
    I: IntoIterator<Item = (u64, u8)>,
{
    let mut tables = Vec::new();
    let mut diagnostics = Vec::new();
    for (offset, address_size) in programs {
        match decode_line_table(debug_line, offset, address_size) {
            Ok(table) => {
                tracing::debug!(offset, opcodes = table.opcodes.len(), "decoded line table");
                tables.push(table);
            }
            Err(err) => diagnostics.push(Diagnostic::from_error(DEBUG_LINE, err)),
        }
    }
    (tables, diagnostics)
}

fn parse_program<R: Reader>(input: &mut R, offset: u64, unit_address_size: u8) -> Result<LineTable> {
    let initial = InitialLength::read(input)?;
    let format = initial.format;
    let mut program = initial.split(input)?;

    let version = program.read_u16()?;
    if !(2..=5).contains(&version) {
        return Err(Error::UnsupportedLineVersion(version));
    }
    let (address_size, segment_selector_size) = if version >= 5 {
        (Some(program.read_u8()?), Some(program.read_u8()?))
    } else {
        (None, None)
    };
    let prologue_length = read_offset(&mut program, format)?;
    let mut header = split_len(&mut program, prologue_length)?;

    let min_inst_length = header.read_u8()?;
    let max_ops_per_inst = if version >= 4 {
        Some(header.read_u8()?)
    } else {
        None
    };
    let default_is_stmt = header.read_u8()?;
    let line_base = header.read_i8()?;
    let line_range = header.read_u8()?;
    let opcode_base = header.read_u8()?;
    let mut standard_opcode_lengths = Vec::new();
    for _ in 1..opcode_base {
        standard_opcode_lengths.push(header.read_u8()?);
    }

    let encoding = Encoding {
        format,
        version,
        address_size: address_size.unwrap_or(unit_address_size),
    };

    let mut include_dirs = Vec::new();
    let mut files = Vec::new();
    let mut entry_tables = None;
    if version >= 5 {
        entry_tables = Some(parse_entry_tables(&mut header, encoding)?);
    } else {
        while !header.is_empty() {
            let dir = read_cstr(&mut header)?;
            if dir.is_empty() {
                break;
            }
            include_dirs.push(dir);
        }
        while !header.is_empty() {
            match read_file_entry(&mut header)? {
                Some(file) => files.push(file),
                None => break,
            }
        }
    }

    let mut opcodes = Vec::new();
    while !program.is_empty() {
        opcodes.push(read_opcode(
            &mut program,
            encoding.address_size,
            opcode_base,
            &standard_opcode_lengths,
        )?);
    }

    Ok(LineTable {
        offset,
        format,
        length: initial.length,
        version,
        address_size,
        segment_selector_size,
        prologue_length,
        min_inst_length,
        max_ops_per_inst,
        default_is_stmt,
        line_base,
        line_range,
        opcode_base,
        standard_opcode_lengths,
        include_dirs,
        files,
        entry_tables,
        opcodes,
    })
}

/// Read a file entry; `None` for the empty name closing the list.
fn read_file_entry<R: Reader>(input: &mut R) -> Result<Option<FileEntry>> {
    let name = read_cstr(input)?;
    if name.is_empty() {
        return Ok(None);
    }
    Ok(Some(FileEntry {
        name,
        dir_index: input.read_uleb128()?,
        mod_time: input.read_uleb128()?,
        length: input.read_uleb128()?,
    }))
}

fn parse_entry_tables<R: Reader>(input: &mut R, encoding: Encoding) -> Result<EntryTables> {
    let directory_formats = read_entry_formats(input)?;
    let directories = read_described_entries(input, &directory_formats, encoding)?;
    let file_formats = read_entry_formats(input)?;
    let files = read_described_entries(input, &file_formats, encoding)?;
    Ok(EntryTables {
        directory_formats,
        directories,
        file_formats,
        files,
    })
}

fn read_entry_formats<R: Reader>(input: &mut R) -> Result<Vec<EntryFormat>> {
    let count = input.read_u8()?;
    let mut formats = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        formats.push(EntryFormat {
            content_type: gimli::DwLnct(input.read_uleb128_u16()?),
            form: gimli::DwForm(input.read_uleb128_u16()?),
        });
    }
    Ok(formats)
}

fn read_described_entries<R: Reader>(
    input: &mut R,
    formats: &[EntryFormat],
    encoding: Encoding,
) -> Result<Vec<Vec<AttributeValue>>> {
    let count = input.read_uleb128()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let mut values = Vec::with_capacity(formats.len());
        for format in formats {
            values.push(read_form_value(input, format.form, None, encoding)?);
        }
        entries.push(values);
    }
    Ok(entries)
}

fn read_opcode<R: Reader>(
    input: &mut R,
    address_size: u8,
    opcode_base: u8,
    standard_opcode_lengths: &[u8],
) -> Result<LineOpcode> {
    let opcode = input.read_u8()?;
    if opcode == 0 {
        read_extended(input, address_size)
    } else if opcode < opcode_base {
        let opcode = gimli::DwLns(opcode);
        let operand = match opcode {
            gimli::DW_LNS_copy
            | gimli::DW_LNS_negate_stmt
            | gimli::DW_LNS_set_basic_block
            | gimli::DW_LNS_const_add_pc
            | gimli::DW_LNS_set_prologue_end
            | gimli::DW_LNS_set_epilogue_begin => StandardOperand::None,
            gimli::DW_LNS_advance_pc
            | gimli::DW_LNS_set_file
            | gimli::DW_LNS_set_column
            | gimli::DW_LNS_set_isa => StandardOperand::Unsigned(input.read_uleb128()?),
            gimli::DW_LNS_advance_line => StandardOperand::Signed(input.read_sleb128()?),
            gimli::DW_LNS_fixed_advance_pc => StandardOperand::Fixed(input.read_u16()?),
            _ => {
                let count = standard_opcode_lengths
                    .get(usize::from(opcode.0) - 1)
                    .copied()
                    .unwrap_or(0);
                let mut operands = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    operands.push(input.read_uleb128()?);
                }
                StandardOperand::Unknown(operands)
            }
        };
        Ok(LineOpcode::Standard { opcode, operand })
    } else {
        Ok(LineOpcode::Special(opcode))
    }
}

fn read_extended<R: Reader>(input: &mut R, address_size: u8) -> Result<LineOpcode> {
    let length = input.read_uleb128()?;
    let mut body = split_len(input, length)?;
    let opcode = gimli::DwLne(body.read_u8()?);
    let operand = match opcode {
        gimli::DW_LNE_end_sequence => ExtendedOperand::None,
        gimli::DW_LNE_set_address => ExtendedOperand::Address(body.read_address(address_size)?),
        // A ULEB128 operand as DWARF defines it, not an address-sized one.
        gimli::DW_LNE_set_discriminator => ExtendedOperand::Unsigned(body.read_uleb128()?),
        gimli::DW_LNE_define_file => match read_file_entry(&mut body)? {
            Some(file) => ExtendedOperand::File(file),
            None => ExtendedOperand::File(FileEntry {
                name: String::new(),
                dir_index: 0,
                mod_time: 0,
                length: 0,
            }),
        },
        _ => ExtendedOperand::Unknown(body.to_slice()?.into_owned()),
    };
    Ok(LineOpcode::Extended {
        length,
        opcode,
        operand,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gimli::{EndianSlice, LittleEndian};

    fn section(bytes: &[u8]) -> EndianSlice<LittleEndian> {
        EndianSlice::new(bytes, LittleEndian)
    }

    /// Header fields after the prologue length, for opcode base 13.
    fn prologue(version: u16) -> Vec<u8> {
        let mut bytes = vec![1];
        if version >= 4 {
            bytes.push(1);
        }
        bytes.extend_from_slice(&[1, 0xfb, 14, 13]);
        bytes.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        bytes.extend_from_slice(b"inc\0\0");
        bytes.extend_from_slice(b"a.c\0\x01\x00\x00\0");
        bytes
    }

    fn program(version: u16, opcodes: &[u8]) -> Vec<u8> {
        program_with(version, prologue(version), opcodes)
    }

    fn program_with(version: u16, prologue: Vec<u8>, opcodes: &[u8]) -> Vec<u8> {
        let length = 2 + 4 + prologue.len() + opcodes.len();
        let mut bytes = (length as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&(prologue.len() as u32).to_le_bytes());
        bytes.extend(prologue);
        bytes.extend_from_slice(opcodes);
        bytes
    }

    #[rustfmt::skip]
    const OPCODES: &[u8] = &[
        0x00, 0x09, 0x02, 0x00, 0x10, 0, 0, 0, 0, 0, 0, // set_address 0x1000
        0x05, 0x03,                                      // set_column 3
        0x03, 0x7f,                                      // advance_line -1
        0x09, 0x10, 0x00,                                // fixed_advance_pc 16
        0x01,                                            // copy
        0x4b,                                            // special
        0x00, 0x03, 0x80, 0xaa, 0xbb,                    // unknown extended
        0x00, 0x01, 0x01,                                // end_sequence
    ];

    #[test]
    fn decodes_header_and_program() {
        let bytes = program(4, OPCODES);
        let table = decode_line_table(&section(&bytes), 0, 8).unwrap();
        assert_eq!(table.version, 4);
        assert_eq!(table.format, gimli::Format::Dwarf32);
        assert_eq!(table.max_ops_per_inst, Some(1));
        assert_eq!(table.line_base, -5);
        assert_eq!(table.line_range, 14);
        assert_eq!(table.opcode_base, 13);
        assert_eq!(table.standard_opcode_lengths.len(), 12);
        assert_eq!(table.include_dirs, vec!["inc"]);
        assert_eq!(
            table.files,
            vec![FileEntry { name: "a.c".into(), dir_index: 1, mod_time: 0, length: 0 }]
        );
        assert_eq!(
            table.opcodes,
            vec![
                LineOpcode::Extended {
                    length: 9,
                    opcode: gimli::DW_LNE_set_address,
                    operand: ExtendedOperand::Address(0x1000),
                },
                LineOpcode::Standard {
                    opcode: gimli::DW_LNS_set_column,
                    operand: StandardOperand::Unsigned(3),
                },
                LineOpcode::Standard {
                    opcode: gimli::DW_LNS_advance_line,
                    operand: StandardOperand::Signed(-1),
                },
                LineOpcode::Standard {
                    opcode: gimli::DW_LNS_fixed_advance_pc,
                    operand: StandardOperand::Fixed(16),
                },
                LineOpcode::Standard {
                    opcode: gimli::DW_LNS_copy,
                    operand: StandardOperand::None,
                },
                LineOpcode::Special(0x4b),
                LineOpcode::Extended {
                    length: 3,
                    opcode: gimli::DwLne(0x80),
                    operand: ExtendedOperand::Unknown(vec![0xaa, 0xbb]),
                },
                LineOpcode::Extended {
                    length: 1,
                    opcode: gimli::DW_LNE_end_sequence,
                    operand: ExtendedOperand::None,
                },
            ]
        );
    }

    #[test]
    fn max_ops_only_from_version_4() {
        let v3 = decode_line_table(&section(&program(3, &[0x01])), 0, 4).unwrap();
        let v4 = decode_line_table(&section(&program(4, &[0x01])), 0, 4).unwrap();
        assert_eq!(v3.max_ops_per_inst, None);
        assert_eq!(v4.max_ops_per_inst, Some(1));
        assert_eq!(v3.opcode_base, v4.opcode_base);
        assert_eq!(v3.include_dirs, v4.include_dirs);
        assert_eq!(v3.files, v4.files);
        assert_eq!(v3.opcodes, v4.opcodes);
    }

    #[test]
    fn max_ops_byte_depends_on_version() {
        let mut header = vec![4, 3, 1, 1, 14, 1];
        header.extend_from_slice(&[0; 16]);
        let v3 = decode_line_table(&section(&program_with(3, header.clone(), &[0x01])), 0, 4)
            .unwrap();
        let v4 = decode_line_table(&section(&program_with(4, header, &[0x01])), 0, 4).unwrap();

        assert_eq!(v4.max_ops_per_inst, Some(3));
        assert_eq!(v4.default_is_stmt, 1);
        assert_eq!(v4.line_range, 14);
        assert_eq!(v4.opcode_base, 1);
        assert!(v4.standard_opcode_lengths.is_empty());
        assert_eq!(v4.opcodes, vec![LineOpcode::Special(1)]);

        assert_eq!(v3.max_ops_per_inst, None);
        assert_eq!(v3.min_inst_length, 4);
        assert_eq!(v3.default_is_stmt, 3);
        assert_eq!(v3.line_base, 1);
        assert_eq!(v3.line_range, 1);
        assert_eq!(v3.opcode_base, 14);
        assert_eq!(v3.standard_opcode_lengths.len(), 13);
        assert_eq!(
            v3.opcodes,
            vec![LineOpcode::Standard {
                opcode: gimli::DW_LNS_copy,
                operand: StandardOperand::None,
            }]
        );
    }

    #[rustfmt::skip]
    #[test]
    fn define_file_and_discriminator_operands() {
        let opcodes = [
            0x00, 0x02, 0x04, 0x05,                               // set_discriminator 5
            0x00, 0x03, 0x04, 0x81, 0x01,                         // set_discriminator 129
            0x00, 0x08, 0x03, b'b', b'.', b'c', 0, 0x01, 0x02, 0x03, // define_file
        ];
        let table = decode_line_table(&section(&program(4, &opcodes)), 0, 8).unwrap();
        assert_eq!(
            table.opcodes,
            vec![
                LineOpcode::Extended {
                    length: 2,
                    opcode: gimli::DW_LNE_set_discriminator,
                    operand: ExtendedOperand::Unsigned(5),
                },
                LineOpcode::Extended {
                    length: 3,
                    opcode: gimli::DW_LNE_set_discriminator,
                    operand: ExtendedOperand::Unsigned(129),
                },
                LineOpcode::Extended {
                    length: 8,
                    opcode: gimli::DW_LNE_define_file,
                    operand: ExtendedOperand::File(FileEntry {
                        name: "b.c".into(),
                        dir_index: 1,
                        mod_time: 2,
                        length: 3,
                    }),
                },
            ]
        );
    }

    #[test]
    fn dwarf64_program_is_bounded_by_its_length() {
        let prologue = prologue(4);
        let length = 2 + 8 + prologue.len() + OPCODES.len();
        let mut bytes = vec![0xff; 4];
        bytes.extend_from_slice(&(length as u64).to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&(prologue.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&prologue);
        bytes.extend_from_slice(OPCODES);
        let second = bytes.len() as u64;
        bytes.extend(program(2, &[0x01]));

        let (tables, diagnostics) =
            decode_line_tables(&section(&bytes), vec![(0, 8), (second, 8)]);
        assert!(diagnostics.is_empty());
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].format, gimli::Format::Dwarf64);
        assert_eq!(tables[0].length, length as u64);
        assert_eq!(tables[0].prologue_length, prologue.len() as u64);
        assert_eq!(tables[0].files.len(), 1);
        assert_eq!(tables[0].opcodes.len(), 8);
        assert_eq!(tables[1].offset, second);
        assert_eq!(tables[1].version, 2);
        assert_eq!(tables[1].opcodes.len(), 1);
    }

    #[test]
    fn unknown_standard_opcode_uses_length_table() {
        // opcode base 14 declares a 13th standard opcode with two operands.
        let mut prologue = vec![1, 1, 1, 0xfb, 14, 14];
        prologue.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1, 2]);
        prologue.extend_from_slice(&[0, 0]);
        let opcodes = [0x0d, 0x05, 0x81, 0x01];
        let length = 2 + 4 + prologue.len() + opcodes.len();
        let mut bytes = (length as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&(prologue.len() as u32).to_le_bytes());
        bytes.extend(prologue);
        bytes.extend_from_slice(&opcodes);

        let table = decode_line_table(&section(&bytes), 0, 8).unwrap();
        assert_eq!(
            table.opcodes,
            vec![LineOpcode::Standard {
                opcode: gimli::DwLns(0x0d),
                operand: StandardOperand::Unknown(vec![5, 0x81]),
            }]
        );
    }

    #[test]
    fn failing_program_is_skipped() {
        let mut bytes = program(4, OPCODES);
        let good_offset = 0;
        let bad_offset = bytes.len() as u64;
        bytes.extend_from_slice(&[0x40, 0, 0, 0, 4, 0]);
        let (tables, diagnostics) =
            decode_line_tables(&section(&bytes), vec![(good_offset, 8), (bad_offset, 8)]);
        assert_eq!(tables.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].section, ".debug_line");
        assert_eq!(diagnostics[0].offset, bad_offset);
    }

    #[rustfmt::skip]
    #[test]
    fn dwarf5_entry_tables() {
        let mut header = vec![1, 1, 1, 0xfb, 14, 13];
        header.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        header.extend_from_slice(&[
            1, 0x01, 0x08,              // directory format: path, string
            1, b'/', 0,                 // one directory
            2, 0x01, 0x08, 0x02, 0x0b,  // file format: path string, directory index data1
            1, b'm', b'.', b'c', 0, 0,  // one file
        ]);
        let opcodes = [0x01];
        let length = 2 + 2 + 4 + header.len() + opcodes.len();
        let mut bytes = (length as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&5u16.to_le_bytes());
        bytes.extend_from_slice(&[8, 0]);
        bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
        bytes.extend(header);
        bytes.extend_from_slice(&opcodes);

        let table = decode_line_table(&section(&bytes), 0, 4).unwrap();
        assert_eq!(table.address_size, Some(8));
        assert_eq!(table.segment_selector_size, Some(0));
        assert!(table.include_dirs.is_empty());
        let tables = table.entry_tables.unwrap();
        assert_eq!(tables.directories, vec![vec![AttributeValue::String("/".into())]]);
        assert_eq!(tables.file_formats[1].content_type, gimli::DW_LNCT_directory_index);
        assert_eq!(
            tables.files,
            vec![vec![AttributeValue::String("m.c".into()), AttributeValue::Unsigned(0)]]
        );
    }
}
