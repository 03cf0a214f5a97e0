//! Render a decoded [`DwarfData`] as an indented YAML-style document.

use std::borrow::Cow;
use std::cmp::min;
use std::io::Write;
use std::mem;
use std::sync::{Condvar, Mutex};

use regex::bytes::Regex;

use crate::error::{Error, Result};
use crate::model::{
    AbbreviationDeclaration, AbbreviationSet, ARangeSet, AttributeValue, CompileUnit,
    DwarfData, EntryFormat, ExtendedOperand, FileEntry, LineOpcode, LineTable, PubSection,
    RangeList, StandardOperand, UnitExtra,
};

/// Which tables to write, and how.
#[derive(Debug, Default, Clone)]
pub struct Flags {
    pub abbrev: bool,
    pub strings: bool,
    pub info: bool,
    pub line: bool,
    pub pubnames: bool,
    pub pubtypes: bool,
    pub aranges: bool,
    pub ranges: bool,
    /// Show the `.debug_info` offset of every unit and DIE.
    pub goff: bool,
    /// Only keep compile units whose rendered text matches.
    pub match_units: Option<Regex>,
}

impl Flags {
    /// Every table selected, no cosmetic options.
    pub fn all() -> Self {
        Flags {
            abbrev: true,
            strings: true,
            info: true,
            line: true,
            pubnames: true,
            pubtypes: true,
            aranges: true,
            ranges: true,
            ..Flags::default()
        }
    }
}

// Constants gimli has no name for are written as hex.
macro_rules! name_or_hex {
    ($value:expr) => {
        match $value.static_string() {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("0x{:x}", $value.0)),
        }
    };
}

fn parallel_output<W, II, F>(w: &mut W, max_workers: usize, iter: II, f: F) -> Result<()>
where
    W: Write + Send,
    F: Sync + Fn(II::Item, &mut Vec<u8>) -> Result<()>,
    II: IntoIterator,
    II::IntoIter: Send,
{
    struct ParallelOutputState<I, W> {
        iterator: I,
        current_worker: usize,
        result: Result<()>,
        w: W,
    }

    let state = Mutex::new(ParallelOutputState {
        iterator: iter.into_iter().fuse(),
        current_worker: 0,
        result: Ok(()),
        w,
    });
    let workers = min(max_workers, num_cpus::get()).max(1);
    let condvars: Vec<Condvar> = (0..workers).map(|_| Condvar::new()).collect();
    {
        let state_ref = &state;
        let f_ref = &f;
        let condvars_ref = &condvars;
        crossbeam::scope(|scope| {
            for i in 0..workers {
                scope.spawn(move |_| {
                    let mut v = Vec::new();
                    let mut lock = state_ref.lock().unwrap();
                    while lock.current_worker != i {
                        lock = condvars_ref[i].wait(lock).unwrap();
                    }
                    loop {
                        let item = if lock.result.is_ok() {
                            lock.iterator.next()
                        } else {
                            None
                        };
                        lock.current_worker = (i + 1) % workers;
                        condvars_ref[lock.current_worker].notify_one();
                        mem::drop(lock);

                        let ret = match item {
                            Some(item) => {
                                v.clear();
                                f_ref(item, &mut v)
                            }
                            None => return,
                        };

                        lock = state_ref.lock().unwrap();
                        while lock.current_worker != i {
                            lock = condvars_ref[i].wait(lock).unwrap();
                        }
                        if lock.result.is_ok() {
                            let written = lock.w.write_all(&v);
                            lock.result = ret.and(written.map_err(Error::from));
                        }
                    }
                });
            }
        })
        .unwrap();
    }
    state.into_inner().unwrap().result
}

/// Write the tables selected by `flags`, followed by any diagnostics.
///
/// Empty tables are left out.
pub fn dump<W: Write + Send>(w: &mut W, data: &DwarfData, flags: &Flags) -> Result<()> {
    if flags.strings && !data.strings.is_empty() {
        writeln!(w, "debug_str:")?;
        for s in &data.strings {
            writeln!(w, "  - {}", quoted(s))?;
        }
    }
    if flags.abbrev && !data.abbrev_sets.is_empty() {
        writeln!(w, "debug_abbrev:")?;
        for set in &data.abbrev_sets {
            dump_abbrev_set(w, set)?;
        }
    }
    if flags.aranges && !data.aranges.is_empty() {
        writeln!(w, "debug_aranges:")?;
        for set in &data.aranges {
            dump_arange_set(w, set)?;
        }
    }
    if flags.ranges && !data.ranges.is_empty() {
        writeln!(w, "debug_ranges:")?;
        for list in &data.ranges {
            dump_range_list(w, list)?;
        }
    }
    if flags.pubnames {
        dump_pub_sections(w, "debug_pubnames", &data.pubnames)?;
        dump_pub_sections(w, "debug_gnu_pubnames", &data.gnu_pubnames)?;
    }
    if flags.pubtypes {
        dump_pub_sections(w, "debug_pubtypes", &data.pubtypes)?;
        dump_pub_sections(w, "debug_gnu_pubtypes", &data.gnu_pubtypes)?;
    }
    if flags.info && !data.units.is_empty() {
        dump_info(w, data, flags)?;
    }
    if flags.line && !data.line_tables.is_empty() {
        writeln!(w, "debug_line:")?;
        for table in &data.line_tables {
            dump_line_table(w, table)?;
        }
    }
    if !data.diagnostics.is_empty() {
        writeln!(w, "diagnostics:")?;
        for diagnostic in &data.diagnostics {
            writeln!(w, "  - section: {}", diagnostic.section)?;
            writeln!(w, "    offset:  0x{:08x}", diagnostic.offset)?;
            writeln!(w, "    error:   {}", quoted(&diagnostic.error.to_string()))?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Quote `s` as a YAML scalar.
///
/// Single quotes are used unless `s` holds control characters, which only
/// survive inside a double-quoted scalar as escapes.
fn quoted(s: &str) -> String {
    if !s.chars().any(char::is_control) {
        return format!("'{}'", s.replace('\'', "''"));
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn format_name(format: gimli::Format) -> &'static str {
    match format {
        gimli::Format::Dwarf32 => "DWARF32",
        gimli::Format::Dwarf64 => "DWARF64",
    }
}

fn dump_abbrev_set<W: Write>(w: &mut W, set: &AbbreviationSet) -> Result<()> {
    writeln!(w, "  - offset: 0x{:08x}", set.offset)?;
    writeln!(w, "    table:")?;
    for decl in &set.declarations {
        dump_abbrev_declaration(w, decl)?;
    }
    Ok(())
}

fn dump_abbrev_declaration<W: Write>(w: &mut W, decl: &AbbreviationDeclaration) -> Result<()> {
    writeln!(w, "      - code:     0x{:x}", decl.code)?;
    writeln!(w, "        tag:      {}", name_or_hex!(decl.tag))?;
    writeln!(w, "        children: {}", name_or_hex!(decl.children))?;
    if decl.attributes.is_empty() {
        return Ok(());
    }
    writeln!(w, "        attributes:")?;
    for spec in &decl.attributes {
        writeln!(w, "          - attribute: {}", name_or_hex!(spec.name))?;
        writeln!(w, "            form:      {}", name_or_hex!(spec.form))?;
        if let Some(value) = spec.implicit_const {
            writeln!(w, "            value:     {}", value)?;
        }
    }
    Ok(())
}

fn dump_arange_set<W: Write>(w: &mut W, set: &ARangeSet) -> Result<()> {
    writeln!(w, "  - format:       {}", format_name(set.format))?;
    writeln!(w, "    length:       0x{:x}", set.length)?;
    writeln!(w, "    version:      {}", set.version)?;
    writeln!(w, "    cu_offset:    0x{:08x}", set.cu_offset)?;
    writeln!(w, "    address_size: {}", set.address_size)?;
    writeln!(w, "    segment_size: {}", set.segment_size)?;
    if set.descriptors.is_empty() {
        return Ok(());
    }
    writeln!(w, "    descriptors:")?;
    for desc in &set.descriptors {
        if let Some(segment) = desc.segment {
            writeln!(w, "      - segment: 0x{:x}", segment)?;
            writeln!(w, "        address: 0x{:016x}", desc.address)?;
        } else {
            writeln!(w, "      - address: 0x{:016x}", desc.address)?;
        }
        writeln!(w, "        length:  0x{:x}", desc.length)?;
    }
    Ok(())
}

fn dump_range_list<W: Write>(w: &mut W, list: &RangeList) -> Result<()> {
    writeln!(w, "  - offset:       0x{:08x}", list.offset)?;
    writeln!(w, "    address_size: {}", list.address_size)?;
    writeln!(w, "    entries:")?;
    for entry in &list.entries {
        writeln!(w, "      - low:  0x{:016x}", entry.start)?;
        writeln!(w, "        high: 0x{:016x}", entry.end)?;
    }
    Ok(())
}

fn dump_pub_sections<W: Write>(w: &mut W, key: &str, sets: &[PubSection]) -> Result<()> {
    if sets.is_empty() {
        return Ok(());
    }
    writeln!(w, "{}:", key)?;
    for set in sets {
        writeln!(w, "  - format:      {}", format_name(set.format))?;
        writeln!(w, "    length:      0x{:x}", set.length)?;
        writeln!(w, "    version:     {}", set.version)?;
        writeln!(w, "    unit_offset: 0x{:08x}", set.unit_offset)?;
        writeln!(w, "    unit_size:   0x{:x}", set.unit_size)?;
        if set.entries.is_empty() {
            continue;
        }
        writeln!(w, "    entries:")?;
        for entry in &set.entries {
            writeln!(w, "      - die_offset: 0x{:08x}", entry.die_offset)?;
            if let Some(descriptor) = entry.descriptor {
                writeln!(w, "        descriptor: 0x{:02x}", descriptor)?;
            }
            writeln!(w, "        name:       {}", quoted(&entry.name))?;
        }
    }
    Ok(())
}

fn dump_info<W: Write + Send>(w: &mut W, data: &DwarfData, flags: &Flags) -> Result<()> {
    writeln!(w, "debug_info:")?;
    let process_unit = |unit: &CompileUnit, buf: &mut Vec<u8>| -> Result<()> {
        dump_unit(buf, unit, data.abbrev_set(unit.abbr_offset), flags)?;
        if !flags
            .match_units
            .as_ref()
            .map(|r| r.is_match(buf))
            .unwrap_or(true)
        {
            buf.clear();
        }
        Ok(())
    };
    // Don't use more than 16 cores even if available.
    parallel_output(w, 16, &data.units, process_unit)
}

fn dump_unit<W: Write>(
    w: &mut W,
    unit: &CompileUnit,
    abbrevs: Option<&AbbreviationSet>,
    flags: &Flags,
) -> Result<()> {
    writeln!(w, "  - format:       {}", format_name(unit.format))?;
    if flags.goff {
        writeln!(w, "    offset:       0x{:08x}", unit.offset)?;
    }
    writeln!(w, "    length:       0x{:x}", unit.length)?;
    writeln!(w, "    version:      {}", unit.version)?;
    if let Some(unit_type) = unit.unit_type {
        writeln!(w, "    unit_type:    {}", name_or_hex!(unit_type))?;
    }
    writeln!(w, "    abbr_offset:  0x{:x}", unit.abbr_offset)?;
    writeln!(w, "    address_size: {}", unit.address_size)?;
    match unit.extra {
        UnitExtra::None => (),
        UnitExtra::DwoId(dwo_id) => writeln!(w, "    dwo_id:       0x{:016x}", dwo_id)?,
        UnitExtra::Type {
            signature,
            type_offset,
        } => {
            writeln!(w, "    signature:    0x{:016x}", signature)?;
            writeln!(w, "    type_offset:  0x{:x}", type_offset)?;
        }
    }
    if unit.entries.is_empty() {
        return Ok(());
    }

    writeln!(w, "    entries:")?;
    for entry in &unit.entries {
        writeln!(w, "      - abbr_code: 0x{:x}", entry.abbr_code)?;
        if flags.goff {
            writeln!(w, "        offset:    0x{:08x}", entry.offset)?;
        }
        let decl = abbrevs.and_then(|set| set.get(entry.abbr_code));
        if let Some(decl) = decl {
            writeln!(w, "        tag:       {}", name_or_hex!(decl.tag))?;
        }
        if entry.values.is_empty() {
            continue;
        }
        writeln!(w, "        values:")?;
        for (i, value) in entry.values.iter().enumerate() {
            match decl.and_then(|decl| decl.attributes.get(i)) {
                Some(spec) => write!(w, "          - {}: ", name_or_hex!(spec.name))?,
                None => write!(w, "          - value: ")?,
            }
            write_value(w, value)?;
            writeln!(w)?;
        }
    }
    Ok(())
}

fn write_value<W: Write>(w: &mut W, value: &AttributeValue) -> Result<()> {
    match value {
        AttributeValue::Unsigned(value) => write!(w, "0x{:x}", value)?,
        AttributeValue::String(s) => write!(w, "{}", quoted(s))?,
        AttributeValue::Block(data) => {
            write!(w, "[")?;
            for (i, byte) in data.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                write!(w, "{}0x{:02x}", sep, byte)?;
            }
            write!(w, "{}]", if data.is_empty() { "" } else { " " })?;
        }
        AttributeValue::Indirect { form, value } => {
            write!(w, "{{ form: {}, value: ", name_or_hex!(*form))?;
            write_value(w, value)?;
            write!(w, " }}")?;
        }
    }
    Ok(())
}

fn dump_line_table<W: Write>(w: &mut W, table: &LineTable) -> Result<()> {
    writeln!(w, "  - offset:                  0x{:08x}", table.offset)?;
    writeln!(w, "    format:                  {}", format_name(table.format))?;
    writeln!(w, "    length:                  0x{:x}", table.length)?;
    writeln!(w, "    version:                 {}", table.version)?;
    if let Some(address_size) = table.address_size {
        writeln!(w, "    address_size:            {}", address_size)?;
    }
    if let Some(size) = table.segment_selector_size {
        writeln!(w, "    segment_selector_size:   {}", size)?;
    }
    writeln!(w, "    prologue_length:         0x{:x}", table.prologue_length)?;
    writeln!(w, "    min_inst_length:         {}", table.min_inst_length)?;
    if let Some(max_ops) = table.max_ops_per_inst {
        writeln!(w, "    max_ops_per_inst:        {}", max_ops)?;
    }
    writeln!(w, "    default_is_stmt:         {}", table.default_is_stmt)?;
    writeln!(w, "    line_base:               {}", table.line_base)?;
    writeln!(w, "    line_range:              {}", table.line_range)?;
    writeln!(w, "    opcode_base:             {}", table.opcode_base)?;
    let lengths: Vec<String> = table
        .standard_opcode_lengths
        .iter()
        .map(u8::to_string)
        .collect();
    writeln!(w, "    standard_opcode_lengths: [ {} ]", lengths.join(", "))?;

    if !table.include_dirs.is_empty() {
        writeln!(w, "    include_dirs:")?;
        for dir in &table.include_dirs {
            writeln!(w, "      - {}", quoted(dir))?;
        }
    }
    if !table.files.is_empty() {
        writeln!(w, "    files:")?;
        for file in &table.files {
            dump_file_entry(w, "      ", file)?;
        }
    }
    if let Some(tables) = &table.entry_tables {
        dump_entry_table(w, "directories", &tables.directory_formats, &tables.directories)?;
        dump_entry_table(w, "file_names", &tables.file_formats, &tables.files)?;
    }

    if table.opcodes.is_empty() {
        return Ok(());
    }
    writeln!(w, "    opcodes:")?;
    for op in &table.opcodes {
        dump_line_opcode(w, op)?;
    }
    Ok(())
}

fn dump_file_entry<W: Write>(w: &mut W, indent: &str, file: &FileEntry) -> Result<()> {
    writeln!(w, "{}- name:     {}", indent, quoted(&file.name))?;
    writeln!(w, "{}  dir_idx:  {}", indent, file.dir_index)?;
    writeln!(w, "{}  mod_time: {}", indent, file.mod_time)?;
    writeln!(w, "{}  length:   {}", indent, file.length)?;
    Ok(())
}

fn dump_entry_table<W: Write>(
    w: &mut W,
    key: &str,
    formats: &[EntryFormat],
    entries: &[Vec<AttributeValue>],
) -> Result<()> {
    writeln!(w, "    {}:", key)?;
    for entry in entries {
        let mut first = true;
        for (format, value) in formats.iter().zip(entry) {
            let lead = if first { "      - " } else { "        " };
            first = false;
            write!(w, "{}{}: ", lead, name_or_hex!(format.content_type))?;
            write_value(w, value)?;
            writeln!(w)?;
        }
    }
    Ok(())
}

fn dump_line_opcode<W: Write>(w: &mut W, op: &LineOpcode) -> Result<()> {
    match op {
        LineOpcode::Extended {
            length,
            opcode,
            operand,
        } => {
            writeln!(w, "      - opcode:     DW_LNS_extended_op")?;
            writeln!(w, "        ext_len:    {}", length)?;
            writeln!(w, "        sub_opcode: {}", name_or_hex!(*opcode))?;
            match operand {
                ExtendedOperand::None => (),
                ExtendedOperand::Address(address) => {
                    writeln!(w, "        data:       0x{:x}", address)?
                }
                ExtendedOperand::Unsigned(value) => writeln!(w, "        data:       {}", value)?,
                ExtendedOperand::File(file) => {
                    writeln!(w, "        file_entry:")?;
                    dump_file_entry(w, "          ", file)?;
                }
                ExtendedOperand::Unknown(bytes) => {
                    write!(w, "        unknown:    ")?;
                    write_value(w, &AttributeValue::Block(bytes.clone()))?;
                    writeln!(w)?;
                }
            }
        }
        LineOpcode::Standard { opcode, operand } => {
            writeln!(w, "      - opcode:     {}", name_or_hex!(*opcode))?;
            match operand {
                StandardOperand::None => (),
                StandardOperand::Unsigned(value) => writeln!(w, "        data:       {}", value)?,
                StandardOperand::Signed(value) => writeln!(w, "        sdata:      {}", value)?,
                StandardOperand::Fixed(value) => writeln!(w, "        data:       {}", value)?,
                StandardOperand::Unknown(values) => {
                    let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                    writeln!(w, "        operands:   [ {} ]", values.join(", "))?;
                }
            }
        }
        LineOpcode::Special(opcode) => {
            writeln!(w, "      - opcode:     0x{:02x}", opcode)?;
        }
    }
    Ok(())
}
