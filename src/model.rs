//! The decoded form of the DWARF sections.
//!
//! Nothing here points at anything else: references between records are the
//! raw offsets found in the sections.

use crate::error::Diagnostic;

/// Everything decoded from one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DwarfData {
    pub abbrev_sets: Vec<AbbreviationSet>,
    pub strings: Vec<String>,
    pub aranges: Vec<ARangeSet>,
    pub ranges: Vec<RangeList>,
    pub pubnames: Vec<PubSection>,
    pub pubtypes: Vec<PubSection>,
    pub gnu_pubnames: Vec<PubSection>,
    pub gnu_pubtypes: Vec<PubSection>,
    pub units: Vec<CompileUnit>,
    pub line_tables: Vec<LineTable>,
    /// Failures that cut a table short without aborting the decode.
    pub diagnostics: Vec<Diagnostic>,
}

impl DwarfData {
    /// Find the abbreviation set a compile unit refers to.
    pub fn abbrev_set(&self, offset: u64) -> Option<&AbbreviationSet> {
        self.abbrev_sets.iter().find(|set| set.offset == offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbbreviationSet {
    /// Offset of the set within `.debug_abbrev`.
    pub offset: u64,
    pub declarations: Vec<AbbreviationDeclaration>,
}

impl AbbreviationSet {
    pub fn get(&self, code: u64) -> Option<&AbbreviationDeclaration> {
        self.declarations.iter().find(|decl| decl.code == code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbbreviationDeclaration {
    pub code: u64,
    pub tag: gimli::DwTag,
    pub children: gimli::DwChildren,
    pub attributes: Vec<AttributeSpec>,
}

impl AbbreviationDeclaration {
    pub fn has_children(&self) -> bool {
        self.children == gimli::DW_CHILDREN_yes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec {
    pub name: gimli::DwAt,
    pub form: gimli::DwForm,
    /// Only present for `DW_FORM_implicit_const`.
    pub implicit_const: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileUnit {
    /// Offset of the unit header within `.debug_info`.
    pub offset: u64,
    pub format: gimli::Format,
    pub length: u64,
    pub version: u16,
    /// Only read for DWARF 5 and later.
    pub unit_type: Option<gimli::DwUt>,
    pub abbr_offset: u64,
    pub address_size: u8,
    pub extra: UnitExtra,
    /// Every DIE in pre-order, null entries included.
    pub entries: Vec<Entry>,
}

/// Header fields that only some DWARF 5 unit types carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitExtra {
    None,
    /// Skeleton and split compilation units.
    DwoId(u64),
    /// Type and split type units.
    Type { signature: u64, type_offset: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Offset of the DIE within `.debug_info`.
    pub offset: u64,
    /// Zero for the null entry closing a sibling chain.
    pub abbr_code: u64,
    /// One value per attribute spec of the declaration, in order.
    pub values: Vec<AttributeValue>,
}

impl Entry {
    pub fn is_null(&self) -> bool {
        self.abbr_code == 0
    }
}

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Addresses, references, constants, flags and section offsets.
    Unsigned(u64),
    /// `DW_FORM_string`.
    String(String),
    /// Expression locations, blocks and `DW_FORM_data16`.
    Block(Vec<u8>),
    /// A value encoded through `DW_FORM_indirect`; `form` is the form read
    /// from the entry and `value` what that form decoded to.
    Indirect {
        form: gimli::DwForm,
        value: Box<AttributeValue>,
    },
}

impl AttributeValue {
    /// The value with any `DW_FORM_indirect` wrapping removed.
    pub fn resolved(&self) -> &AttributeValue {
        let mut value = self;
        while let AttributeValue::Indirect { value: inner, .. } = value {
            value = inner;
        }
        value
    }

    /// The scalar for this value. Blocks report their length.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self.resolved() {
            AttributeValue::Unsigned(value) => Some(*value),
            AttributeValue::Block(data) => Some(data.len() as u64),
            AttributeValue::String(_) | AttributeValue::Indirect { .. } => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.resolved() {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ARangeSet {
    pub offset: u64,
    pub format: gimli::Format,
    pub length: u64,
    pub version: u16,
    /// Offset of the compile unit in `.debug_info`.
    pub cu_offset: u64,
    pub address_size: u8,
    pub segment_size: u8,
    pub descriptors: Vec<ARangeDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ARangeDescriptor {
    /// Only present when the set's segment size is non-zero.
    pub segment: Option<u64>,
    pub address: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeList {
    /// Offset of the list within `.debug_ranges`.
    pub offset: u64,
    pub address_size: u8,
    pub entries: Vec<RangeEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeEntry {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSection {
    pub offset: u64,
    pub format: gimli::Format,
    pub length: u64,
    pub version: u16,
    pub unit_offset: u64,
    pub unit_size: u64,
    pub entries: Vec<PubEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubEntry {
    pub die_offset: u64,
    /// GNU-style sections only.
    pub descriptor: Option<u8>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTable {
    /// Offset of the program within `.debug_line`.
    pub offset: u64,
    pub format: gimli::Format,
    pub length: u64,
    pub version: u16,
    /// DWARF 5 only.
    pub address_size: Option<u8>,
    /// DWARF 5 only.
    pub segment_selector_size: Option<u8>,
    pub prologue_length: u64,
    pub min_inst_length: u8,
    /// DWARF 4 and later.
    pub max_ops_per_inst: Option<u8>,
    pub default_is_stmt: u8,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    pub standard_opcode_lengths: Vec<u8>,
    pub include_dirs: Vec<String>,
    pub files: Vec<FileEntry>,
    /// The self-describing directory and file tables of DWARF 5.
    pub entry_tables: Option<EntryTables>,
    pub opcodes: Vec<LineOpcode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub dir_index: u64,
    pub mod_time: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryTables {
    pub directory_formats: Vec<EntryFormat>,
    pub directories: Vec<Vec<AttributeValue>>,
    pub file_formats: Vec<EntryFormat>,
    pub files: Vec<Vec<AttributeValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryFormat {
    pub content_type: gimli::DwLnct,
    pub form: gimli::DwForm,
}

/// One instruction of a line-number program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOpcode {
    Extended {
        /// Length of the sub-opcode and its operand, as encoded.
        length: u64,
        opcode: gimli::DwLne,
        operand: ExtendedOperand,
    },
    Standard {
        opcode: gimli::DwLns,
        operand: StandardOperand,
    },
    /// The opcode byte; its effect follows from the header's line base,
    /// line range and opcode base.
    Special(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedOperand {
    None,
    Address(u64),
    Unsigned(u64),
    File(FileEntry),
    /// Body of a sub-opcode this decoder does not know.
    Unknown(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandardOperand {
    None,
    Unsigned(u64),
    Signed(i64),
    Fixed(u16),
    /// Operands of a standard opcode outside the known set, as counted by
    /// the header's standard opcode lengths.
    Unknown(Vec<u64>),
}
