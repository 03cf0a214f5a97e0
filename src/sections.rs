//! The named byte ranges the decoder reads from.

pub const DEBUG_ABBREV: &str = ".debug_abbrev";
pub const DEBUG_INFO: &str = ".debug_info";
pub const DEBUG_STR: &str = ".debug_str";
pub const DEBUG_ARANGES: &str = ".debug_aranges";
pub const DEBUG_RANGES: &str = ".debug_ranges";
pub const DEBUG_LINE: &str = ".debug_line";
pub const DEBUG_PUBNAMES: &str = ".debug_pubnames";
pub const DEBUG_PUBTYPES: &str = ".debug_pubtypes";
pub const DEBUG_GNU_PUBNAMES: &str = ".debug_gnu_pubnames";
pub const DEBUG_GNU_PUBTYPES: &str = ".debug_gnu_pubtypes";

/// Every section name `Sections::load` asks for.
pub const SECTION_NAMES: [&str; 10] = [
    DEBUG_ABBREV,
    DEBUG_INFO,
    DEBUG_STR,
    DEBUG_ARANGES,
    DEBUG_RANGES,
    DEBUG_LINE,
    DEBUG_PUBNAMES,
    DEBUG_PUBTYPES,
    DEBUG_GNU_PUBNAMES,
    DEBUG_GNU_PUBTYPES,
];

/// The DWARF sections of one object.
///
/// `T` is whatever holds the bytes: typically a `Cow<[u8]>` while loading
/// and a `gimli::EndianSlice` once borrowed for decoding. A missing section
/// is represented by an empty one.
#[derive(Debug, Default, Clone)]
pub struct Sections<T> {
    pub debug_abbrev: T,
    pub debug_info: T,
    pub debug_str: T,
    pub debug_aranges: T,
    pub debug_ranges: T,
    pub debug_line: T,
    pub debug_pubnames: T,
    pub debug_pubtypes: T,
    pub debug_gnu_pubnames: T,
    pub debug_gnu_pubtypes: T,
    /// Address size used when no compile unit states one.
    pub address_size: u8,
}

impl<T> Sections<T> {
    /// Load every section by name.
    pub fn load<F, E>(mut section: F, address_size: u8) -> Result<Self, E>
    where
        F: FnMut(&'static str) -> Result<T, E>,
    {
        Ok(Sections {
            debug_abbrev: section(DEBUG_ABBREV)?,
            debug_info: section(DEBUG_INFO)?,
            debug_str: section(DEBUG_STR)?,
            debug_aranges: section(DEBUG_ARANGES)?,
            debug_ranges: section(DEBUG_RANGES)?,
            debug_line: section(DEBUG_LINE)?,
            debug_pubnames: section(DEBUG_PUBNAMES)?,
            debug_pubtypes: section(DEBUG_PUBTYPES)?,
            debug_gnu_pubnames: section(DEBUG_GNU_PUBNAMES)?,
            debug_gnu_pubtypes: section(DEBUG_GNU_PUBTYPES)?,
            address_size,
        })
    }

    /// Create readers borrowing from the loaded sections.
    pub fn borrow<'a, F, R>(&'a self, mut borrow: F) -> Sections<R>
    where
        F: FnMut(&'a T) -> R,
    {
        Sections {
            debug_abbrev: borrow(&self.debug_abbrev),
            debug_info: borrow(&self.debug_info),
            debug_str: borrow(&self.debug_str),
            debug_aranges: borrow(&self.debug_aranges),
            debug_ranges: borrow(&self.debug_ranges),
            debug_line: borrow(&self.debug_line),
            debug_pubnames: borrow(&self.debug_pubnames),
            debug_pubtypes: borrow(&self.debug_pubtypes),
            debug_gnu_pubnames: borrow(&self.debug_gnu_pubnames),
            debug_gnu_pubtypes: borrow(&self.debug_gnu_pubtypes),
            address_size: self.address_size,
        }
    }
}
