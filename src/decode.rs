use crate::abbrev::decode_abbrev;
use crate::aranges::decode_aranges;
use crate::error::Result;
use crate::info::{decode_info, unit_address_sizes};
use crate::line::decode_line_tables;
use crate::model::DwarfData;
use crate::pubnames::decode_pub_section;
use crate::ranges::decode_ranges;
use crate::reader::Reader;
use crate::sections::{
    Sections, DEBUG_GNU_PUBNAMES, DEBUG_GNU_PUBTYPES, DEBUG_PUBNAMES, DEBUG_PUBTYPES,
};
use crate::strings::split_strings;

/// Decode every supported section of an object into one model.
///
/// `.debug_aranges` and `.debug_ranges` failures abort the decode. Every
/// other failure leaves the affected table short and adds a diagnostic.
pub fn decode<R: Reader>(sections: &Sections<R>) -> Result<DwarfData> {
    let mut data = DwarfData::default();

    let (abbrev_sets, diagnostic) = decode_abbrev(&sections.debug_abbrev);
    data.abbrev_sets = abbrev_sets;
    data.diagnostics.extend(diagnostic);

    data.strings = split_strings(&sections.debug_str)?;
    data.aranges = decode_aranges(&sections.debug_aranges)?;
    data.ranges = decode_ranges(
        &sections.debug_ranges,
        unit_address_sizes(&sections.debug_info),
        sections.address_size,
    )?;

    let pub_sections = [
        (DEBUG_PUBNAMES, &sections.debug_pubnames, false, &mut data.pubnames),
        (DEBUG_PUBTYPES, &sections.debug_pubtypes, false, &mut data.pubtypes),
        (DEBUG_GNU_PUBNAMES, &sections.debug_gnu_pubnames, true, &mut data.gnu_pubnames),
        (DEBUG_GNU_PUBTYPES, &sections.debug_gnu_pubtypes, true, &mut data.gnu_pubtypes),
    ];
    for (name, section, gnu_style, out) in pub_sections {
        let (sets, diagnostic) = decode_pub_section(name, section, gnu_style);
        *out = sets;
        data.diagnostics.extend(diagnostic);
    }

    let info = decode_info(&sections.debug_info, &sections.debug_abbrev, &data.abbrev_sets);
    data.diagnostics.extend(info.diagnostics);
    // Sets only reachable through a unit's abbreviation offset.
    data.abbrev_sets.extend(info.abbrev_sets);
    let programs: Vec<(u64, u8)> = info
        .units
        .iter()
        .zip(&info.stmt_lists)
        .filter_map(|(unit, stmt_list)| stmt_list.map(|offset| (offset, unit.address_size)))
        .collect();
    data.units = info.units;

    let (line_tables, diagnostics) = decode_line_tables(&sections.debug_line, programs);
    data.line_tables = line_tables;
    data.diagnostics.extend(diagnostics);

    Ok(data)
}
