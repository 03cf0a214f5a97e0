//! `.debug_aranges` decoding.

use fallible_iterator::FallibleIterator;

use crate::error::{Context, Error, Result};
use crate::model::{ARangeDescriptor, ARangeSet};
use crate::reader::{position, read_offset, InitialLength, Reader};
use crate::sections::DEBUG_ARANGES;

/// Iterator over the address range sets of `.debug_aranges`.
///
/// A set that cannot be read ends the iteration with an error.
#[derive(Debug, Clone)]
pub struct ARangeSets<R: Reader> {
    section: R,
    input: R,
}

impl<R: Reader> ARangeSets<R> {
    pub fn new(section: R) -> Self {
        ARangeSets {
            input: section.clone(),
            section,
        }
    }
}

impl<R: Reader> FallibleIterator for ARangeSets<R> {
    type Item = ARangeSet;
    type Error = Error;

    fn next(&mut self) -> Result<Option<ARangeSet>> {
        if self.input.is_empty() {
            return Ok(None);
        }
        let offset = position(&self.input, &self.section);
        match parse_set(&mut self.input, offset).context(DEBUG_ARANGES, offset) {
            Ok(set) => Ok(Some(set)),
            Err(err) => {
                self.input.empty();
                Err(err)
            }
        }
    }
}

/// Decode all address range sets; any failure aborts.
pub fn decode_aranges<R: Reader>(section: &R) -> Result<Vec<ARangeSet>> {
    let sets: Vec<_> = ARangeSets::new(section.clone()).collect()?;
    tracing::debug!(sets = sets.len(), "decoded address range sets");
    Ok(sets)
}

fn parse_set<R: Reader>(input: &mut R, offset: u64) -> Result<ARangeSet> {
    let initial = InitialLength::read(input)?;
    let mut rest = initial.split(input)?;
    let start = rest.clone();

    let version = rest.read_u16()?;
    let cu_offset = read_offset(&mut rest, initial.format)?;
    let address_size = rest.read_u8()?;
    let segment_size = rest.read_u8()?;

    // The first tuple is aligned to the tuple size, counted from the start
    // of the set.
    let tuple_size = 2 * usize::from(address_size) + usize::from(segment_size);
    if tuple_size != 0 {
        let header_size = initial.size() + rest.offset_from(&start);
        let misalignment = header_size % tuple_size;
        if misalignment != 0 {
            rest.skip((tuple_size - misalignment).min(rest.len()))?;
        }
    }

    let mut descriptors = Vec::new();
    while !rest.is_empty() {
        let segment = if segment_size != 0 {
            Some(rest.read_address(segment_size)?)
        } else {
            None
        };
        let address = rest.read_address(address_size)?;
        let length = rest.read_address(address_size)?;
        if address == 0 && length == 0 && segment.unwrap_or(0) == 0 {
            break;
        }
        descriptors.push(ARangeDescriptor {
            segment,
            address,
            length,
        });
    }

    Ok(ARangeSet {
        offset,
        format: initial.format,
        length: initial.length,
        version,
        cu_offset,
        address_size,
        segment_size,
        descriptors,
    })
}
