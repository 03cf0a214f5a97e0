//! `.debug_ranges` decoding.

use fallible_iterator::FallibleIterator;

use crate::error::{Context, Error, Result};
use crate::model::{RangeEntry, RangeList};
use crate::reader::{position, Reader};
use crate::sections::DEBUG_RANGES;

/// Pick the address size shared by every compile unit.
///
/// `.debug_ranges` carries no header, so the address size has to come from
/// the units. Units disagreeing is an error; with no units at all the
/// object's default applies.
pub fn common_address_size<I>(unit_sizes: I, default: u8) -> Result<u8>
where
    I: IntoIterator<Item = u8>,
{
    let mut common = None;
    for size in unit_sizes {
        match common {
            None => common = Some(size),
            Some(first) if first != size => {
                return Err(Error::InconsistentAddressSize { first, other: size })
            }
            Some(_) => {}
        }
    }
    Ok(common.unwrap_or(default))
}

/// Iterator over the range lists of `.debug_ranges`, keyed by offset.
#[derive(Debug, Clone)]
pub struct RangeLists<R: Reader> {
    section: R,
    input: R,
    address_size: u8,
}

impl<R: Reader> RangeLists<R> {
    pub fn new(section: R, address_size: u8) -> Self {
        RangeLists {
            input: section.clone(),
            section,
            address_size,
        }
    }

    fn parse_list(&mut self) -> Result<RangeList> {
        let offset = position(&self.input, &self.section);
        let mut entries = Vec::new();
        loop {
            let start = self.input.read_address(self.address_size)?;
            let end = self.input.read_address(self.address_size)?;
            if start == 0 && end == 0 {
                break;
            }
            entries.push(RangeEntry { start, end });
        }
        Ok(RangeList {
            offset,
            address_size: self.address_size,
            entries,
        })
    }
}

impl<R: Reader> FallibleIterator for RangeLists<R> {
    type Item = RangeList;
    type Error = Error;

    fn next(&mut self) -> Result<Option<RangeList>> {
        if self.input.is_empty() {
            return Ok(None);
        }
        let offset = position(&self.input, &self.section);
        match self.parse_list().context(DEBUG_RANGES, offset) {
            Ok(list) => Ok(Some(list)),
            Err(err) => {
                self.input.empty();
                Err(err)
            }
        }
    }
}

/// Decode all range lists. Mixed unit address sizes or a truncated list
/// abort with no lists returned.
pub fn decode_ranges<R, I>(section: &R, unit_sizes: I, default: u8) -> Result<Vec<RangeList>>
where
    R: Reader,
    I: IntoIterator<Item = u8>,
{
    let address_size = common_address_size(unit_sizes, default)?;
    if section.is_empty() {
        return Ok(Vec::new());
    }
    if address_size == 0 {
        return Err(Error::MissingAddressSize);
    }
    let lists: Vec<_> = RangeLists::new(section.clone(), address_size).collect()?;
    tracing::debug!(lists = lists.len(), address_size, "decoded range lists");
    Ok(lists)
}
