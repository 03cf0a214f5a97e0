//! Decode the DWARF debugging sections of an object file into plain records.
//!
//! [`decode`] reads abbreviations, strings, address ranges, range lists,
//! public names and types, compile units and line-number programs from a
//! [`Sections`] set. The result keeps every value as encoded, so it can be
//! written out again by [`dump::dump`] or inspected directly.

pub mod abbrev;
pub mod aranges;
mod decode;
pub mod dump;
mod error;
pub mod info;
pub mod line;
pub mod model;
pub mod pubnames;
pub mod ranges;
pub mod reader;
pub mod sections;
pub mod strings;

pub use crate::decode::decode;
pub use crate::error::{Diagnostic, Error, Result};
pub use crate::model::*;
pub use crate::reader::Reader;
pub use crate::sections::Sections;
