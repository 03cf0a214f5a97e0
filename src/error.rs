use std::fmt;
use std::io;
use std::result;

use thiserror::Error;

/// Errors produced while decoding DWARF sections.
///
/// Decoding failures fall in two groups. Structural failures in
/// `.debug_aranges` and `.debug_ranges` abort the whole decode and are
/// returned to the caller. Everything else is recorded as a [`Diagnostic`]
/// next to whatever part of the model could still be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Gimli(#[from] gimli::Error),

    #[error("address sizes vary in different compile units ({first} and {other})")]
    InconsistentAddressSize { first: u8, other: u8 },

    #[error("no address size is available to decode .debug_ranges")]
    MissingAddressSize,

    #[error("unsupported unit version {0}")]
    UnsupportedUnitVersion(u16),

    #[error("unsupported line table version {0}")]
    UnsupportedLineVersion(u16),

    #[error("unsupported attribute form {0}")]
    UnsupportedForm(gimli::DwForm),

    #[error("DW_FORM_indirect chain is longer than {0} links")]
    IndirectionLimit(usize),

    #[error("no abbreviation declaration for code {code} in the set at offset 0x{abbr_offset:x}")]
    UnknownAbbreviation { code: u64, abbr_offset: u64 },

    #[error("length 0x{length:x} runs past the end of the section")]
    LengthOutOfBounds { length: u64 },

    #[error("{section}+0x{offset:08x}: {source}")]
    Section {
        section: &'static str,
        offset: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("an I/O error occurred while writing")]
    Io,
}

impl From<io::Error> for Error {
    fn from(_: io::Error) -> Self {
        Error::Io
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Attach the section name and offset at which a read went wrong.
pub(crate) trait Context<T> {
    fn context(self, section: &'static str, offset: u64) -> Result<T>;
}

impl<T, E> Context<T> for result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, section: &'static str, offset: u64) -> Result<T> {
        self.map_err(|err| Error::Section {
            section,
            offset,
            source: Box::new(err.into()),
        })
    }
}

/// A decode failure that did not abort the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Name of the section being decoded, e.g. `.debug_line`.
    pub section: &'static str,
    /// Offset of the record that failed.
    pub offset: u64,
    pub error: Error,
}

impl Diagnostic {
    pub(crate) fn new(section: &'static str, offset: u64, error: Error) -> Self {
        tracing::warn!(section, offset, %error, "decode stopped early");
        Diagnostic {
            section,
            offset,
            error,
        }
    }

    /// Turn an error carrying section context into a diagnostic.
    pub(crate) fn from_error(section: &'static str, error: Error) -> Self {
        match error {
            Error::Section {
                section,
                offset,
                source,
            } => Diagnostic::new(section, offset, *source),
            error => Diagnostic::new(section, 0, error),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}+0x{:08x}: {}", self.section, self.offset, self.error)
    }
}
