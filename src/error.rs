//! Unified error type for the crate.
//!
//! All fallible operations in this crate return [`Result<T>`], backed by a
//! single flat [`Error`] enum rather than per-module error types.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying IO failure (file access, temp file rename, mmap, ...).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP container could not be read or written.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML could not be parsed or serialized.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML attribute could not be decoded.
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// A cell reference string (e.g. "A1") was not well formed.
    #[error("invalid cell reference: {text:?}")]
    InvalidCellRef { text: String },

    /// A range reference string (e.g. "A1:B2") was not well formed.
    #[error("invalid range reference: {text:?}")]
    InvalidRangeRef { text: String },

    /// A required OPC part was missing from the package.
    #[error("missing package part: {path}")]
    MissingPart { path: String },

    /// A workbook, sheet, or style index referenced something that does not exist.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The file is not a recognized container (neither a ZIP nor a CFB file).
    #[error("not a recognized spreadsheet container")]
    NotASpreadsheet,

    /// The CFB (compound file binary) structure was malformed.
    #[error("malformed compound file: {0}")]
    MalformedCfb(String),

    /// A stream or storage entry was not found inside a CFB container.
    #[error("compound file entry not found: {0}")]
    CfbEntryNotFound(String),

    /// An unsupported Agile encryption version was encountered.
    #[error("unsupported encryption version: major={major}, minor={minor}")]
    UnsupportedEncryptionVersion { major: u16, minor: u16 },

    /// The supplied password did not match the file's encryption verifier.
    #[error("incorrect password")]
    IncorrectPassword,

    /// The document is encrypted; a password is required to open it.
    #[error("document is password-protected")]
    PasswordRequired,

    /// The requested encryption algorithm/key length combination is not supported.
    #[error("unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Generic parse failure with free-form context.
    #[error("parse error: {0}")]
    Parse(String),

    /// The operation was attempted on a workbook that has already been closed.
    #[error("workbook is closed")]
    Closed,

    /// A sheet was added whose name (case-insensitively) collides with one
    /// that already exists.
    #[error("duplicate sheet name: {name:?}")]
    DuplicateSheetName { name: String },

    /// A sheet was added with a blank (or all-whitespace) name.
    #[error("sheet name must not be empty")]
    EmptySheetName,

    /// Catch-all for conditions not covered by a more specific variant.
    #[error("{0}")]
    Other(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
