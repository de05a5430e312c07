//! A lightweight reader/writer for the Office Open XML (OOXML) spreadsheet
//! container (XLSX), with optional transparent ECMA-376 Agile encryption.
//!
//! The crate converts between an in-memory workbook object graph and bytes
//! on disk. Writing is a ZIP container holding the standard XLSX parts;
//! reading streams those parts back through a pull-style XML parser. When a
//! password is supplied, the ZIP bytes are wrapped in (or unwrapped from) a
//! Compound File Binary storage carrying the Agile `EncryptionInfo` and
//! `EncryptedPackage` streams.
//!
//! # Example
//!
//! ```no_run
//! use xlsxcore::model::Workbook;
//!
//! # fn main() -> xlsxcore::Result<()> {
//! let mut wb = Workbook::new();
//! let sheet = wb.add_sheet("Sheet1")?;
//! wb.get_sheet_mut(sheet).unwrap().cell(0, 0)?.set_text("hello");
//! wb.save("out.xlsx")?;
//! # Ok(())
//! # }
//! ```

pub mod cellref;
pub mod cfb;
pub mod crypto;
pub mod dateserial;
pub mod error;
pub mod model;
pub mod rowspill;
pub mod xlsx;
pub mod xml;
pub mod zipcodec;

pub use error::{Error, Result};
pub use model::Workbook;
