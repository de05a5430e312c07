//! The `Workbook` root object: sheets, styles, and shared strings.

use std::path::Path;

use crate::error::{Error, Result};

use super::sheet::Sheet;
use super::shared_strings::SharedStrings;
use super::style::Style;

/// The workbook root. Owns its sheets, style table, and shared-string
/// table. All mutating operations fail with [`Error::Closed`] once the
/// workbook has been closed.
#[derive(Debug)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    styles: Vec<Style>,
    shared_strings: SharedStrings,
    closed: bool,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    pub fn new() -> Self {
        Workbook {
            sheets: Vec::new(),
            styles: vec![Style::default()],
            shared_strings: SharedStrings::new(),
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Appends a new sheet and returns its index. Fails with
    /// [`Error::DuplicateSheetName`] if a case-insensitive match already
    /// exists, or [`Error::EmptySheetName`] if `name` is blank.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> Result<usize> {
        self.check_open()?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::EmptySheetName);
        }
        if self
            .sheets
            .iter()
            .any(|s| s.name().eq_ignore_ascii_case(&name))
        {
            return Err(Error::DuplicateSheetName { name });
        }
        let index = self.sheets.len();
        self.sheets.push(Sheet::new(name, index));
        Ok(index)
    }

    pub fn get_sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn get_sheet_mut(&mut self, index: usize) -> Option<&mut Sheet> {
        self.sheets.get_mut(index)
    }

    /// Case-insensitive sheet lookup by name.
    pub fn get_sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name().eq_ignore_ascii_case(name))
    }

    pub fn get_sheet_by_name_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    pub fn sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(Sheet::name).collect()
    }

    /// Appends `style` and returns its index. No deduplication is performed
    /// at this layer; the writer deduplicates for serialization.
    pub fn add_style(&mut self, style: Style) -> Result<u32> {
        self.check_open()?;
        let idx = self.styles.len() as u32;
        self.styles.push(style);
        Ok(idx)
    }

    pub fn get_style(&self, index: u32) -> Option<&Style> {
        self.styles.get(index as usize)
    }

    pub fn styles(&self) -> &[Style] {
        &self.styles
    }

    /// Returns the existing index for `s` if present, else appends it and
    /// returns the new index.
    pub fn add_shared_string(&mut self, s: &str) -> Result<u32> {
        self.check_open()?;
        Ok(self.shared_strings.add(s))
    }

    pub fn shared_strings(&self) -> &SharedStrings {
        &self.shared_strings
    }

    /// Replaces the entire style table. Used by the xlsx reader to install
    /// the table parsed from `xl/styles.xml`, which otherwise has no path
    /// through the append-only [`Workbook::add_style`].
    pub(crate) fn set_styles(&mut self, styles: Vec<Style>) {
        self.styles = styles;
    }

    /// Replaces the shared-string table. Used by the xlsx reader to install
    /// the table parsed from `xl/sharedStrings.xml`.
    pub(crate) fn set_shared_strings(&mut self, shared_strings: SharedStrings) {
        self.shared_strings = shared_strings;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Writes the workbook to `path` as a plain XLSX file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::xlsx::writer::write_to_path(self, path.as_ref(), None)
    }

    /// Writes the workbook to `path`, wrapped in an Agile-encrypted CFB
    /// envelope unlockable with `password`.
    pub fn save_encrypted(
        &self,
        path: impl AsRef<Path>,
        options: crate::crypto::EncryptionOptions,
    ) -> Result<()> {
        crate::xlsx::writer::write_to_path(self, path.as_ref(), Some(options))
    }

    /// Opens an XLSX (or Agile-encrypted XLSX) file from `path`.
    pub fn open(path: impl AsRef<Path>, password: Option<&str>) -> Result<Workbook> {
        crate::xlsx::reader::read_from_path(path.as_ref(), password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sheet_rejects_duplicate_and_empty_names() {
        let mut wb = Workbook::new();
        wb.add_sheet("Sheet1").unwrap();
        assert!(wb.add_sheet("sheet1").is_err());
        assert!(wb.add_sheet("  ").is_err());
    }

    #[test]
    fn sheet_lookup_by_name_is_case_insensitive() {
        let mut wb = Workbook::new();
        wb.add_sheet("Data").unwrap();
        assert!(wb.get_sheet_by_name("DATA").is_some());
    }

    #[test]
    fn operations_fail_after_close() {
        let mut wb = Workbook::new();
        wb.close();
        assert!(wb.add_sheet("x").is_err());
        assert!(wb.add_shared_string("x").is_err());
    }

    #[test]
    fn shared_string_dedup_on_insert() {
        let mut wb = Workbook::new();
        let a = wb.add_shared_string("hello").unwrap();
        let b = wb.add_shared_string("hello").unwrap();
        assert_eq!(a, b);
    }
}
