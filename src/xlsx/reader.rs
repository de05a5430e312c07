//! Opens an XLSX file, transparently unwrapping an Agile-encrypted CFB
//! envelope first when the bytes sniff as one.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use memmap2::Mmap;

use crate::cfb::{is_cfb_file, CfbReader};
use crate::crypto::decrypt_agile;
use crate::error::{Error, Result};
use crate::model::{SharedStrings, Style, Workbook};
use crate::xml::{XmlEvent, XmlReader};
use crate::zipcodec::ZipReader;

use super::sheet;
use super::styles;
use super::workbook_xml;

/// Opens the XLSX (or Agile-encrypted XLSX) file at `path`.
pub fn read_from_path(path: &Path, password: Option<&str>) -> Result<Workbook> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if is_cfb_file(&mmap) {
        let cfb = CfbReader::open(mmap)?;
        let encryption_info = cfb.read_stream(&["EncryptionInfo"])?;
        let encrypted_package = cfb.read_stream(&["EncryptedPackage"])?;
        let password = password.ok_or(Error::PasswordRequired)?;
        let plain = decrypt_agile(&encryption_info, &encrypted_package, password)?;
        return read_from_bytes(&plain);
    }

    read_from_bytes(&mmap)
}

/// Parses an already-decrypted (or never-encrypted) XLSX zip from memory.
pub fn read_from_bytes(bytes: &[u8]) -> Result<Workbook> {
    let cursor = Cursor::new(bytes);
    let mut zip = ZipReader::new(cursor)?;

    if !zip.has_entry("xl/workbook.xml") {
        return Err(Error::NotASpreadsheet);
    }
    let workbook_xml_bytes = zip.read_entry("xl/workbook.xml")?;
    let workbook_rels_bytes = zip
        .read_entry("xl/_rels/workbook.xml.rels")
        .unwrap_or_default();

    let sheet_order = workbook_xml::read_sheet_order(&workbook_xml_bytes, &workbook_rels_bytes)?;

    let style_table = if zip.has_entry("xl/styles.xml") {
        let bytes = zip.read_entry("xl/styles.xml")?;
        styles::from_xml(&bytes)?
    } else {
        vec![Style::default()]
    };

    let shared_strings_list: Vec<String> = if zip.has_entry("xl/sharedStrings.xml") {
        read_shared_strings(&zip.read_entry("xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };

    let mut workbook = Workbook::new();
    workbook.set_styles(style_table);

    for (name, part_path) in &sheet_order {
        let index = workbook.add_sheet(name.clone())?;
        if !zip.has_entry(part_path) {
            // Sheet is declared but its part is missing: keep the (empty)
            // sheet rather than failing the whole open.
            continue;
        }
        let sheet_xml = zip.read_entry(part_path)?;
        let sheet = workbook.get_sheet_mut(index).expect("just inserted above");
        sheet::read_into(sheet, &sheet_xml, &shared_strings_list)?;
    }

    let mut table = SharedStrings::new();
    for s in &shared_strings_list {
        table.add(s);
    }
    workbook.set_shared_strings(table);

    Ok(workbook)
}

fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = XmlReader::new(xml);
    let mut strings = Vec::new();
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, .. } if name == "si" => {
                strings.push(read_si_text(&mut reader)?);
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(strings)
}

/// Reads one `<si>` entry's text, tolerating either a bare `<t>` child or
/// rich-text `<r><t>...</t></r>` runs (run formatting itself is discarded).
fn read_si_text(reader: &mut XmlReader) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, .. } if name == "t" => {
                text.push_str(&reader.element_text()?);
            }
            XmlEvent::EndElement { name } if name == "si" => break,
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionOptions;
    use crate::model::Workbook;

    fn sample_workbook() -> Workbook {
        let mut wb = Workbook::new();
        let idx = wb.add_sheet("Sheet1").unwrap();
        {
            let sheet = wb.get_sheet_mut(idx).unwrap();
            sheet.cell(0, 0).unwrap().set_text("hello");
            sheet.cell(0, 1).unwrap().set_number(42.0);
            sheet.cell(1, 0).unwrap().set_bool(true);
        }
        wb
    }

    #[test]
    fn round_trips_an_unencrypted_workbook_through_bytes() {
        let wb = sample_workbook();
        let bytes = super::super::writer::write_to_bytes(&wb).unwrap();
        let parsed = read_from_bytes(&bytes).unwrap();

        assert_eq!(parsed.sheet_count(), 1);
        let sheet = parsed.get_sheet(0).unwrap();
        assert_eq!(sheet.get_cell(0, 0).unwrap().value().as_text(), "hello");
        assert_eq!(sheet.get_cell(0, 1).unwrap().value().as_number(), 42.0);
        assert!(sheet.get_cell(1, 0).unwrap().value().as_bool());
    }

    #[test]
    fn round_trips_an_encrypted_workbook_through_the_filesystem() {
        let wb = sample_workbook();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.xlsx");
        let options = EncryptionOptions::new("correct horse");
        wb.save_encrypted(&path, options).unwrap();

        let err = Workbook::open(&path, Some("wrong password"));
        assert!(err.is_err());

        let opened = Workbook::open(&path, Some("correct horse")).unwrap();
        let sheet = opened.get_sheet(0).unwrap();
        assert_eq!(sheet.get_cell(0, 0).unwrap().value().as_text(), "hello");
    }

    #[test]
    fn rejects_a_non_spreadsheet_zip() {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut w = crate::zipcodec::ZipWriter::new(cursor);
            w.write_entry("readme.txt", b"not a workbook").unwrap();
            w.finish().unwrap();
        }
        assert!(read_from_bytes(&buf).is_err());
    }
}
