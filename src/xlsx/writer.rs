//! Orchestrates a full XLSX (optionally Agile-encrypted) save: renders every
//! OPC part, zips them, and — for the encrypted path — wraps the zip in an
//! Agile-encrypted CFB container.

use std::io::{Cursor, Write};
use std::path::Path;

use crate::crypto::{encrypt_agile, EncryptionOptions};
use crate::error::{Error, Result};
use crate::model::{SharedStrings, Workbook};
use crate::zipcodec::ZipWriter;

use super::sheet;
use super::styles;
use super::workbook_xml;

/// Renders `workbook` to an in-memory, unencrypted XLSX (zip) byte buffer.
pub fn write_to_bytes(workbook: &Workbook) -> Result<Vec<u8>> {
    let mut shared_strings = SharedStrings::new();
    let mut sheet_xmls = Vec::with_capacity(workbook.sheet_count());
    let mut total_text_refs = 0u32;
    for sheet in workbook.sheets() {
        let rendered = sheet::to_xml(sheet, &mut shared_strings)?;
        total_text_refs += rendered.text_cell_count;
        sheet_xmls.push(rendered.xml);
    }

    let styles_xml = styles::to_xml(workbook.styles());
    let strings: Vec<String> = shared_strings.iter().map(str::to_string).collect();
    let shared_strings_xml = workbook_xml::write_shared_strings_xml(&strings, total_text_refs);
    let content_types = workbook_xml::write_content_types(workbook.sheet_count());
    let root_rels = workbook_xml::write_root_rels();
    let workbook_xml_body = workbook_xml::write_workbook_xml(workbook);
    let workbook_rels = workbook_xml::write_workbook_rels(workbook.sheet_count());

    let mut buf = Vec::new();
    {
        let cursor = Cursor::new(&mut buf);
        let mut zip = ZipWriter::new(cursor);
        zip.write_entry("[Content_Types].xml", content_types.as_bytes())?;
        zip.write_entry("_rels/.rels", root_rels.as_bytes())?;
        zip.write_entry("xl/workbook.xml", workbook_xml_body.as_bytes())?;
        zip.write_entry("xl/_rels/workbook.xml.rels", workbook_rels.as_bytes())?;
        zip.write_entry("xl/styles.xml", styles_xml.as_bytes())?;
        zip.write_entry("xl/sharedStrings.xml", shared_strings_xml.as_bytes())?;
        for (i, xml) in sheet_xmls.iter().enumerate() {
            let name = format!("xl/worksheets/sheet{}.xml", i + 1);
            zip.write_entry(&name, xml.as_bytes())?;
        }
        zip.finish()?;
    }
    Ok(buf)
}

/// Writes `workbook` to `path`, optionally Agile-encrypting it, via an
/// atomic temp-file-then-rename so a crash mid-write never clobbers an
/// existing file with a truncated one.
pub fn write_to_path(workbook: &Workbook, path: &Path, options: Option<EncryptionOptions>) -> Result<()> {
    let plain = write_to_bytes(workbook)?;
    let final_bytes = match options {
        None => plain,
        Some(opts) => {
            let envelope = encrypt_agile(&plain, &opts)?;
            crate::cfb::build_encrypted_package_cfb(&envelope.encryption_info, &envelope.encrypted_package)?
        }
    };
    write_atomic(path, &final_bytes)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Workbook;

    #[test]
    fn writes_a_well_formed_zip_with_required_parts() {
        let mut wb = Workbook::new();
        let idx = wb.add_sheet("Sheet1").unwrap();
        wb.get_sheet_mut(idx).unwrap().cell(0, 0).unwrap().set_text("hi");

        let bytes = write_to_bytes(&wb).unwrap();
        let mut reader = crate::zipcodec::ZipReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.has_entry("[Content_Types].xml"));
        assert!(reader.has_entry("xl/workbook.xml"));
        assert!(reader.has_entry("xl/styles.xml"));
        assert!(reader.has_entry("xl/sharedStrings.xml"));
        assert!(reader.has_entry("xl/worksheets/sheet1.xml"));
        let sheet_xml = reader.read_entry("xl/worksheets/sheet1.xml").unwrap();
        assert!(String::from_utf8(sheet_xml).unwrap().contains(r#"t="s""#));
    }

    #[test]
    fn save_to_path_round_trips_through_the_filesystem() {
        let mut wb = Workbook::new();
        wb.add_sheet("Sheet1").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        wb.save(&path).unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
