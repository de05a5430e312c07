//! Encodes and decodes the package-level parts that tie sheets together:
//! `xl/workbook.xml`, `xl/_rels/workbook.xml.rels`, `_rels/.rels`, and
//! `[Content_Types].xml`.

use std::collections::HashMap;

use crate::error::Result;
use crate::model::Workbook;
use crate::xml::{attr, XmlEvent, XmlReader, XmlWriter};

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_CT: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub fn write_workbook_xml(workbook: &Workbook) -> String {
    let mut w = XmlWriter::with_declaration();
    w.start_element("workbook", &[("xmlns", NS_MAIN), ("xmlns:r", NS_R)]);
    w.start_element("sheets", &[]);
    for (i, sheet) in workbook.sheets().enumerate() {
        let sheet_id = (i + 1).to_string();
        let r_id = format!("rId{}", i + 1);
        w.empty_element(
            "sheet",
            &[("name", sheet.name()), ("sheetId", &sheet_id), ("r:id", &r_id)],
        );
    }
    w.end_element(); // sheets
    w.end_element(); // workbook
    w.finish()
}

pub fn write_workbook_rels(sheet_count: usize) -> String {
    let mut w = XmlWriter::with_declaration();
    w.start_element("Relationships", &[("xmlns", NS_PKG_RELS)]);
    for i in 0..sheet_count {
        let id = format!("rId{}", i + 1);
        let target = format!("worksheets/sheet{}.xml", i + 1);
        w.empty_element(
            "Relationship",
            &[
                ("Id", &id),
                (
                    "Type",
                    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet",
                ),
                ("Target", &target),
            ],
        );
    }
    w.end_element();
    w.finish()
}

pub fn write_root_rels() -> String {
    let mut w = XmlWriter::with_declaration();
    w.start_element("Relationships", &[("xmlns", NS_PKG_RELS)]);
    w.empty_element(
        "Relationship",
        &[
            ("Id", "rId1"),
            (
                "Type",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument",
            ),
            ("Target", "xl/workbook.xml"),
        ],
    );
    w.end_element();
    w.finish()
}

pub fn write_content_types(sheet_count: usize) -> String {
    let mut w = XmlWriter::with_declaration();
    w.start_element("Types", &[("xmlns", NS_CT)]);
    w.empty_element(
        "Default",
        &[
            ("Extension", "rels"),
            (
                "ContentType",
                "application/vnd.openxmlformats-package.relationships+xml",
            ),
        ],
    );
    w.empty_element(
        "Default",
        &[("Extension", "xml"), ("ContentType", "application/xml")],
    );
    w.empty_element(
        "Override",
        &[
            ("PartName", "/xl/workbook.xml"),
            (
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
            ),
        ],
    );
    w.empty_element(
        "Override",
        &[
            ("PartName", "/xl/styles.xml"),
            (
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml",
            ),
        ],
    );
    w.empty_element(
        "Override",
        &[
            ("PartName", "/xl/sharedStrings.xml"),
            (
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml",
            ),
        ],
    );
    for i in 1..=sheet_count {
        let part = format!("/xl/worksheets/sheet{i}.xml");
        w.empty_element(
            "Override",
            &[
                ("PartName", &part),
                (
                    "ContentType",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
                ),
            ],
        );
    }
    w.end_element();
    w.finish()
}

pub fn write_shared_strings_xml(strings: &[String], total_refs: u32) -> String {
    let mut w = XmlWriter::with_declaration();
    let count = total_refs.to_string();
    let unique_count = strings.len().to_string();
    w.start_element(
        "sst",
        &[("xmlns", NS_MAIN), ("count", &count), ("uniqueCount", &unique_count)],
    );
    for s in strings {
        w.start_element("si", &[]);
        w.start_element("t", &[("xml:space", "preserve")]);
        w.text(s);
        w.end_element();
        w.end_element();
    }
    w.end_element();
    w.finish()
}

/// One `<sheet>` entry from `xl/workbook.xml`, in document order.
struct SheetEntry {
    name: Option<String>,
    r_id: Option<String>,
}

fn parse_workbook_sheet_entries(xml: &[u8]) -> Result<Vec<SheetEntry>> {
    let mut entries = Vec::new();
    let mut reader = XmlReader::new(xml);
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } if name == "sheet" => {
                entries.push(SheetEntry {
                    name: attr(&attrs, "name").map(str::to_string),
                    // The `r:` namespace prefix is stripped by the reader,
                    // so the relationship id attribute surfaces as "id".
                    r_id: attr(&attrs, "id").map(str::to_string),
                });
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(entries)
}

fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    let mut reader = XmlReader::new(xml);
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } if name == "Relationship" => {
                if let (Some(id), Some(target)) = (attr(&attrs, "Id"), attr(&attrs, "Target")) {
                    map.insert(id.to_string(), target.to_string());
                }
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(map)
}

/// Resolves the document-order list of `(sheet name, worksheet part path)`
/// pairs from `xl/workbook.xml` and `xl/_rels/workbook.xml.rels`. A `<sheet>`
/// entry missing a name or whose relationship id has no matching
/// `Relationship` is silently dropped rather than failing the whole read.
pub fn read_sheet_order(workbook_xml: &[u8], workbook_rels_xml: &[u8]) -> Result<Vec<(String, String)>> {
    let entries = parse_workbook_sheet_entries(workbook_xml)?;
    let rels = parse_relationships(workbook_rels_xml)?;

    let mut resolved = Vec::new();
    for entry in entries {
        let (Some(name), Some(r_id)) = (entry.name, entry.r_id) else {
            continue;
        };
        let Some(target) = rels.get(&r_id) else {
            continue;
        };
        let target = target.trim_start_matches('/');
        let path = if let Some(rest) = target.strip_prefix("xl/") {
            format!("xl/{rest}")
        } else {
            format!("xl/{target}")
        };
        resolved.push((name, path));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Workbook;

    #[test]
    fn writes_one_sheet_entry_per_workbook_sheet() {
        let mut wb = Workbook::new();
        wb.add_sheet("First".to_string()).unwrap();
        wb.add_sheet("Second".to_string()).unwrap();
        let xml = write_workbook_xml(&wb);
        assert!(xml.contains(r#"name="First""#));
        assert!(xml.contains(r#"name="Second""#));
        assert!(xml.contains(r#"r:id="rId2""#));
    }

    #[test]
    fn resolves_sheet_order_through_relationships() {
        let mut wb = Workbook::new();
        wb.add_sheet("Data".to_string()).unwrap();
        let workbook_xml = write_workbook_xml(&wb);
        let rels_xml = write_workbook_rels(wb.sheet_count());
        let order = read_sheet_order(workbook_xml.as_bytes(), rels_xml.as_bytes()).unwrap();
        assert_eq!(order, vec![("Data".to_string(), "xl/worksheets/sheet1.xml".to_string())]);
    }

    #[test]
    fn sheet_missing_a_relationship_is_dropped() {
        let workbook_xml = br#"<?xml version="1.0"?><workbook xmlns:r="r"><sheets>
            <sheet name="Orphan" r:id="rIdMissing"/>
        </sheets></workbook>"#;
        let rels_xml = br#"<?xml version="1.0"?><Relationships></Relationships>"#;
        let order = read_sheet_order(workbook_xml, rels_xml).unwrap();
        assert!(order.is_empty());
    }
}
