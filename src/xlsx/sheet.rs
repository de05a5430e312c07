//! Encodes and decodes a single `xl/worksheets/sheetN.xml` part.

use crate::cellref::{CellRef, RangeRef};
use crate::dateserial;
use crate::error::Result;
use crate::model::{AutoFilter, Cell, CellValue, Row, SharedStrings, Sheet};
use crate::rowspill::{RowSpill, SpilledRow};
use crate::xml::{attr, XmlEvent, XmlReader, XmlWriter};

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// Sheets with more materialized rows than this are rendered through a
/// [`RowSpill`] instead of being walked directly off `Sheet`'s in-memory row
/// map, so the serialized `<row>` XML for a very large sheet is produced by
/// draining one row at a time from disk rather than holding every row's
/// rendered form in memory at once.
const SPILL_ROW_THRESHOLD: usize = 5_000;

/// The result of serializing one sheet: its XML body plus how many `Text`
/// cells it contributed, so the caller can total `sharedStrings.xml`'s
/// `count` attribute across every sheet.
pub struct SheetXml {
    pub xml: String,
    pub text_cell_count: u32,
}

fn format_number(n: f64) -> String {
    let mut buf = ryu::Buffer::new();
    let formatted = buf.format(n);
    // ryu always emits a decimal point (e.g. "1.0"); Excel reads integral
    // values just fine written as plain integers, so trim the noise.
    if let Some(stripped) = formatted.strip_suffix(".0") {
        stripped.to_string()
    } else {
        formatted.to_string()
    }
}

fn write_cell(w: &mut XmlWriter, row_num: u32, cell: &Cell, shared_strings: &mut SharedStrings, text_cells: &mut u32) {
    write_cell_value(w, row_num, cell.column(), cell.style(), cell.value(), shared_strings, text_cells);
}

fn write_cell_value(
    w: &mut XmlWriter,
    row_num: u32,
    column: u32,
    s: u32,
    value: &CellValue,
    shared_strings: &mut SharedStrings,
    text_cells: &mut u32,
) {
    let r = CellRef::new(row_num, column).to_a1();

    match value {
        CellValue::Empty => {
            if s != 0 {
                let s_str = s.to_string();
                w.empty_element("c", &[("r", &r), ("s", &s_str)]);
            }
        }
        CellValue::Text(text) => {
            *text_cells += 1;
            let idx = shared_strings.add(text);
            write_value_cell(w, &r, s, Some("s"), &idx.to_string());
        }
        CellValue::Number(n) => {
            write_value_cell(w, &r, s, None, &format_number(*n));
        }
        CellValue::Bool(b) => {
            write_value_cell(w, &r, s, Some("b"), if *b { "1" } else { "0" });
        }
        CellValue::Date(dt) => {
            write_value_cell(w, &r, s, None, &format_number(dateserial::to_serial(*dt)));
        }
        CellValue::Error(code) => {
            write_value_cell(w, &r, s, Some("e"), code);
        }
        CellValue::Formula { expression, cached } => {
            write_formula_cell(w, &r, s, expression, cached, text_cells);
        }
    }
}

fn write_value_cell(w: &mut XmlWriter, r: &str, s: u32, t: Option<&str>, value: &str) {
    let s_str = s.to_string();
    let mut attrs: Vec<(&str, &str)> = vec![("r", r)];
    if s != 0 {
        attrs.push(("s", &s_str));
    }
    if let Some(t) = t {
        attrs.push(("t", t));
    }
    w.start_element("c", &attrs);
    w.start_element("v", &[]);
    w.text(value);
    w.end_element();
    w.end_element();
}

fn write_formula_cell(
    w: &mut XmlWriter,
    r: &str,
    s: u32,
    expression: &str,
    cached: &CellValue,
    text_cells: &mut u32,
) {
    let s_str = s.to_string();
    let (t, value): (Option<&str>, Option<String>) = match cached {
        CellValue::Empty => (None, None),
        CellValue::Number(n) => (None, Some(format_number(*n))),
        CellValue::Bool(b) => (Some("b"), Some(if *b { "1".to_string() } else { "0".to_string() })),
        CellValue::Date(dt) => (None, Some(format_number(dateserial::to_serial(*dt)))),
        CellValue::Error(code) => (Some("e"), Some(code.clone())),
        // Formula results carry cached strings inline (t="str"), not via the
        // shared-string table -- unlike a plain Text cell.
        CellValue::Text(text) => {
            *text_cells += 1;
            (Some("str"), Some(text.clone()))
        }
        CellValue::Formula { .. } => (None, None),
    };

    let mut attrs: Vec<(&str, &str)> = vec![("r", r)];
    if s != 0 {
        attrs.push(("s", &s_str));
    }
    if let Some(t) = t {
        attrs.push(("t", t));
    }
    w.start_element("c", &attrs);
    w.start_element("f", &[]);
    w.text(expression);
    w.end_element();
    if let Some(value) = &value {
        w.start_element("v", &[]);
        w.text(value);
        w.end_element();
    }
    w.end_element();
}

fn write_row(w: &mut XmlWriter, row: &Row, shared_strings: &mut SharedStrings, text_cells: &mut u32) {
    let r_str = (row.row_num() + 1).to_string();
    let mut attrs: Vec<(&str, &str)> = vec![("r", &r_str)];
    let ht_str;
    if row.custom_height() {
        ht_str = row.height().to_string();
        attrs.push(("ht", &ht_str));
        attrs.push(("customHeight", "1"));
    }
    if row.hidden() {
        attrs.push(("hidden", "1"));
    }

    if row.cell_count() == 0 {
        w.empty_element("row", &attrs);
        return;
    }

    w.start_element("row", &attrs);
    for cell in row.cells() {
        write_cell(w, row.row_num(), cell, shared_strings, text_cells);
    }
    w.end_element();
}

/// Renders one row drained back out of a [`RowSpill`]. Mirrors [`write_row`]
/// but reads from the spill's plain-data types instead of `Row`/`Cell`.
fn write_spilled_row(w: &mut XmlWriter, row: &SpilledRow, shared_strings: &mut SharedStrings, text_cells: &mut u32) {
    let row_num = row.row_num as u32;
    let r_str = (row_num + 1).to_string();
    let mut attrs: Vec<(&str, &str)> = vec![("r", &r_str)];
    let ht_str;
    if row.custom_height {
        ht_str = row.height.to_string();
        attrs.push(("ht", &ht_str));
        attrs.push(("customHeight", "1"));
    }
    if row.hidden {
        attrs.push(("hidden", "1"));
    }

    if row.cells.is_empty() {
        w.empty_element("row", &attrs);
        return;
    }

    w.start_element("row", &attrs);
    for cell in &row.cells {
        write_cell_value(
            w,
            row_num,
            cell.column as u32,
            cell.style as u32,
            &cell.value,
            shared_strings,
            text_cells,
        );
    }
    w.end_element();
}

fn dimension_ref(sheet: &Sheet) -> String {
    let mut min_row = u32::MAX;
    let mut max_row = 0u32;
    let mut min_col = u32::MAX;
    let mut max_col = 0u32;
    for row in sheet.rows() {
        min_row = min_row.min(row.row_num());
        max_row = max_row.max(row.row_num());
        for cell in row.cells() {
            min_col = min_col.min(cell.column());
            max_col = max_col.max(cell.column());
        }
    }
    if min_row == u32::MAX {
        return "A1".to_string();
    }
    if min_row == max_row && min_col == max_col {
        return CellRef::new(min_row, min_col).to_a1();
    }
    format!(
        "{}:{}",
        CellRef::new(min_row, min_col).to_a1(),
        CellRef::new(max_row, max_col).to_a1()
    )
}

/// Renders `sheet`'s `<sheetData>` body by first spilling every row to a
/// [`RowSpill`], then draining it back one row at a time. Keeps at most one
/// rendered row's worth of intermediate spill state alive at a time instead
/// of the whole-sheet row list being collected before any XML is produced.
fn write_sheet_data_via_spill(
    w: &mut XmlWriter,
    sheet: &Sheet,
    shared_strings: &mut SharedStrings,
    text_cells: &mut u32,
) -> Result<()> {
    let mut spill = RowSpill::new()?;
    for row in sheet.rows() {
        spill.append(row)?;
    }
    spill.seal()?;

    spill.for_each_row(|row| {
        write_spilled_row(w, row, shared_strings, text_cells);
        true
    })?;
    Ok(())
}

/// Serializes `sheet` to a worksheet XML part, interning its `Text` cell
/// values (and formula `Text` results) into `shared_strings` as it goes.
pub fn to_xml(sheet: &Sheet, shared_strings: &mut SharedStrings) -> Result<SheetXml> {
    let mut w = XmlWriter::with_declaration();
    w.start_element(
        "worksheet",
        &[
            ("xmlns", NS_MAIN),
            (
                "xmlns:r",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
            ),
        ],
    );

    let dim = dimension_ref(sheet);
    w.empty_element("dimension", &[("ref", &dim)]);

    w.start_element("sheetViews", &[]);
    w.empty_element("sheetView", &[("workbookViewId", "0")]);
    w.end_element();

    w.empty_element("sheetFormatPr", &[("defaultRowHeight", "15")]);

    let widths = &sheet.format().column_widths;
    if !widths.is_empty() {
        w.start_element("cols", &[]);
        for (&col, &width) in widths {
            let min_max = (col + 1).to_string();
            let width_str = width.to_string();
            w.empty_element(
                "col",
                &[
                    ("min", &min_max),
                    ("max", &min_max),
                    ("width", &width_str),
                    ("customWidth", "1"),
                ],
            );
        }
        w.end_element();
    }

    let mut text_cells = 0u32;
    w.start_element("sheetData", &[]);
    if sheet.row_count() > SPILL_ROW_THRESHOLD {
        write_sheet_data_via_spill(&mut w, sheet, shared_strings, &mut text_cells)?;
    } else {
        for row in sheet.rows() {
            write_row(&mut w, row, shared_strings, &mut text_cells);
        }
    }
    w.end_element();

    let merges = &sheet.format().merged_ranges;
    if !merges.is_empty() {
        let count = merges.len().to_string();
        w.start_element("mergeCells", &[("count", &count)]);
        for range in merges {
            let r = range.to_a1();
            w.empty_element("mergeCell", &[("ref", &r)]);
        }
        w.end_element();
    }

    if let Some(filter) = &sheet.format().auto_filter {
        let r = filter.range.to_a1();
        w.empty_element("autoFilter", &[("ref", &r)]);
    }

    for fragment in &sheet.format().conditional_formatting {
        w.raw(fragment);
    }

    let validations = &sheet.format().data_validations;
    if !validations.is_empty() {
        let count = validations.len().to_string();
        w.start_element("dataValidations", &[("count", &count)]);
        for fragment in validations {
            w.raw(fragment);
        }
        w.end_element();
    }

    let protection = sheet.protection();
    if protection.enabled {
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(hash) = &protection.password_hash {
            attrs.push(("hashValue", hash));
        }
        if let Some(alg) = &protection.algorithm_name {
            attrs.push(("algorithmName", alg));
        }
        if let Some(salt) = &protection.salt_value {
            attrs.push(("saltValue", salt));
        }
        let spin_str;
        if protection.spin_count != 0 {
            spin_str = protection.spin_count.to_string();
            attrs.push(("spinCount", &spin_str));
        }
        w.empty_element("sheetProtection", &attrs);
    }

    w.end_element(); // worksheet
    Ok(SheetXml {
        xml: w.finish(),
        text_cell_count: text_cells,
    })
}

fn build_cell_value(t: Option<&str>, v: Option<&str>, inline: Option<&str>, shared_strings: &[String]) -> CellValue {
    match t {
        None => v
            .and_then(|s| s.parse::<f64>().ok())
            .map(CellValue::Number)
            .unwrap_or(CellValue::Empty),
        Some("s") => {
            let idx: usize = v.and_then(|s| s.parse().ok()).unwrap_or(usize::MAX);
            CellValue::Text(shared_strings.get(idx).cloned().unwrap_or_default())
        }
        Some("str") => CellValue::Text(v.unwrap_or_default().to_string()),
        Some("inlineStr") => CellValue::Text(inline.unwrap_or_default().to_string()),
        Some("b") => CellValue::Bool(v == Some("1")),
        Some("e") => CellValue::Error(v.unwrap_or_default().to_string()),
        Some("d") => match v {
            None => CellValue::Empty,
            Some(text) => match text.parse::<f64>() {
                Ok(serial) => CellValue::Date(dateserial::from_serial(serial)),
                Err(_) => parse_iso_datetime(text)
                    .map(CellValue::Date)
                    .unwrap_or(CellValue::Empty),
            },
        },
        // Unknown type attributes: best-effort numeric fallback.
        Some(_) => v
            .and_then(|s| s.parse::<f64>().ok())
            .map(CellValue::Number)
            .unwrap_or(CellValue::Empty),
    }
}

fn parse_iso_datetime(text: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_inline_string(reader: &mut XmlReader) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, .. } if name == "t" => {
                text.push_str(&reader.element_text()?);
            }
            XmlEvent::EndElement { name } if name == "is" => break,
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(text)
}

fn copy_element(reader: &mut XmlReader, w: &mut XmlWriter, name: &str, attrs: &[(String, String)]) -> Result<()> {
    let attr_refs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    w.start_element(name, &attr_refs);
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } => copy_element(reader, w, &name, &attrs)?,
            XmlEvent::EndElement { .. } => break,
            XmlEvent::Characters(text) => {
                w.text(&text);
            }
            XmlEvent::EndDocument => break,
        }
    }
    w.end_element();
    Ok(())
}

fn capture_element(reader: &mut XmlReader, name: &str, attrs: &[(String, String)]) -> Result<String> {
    let mut w = XmlWriter::new();
    copy_element(reader, &mut w, name, attrs)?;
    Ok(w.finish())
}

/// Parses a worksheet XML part into `sheet`, which must already exist with
/// the right name and index (rows/cells are merged in, not replaced).
pub fn read_into(sheet: &mut Sheet, xml: &[u8], shared_strings: &[String]) -> Result<()> {
    let mut reader = XmlReader::new(xml);
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, attrs } => match name.as_str() {
                "row" => {
                    let row_num = attr(&attrs, "r")
                        .and_then(|v| v.parse::<u32>().ok())
                        .map(|n| n.saturating_sub(1))
                        .unwrap_or(0);
                    if let Ok(row) = sheet.row_mut(row_num) {
                        if let Some(ht) = attr(&attrs, "ht").and_then(|v| v.parse::<f64>().ok()) {
                            row.set_height(ht);
                        }
                        if attr(&attrs, "hidden") == Some("1") {
                            row.set_hidden(true);
                        }
                    }
                }
                "c" => read_cell(&mut reader, sheet, &attrs, shared_strings)?,
                "col" => {
                    let min = attr(&attrs, "min").and_then(|v| v.parse::<u32>().ok());
                    let max = attr(&attrs, "max").and_then(|v| v.parse::<u32>().ok());
                    let width = attr(&attrs, "width").and_then(|v| v.parse::<f64>().ok());
                    if let (Some(min), Some(max), Some(width)) = (min, max, width) {
                        for col in min.saturating_sub(1)..max {
                            sheet.set_column_width(col, width);
                        }
                    }
                }
                "mergeCell" => {
                    if let Some(r) = attr(&attrs, "ref") {
                        if let Ok(range) = RangeRef::parse(r) {
                            sheet.merge_cells(range);
                        }
                    }
                }
                "autoFilter" => {
                    if let Some(r) = attr(&attrs, "ref") {
                        if let Ok(range) = RangeRef::parse(r) {
                            sheet.format_mut().auto_filter = Some(AutoFilter { range });
                        }
                    }
                }
                "conditionalFormatting" => {
                    let frag = capture_element(&mut reader, &name, &attrs)?;
                    sheet.format_mut().conditional_formatting.push(frag);
                }
                "dataValidations" => loop {
                    match reader.next_event()? {
                        XmlEvent::StartElement { name, attrs } if name == "dataValidation" => {
                            let frag = capture_element(&mut reader, &name, &attrs)?;
                            sheet.format_mut().data_validations.push(frag);
                        }
                        XmlEvent::EndElement { name } if name == "dataValidations" => break,
                        XmlEvent::EndDocument => break,
                        _ => {}
                    }
                },
                "sheetProtection" => {
                    let protection = sheet.protection_mut();
                    protection.enabled = true;
                    protection.password_hash = attr(&attrs, "hashValue").map(str::to_string);
                    protection.algorithm_name = attr(&attrs, "algorithmName").map(str::to_string);
                    protection.salt_value = attr(&attrs, "saltValue").map(str::to_string);
                    protection.spin_count = attr(&attrs, "spinCount")
                        .and_then(|v| v.parse::<u32>().ok())
                        .unwrap_or(0);
                }
                _ => {}
            },
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(())
}

fn read_cell(
    reader: &mut XmlReader,
    sheet: &mut Sheet,
    attrs: &[(String, String)],
    shared_strings: &[String],
) -> Result<()> {
    let r_attr = match attr(attrs, "r") {
        Some(r) => r,
        None => {
            skip_cell_body(reader)?;
            return Ok(());
        }
    };
    let cell_ref = match CellRef::parse(r_attr) {
        Ok(cr) => cr,
        Err(_) => {
            skip_cell_body(reader)?;
            return Ok(());
        }
    };
    let t_attr = attr(attrs, "t").map(str::to_string);
    let s_attr = attr(attrs, "s").and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);

    let mut v_text: Option<String> = None;
    let mut f_text: Option<String> = None;
    let mut inline_text: Option<String> = None;
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { name, .. } if name == "v" => {
                v_text = Some(reader.element_text()?);
            }
            XmlEvent::StartElement { name, .. } if name == "f" => {
                f_text = Some(reader.element_text()?);
            }
            XmlEvent::StartElement { name, .. } if name == "is" => {
                inline_text = Some(parse_inline_string(reader)?);
            }
            XmlEvent::StartElement { .. } => {
                reader.skip_element()?;
            }
            XmlEvent::EndElement { name } if name == "c" => break,
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    let value = build_cell_value(t_attr.as_deref(), v_text.as_deref(), inline_text.as_deref(), shared_strings);
    let value = match f_text {
        Some(expr) => CellValue::Formula {
            expression: expr,
            cached: Box::new(value),
        },
        None => value,
    };

    let cell = sheet.try_cell(cell_ref.row, cell_ref.col)?;
    cell.set_value(value);
    cell.set_style(s_attr);
    Ok(())
}

fn skip_cell_body(reader: &mut XmlReader) -> Result<()> {
    loop {
        match reader.next_event()? {
            XmlEvent::StartElement { .. } => reader.skip_element()?,
            XmlEvent::EndElement { name } if name == "c" => break,
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sheet;

    #[test]
    fn empty_sheet_has_a1_dimension() {
        let sheet = Sheet::new("Sheet1".to_string(), 0);
        let mut ss = SharedStrings::new();
        let out = to_xml(&sheet, &mut ss).unwrap();
        assert!(out.xml.contains(r#"ref="A1""#));
    }

    #[test]
    fn text_cell_round_trips_through_shared_strings() {
        let mut sheet = Sheet::new("Sheet1".to_string(), 0);
        sheet.cell(0, 0).unwrap().set_text("hello");
        let mut ss = SharedStrings::new();
        let out = to_xml(&sheet, &mut ss).unwrap();
        assert_eq!(out.text_cell_count, 1);
        assert_eq!(ss.get(0), Some("hello"));

        let shared: Vec<String> = ss.iter().map(str::to_string).collect();
        let mut parsed = Sheet::new("Sheet1".to_string(), 0);
        read_into(&mut parsed, out.xml.as_bytes(), &shared).unwrap();
        assert_eq!(parsed.get_cell(0, 0).unwrap().value().as_text(), "hello");
    }

    #[test]
    fn formula_cached_number_round_trips() {
        let mut sheet = Sheet::new("Sheet1".to_string(), 0);
        sheet.cell(0, 0).unwrap().set_formula("A1+A2".to_string(), CellValue::Number(3.0));
        let mut ss = SharedStrings::new();
        let out = to_xml(&sheet, &mut ss).unwrap();

        let mut parsed = Sheet::new("Sheet1".to_string(), 0);
        read_into(&mut parsed, out.xml.as_bytes(), &[]).unwrap();
        match parsed.get_cell(0, 0).unwrap().value() {
            CellValue::Formula { expression, cached } => {
                assert_eq!(expression, "A1+A2");
                assert_eq!(cached.as_number(), 3.0);
            }
            other => panic!("expected formula, got {other:?}"),
        }
    }

    #[test]
    fn merge_cells_round_trip() {
        let mut sheet = Sheet::new("Sheet1".to_string(), 0);
        sheet.merge_cells(RangeRef::parse("A1:B2").unwrap());
        let mut ss = SharedStrings::new();
        let out = to_xml(&sheet, &mut ss).unwrap();

        let mut parsed = Sheet::new("Sheet1".to_string(), 0);
        read_into(&mut parsed, out.xml.as_bytes(), &[]).unwrap();
        assert_eq!(parsed.format().merged_ranges.len(), 1);
    }

    #[test]
    fn sheets_past_the_spill_threshold_round_trip_through_row_spill() {
        let mut sheet = Sheet::new("Sheet1".to_string(), 0);
        for row in 0..=SPILL_ROW_THRESHOLD as u32 {
            sheet.cell(row, 0).unwrap().set_number(row as f64);
        }
        sheet
            .cell(SPILL_ROW_THRESHOLD as u32, 1)
            .unwrap()
            .set_formula("A1+A2", CellValue::Text("cached".to_string()));

        let mut ss = SharedStrings::new();
        let out = to_xml(&sheet, &mut ss).unwrap();
        assert_eq!(out.text_cell_count, 1);

        let mut parsed = Sheet::new("Sheet1".to_string(), 0);
        let shared: Vec<String> = ss.iter().map(str::to_string).collect();
        read_into(&mut parsed, out.xml.as_bytes(), &shared).unwrap();

        assert_eq!(parsed.row_count(), SPILL_ROW_THRESHOLD + 1);
        assert_eq!(parsed.get_cell(0, 0).unwrap().value().as_number(), 0.0);
        assert_eq!(
            parsed
                .get_cell(SPILL_ROW_THRESHOLD as u32, 0)
                .unwrap()
                .value()
                .as_number(),
            SPILL_ROW_THRESHOLD as f64
        );
        match parsed.get_cell(SPILL_ROW_THRESHOLD as u32, 1).unwrap().value() {
            CellValue::Formula { expression, cached } => {
                assert_eq!(expression, "A1+A2");
                assert_eq!(cached.as_text(), "cached");
            }
            other => panic!("expected formula, got {other:?}"),
        }
    }
}
