//! End-to-end save/reopen scenarios against the public `Workbook` API.

use xlsxcore::model::{CellValue, Workbook};

#[test]
fn basic_cell_values_round_trip_through_a_saved_file() {
    let mut wb = Workbook::new();
    let idx = wb.add_sheet("Data").unwrap();
    {
        let sheet = wb.get_sheet_mut(idx).unwrap();
        sheet.cell(0, 0).unwrap().set_text("Hello");
        sheet.cell(0, 1).unwrap().set_number(123.45);
        sheet.cell(1, 0).unwrap().set_bool(true);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.xlsx");
    wb.save(&path).unwrap();

    let reopened = Workbook::open(&path, None).unwrap();
    let sheet = reopened.get_sheet_by_name("Data").unwrap();
    assert_eq!(sheet.get_cell(0, 0).unwrap().value().as_text(), "Hello");
    assert_eq!(sheet.get_cell(0, 1).unwrap().value().as_number(), 123.45);
    assert!(sheet.get_cell(1, 0).unwrap().value().as_bool());
}

#[test]
fn shared_string_insertion_dedups_and_reports_table_length() {
    let mut wb = Workbook::new();
    let a = wb.add_shared_string("Hello").unwrap();
    let b = wb.add_shared_string("World").unwrap();
    let c = wb.add_shared_string("Hello").unwrap();

    assert_eq!((a, b, c), (0, 1, 0));
    assert_eq!(wb.shared_strings().len(), 2);
}

#[test]
fn header_and_data_rows_round_trip_with_mixed_types() {
    let mut wb = Workbook::new();
    let idx = wb.add_sheet("People").unwrap();
    {
        let sheet = wb.get_sheet_mut(idx).unwrap();
        sheet.cell(0, 0).unwrap().set_text("Name");
        sheet.cell(0, 1).unwrap().set_text("Age");
        sheet.cell(1, 0).unwrap().set_text("Alice");
        sheet.cell(1, 1).unwrap().set_number(30.0);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.xlsx");
    wb.save(&path).unwrap();

    let reopened = Workbook::open(&path, None).unwrap();
    let sheet = reopened.get_sheet(0).unwrap();
    assert_eq!(sheet.get_cell(1, 0).unwrap().value().as_text(), "Alice");
    assert_eq!(sheet.get_cell(1, 1).unwrap().value().as_number(), 30.0);
}

#[test]
fn empty_sheet_round_trips_to_an_empty_sheet() {
    let mut wb = Workbook::new();
    wb.add_sheet("Blank").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.xlsx");
    wb.save(&path).unwrap();

    let reopened = Workbook::open(&path, None).unwrap();
    let sheet = reopened.get_sheet_by_name("Blank").unwrap();
    assert_eq!(sheet.row_count(), 0);
}

#[test]
fn merged_ranges_and_formula_cached_values_round_trip() {
    use xlsxcore::cellref::RangeRef;

    let mut wb = Workbook::new();
    let idx = wb.add_sheet("Sheet1").unwrap();
    {
        let sheet = wb.get_sheet_mut(idx).unwrap();
        sheet.cell(0, 0).unwrap().set_number(1.0);
        sheet.cell(0, 1).unwrap().set_number(2.0);
        sheet
            .cell(0, 2)
            .unwrap()
            .set_formula("A1+B1", CellValue::Number(3.0));
        sheet.merge_cells(RangeRef::parse("A1:B1").unwrap());
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("merged.xlsx");
    wb.save(&path).unwrap();

    let reopened = Workbook::open(&path, None).unwrap();
    let sheet = reopened.get_sheet(0).unwrap();
    assert_eq!(sheet.get_cell(0, 2).unwrap().value().as_number(), 3.0);
}

#[test]
fn duplicate_sheet_names_are_rejected_case_insensitively() {
    let mut wb = Workbook::new();
    wb.add_sheet("Sheet1").unwrap();
    assert!(wb.add_sheet("sheet1").is_err());
}
