//! Integration-level CellRef/RangeRef property checks not already covered
//! by the inline unit tests in `src/cellref.rs`.

use proptest::prelude::*;
use xlsxcore::cellref::{column_index_to_name, column_name_to_index, CellRef, RangeRef};
use xlsxcore::model::MAX_COL;

#[test]
fn a1_c3_range_parses_to_the_expected_bounds_and_membership() {
    let range = RangeRef::parse("A1:C3").unwrap();
    assert_eq!(range.start, CellRef::new(0, 0));
    assert_eq!(range.end, CellRef::new(2, 2));
    assert_eq!(range.to_a1(), "A1:C3");
    assert!(contains(&range, 2, 2));
    assert!(!contains(&range, 3, 0));
}

fn contains(range: &RangeRef, row: u32, col: u32) -> bool {
    row >= range.start.row && row <= range.end.row && col >= range.start.col && col <= range.end.col
}

proptest! {
    #[test]
    fn column_letters_round_trip_for_any_in_range_index(col in 0u32..=MAX_COL) {
        let name = column_index_to_name(col);
        prop_assert_eq!(column_name_to_index(&name), Some(col));
    }

    #[test]
    fn cell_references_round_trip_for_any_in_range_coordinate(
        row in 0u32..1_048_576u32,
        col in 0u32..=MAX_COL,
    ) {
        let cell = CellRef::new(row, col);
        let text = cell.to_a1();
        prop_assert_eq!(CellRef::parse(&text).unwrap(), cell);
    }
}
