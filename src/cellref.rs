//! A1-style cell and range reference parsing and formatting.
//!
//! Columns are 0-based internally (`A` = 0); rows are 0-based internally as
//! well, with the on-disk `A1` text always 1-based.

use crate::error::{Error, Result};

/// Converts a 0-based column index to its base-26 letter form (`A`, `B`, ..., `AA`, ...).
pub fn column_index_to_name(col: u32) -> String {
    let mut col = col + 1; // work in 1-based terms for the carry arithmetic
    let mut name = Vec::new();
    while col > 0 {
        col -= 1; // off-by-one carry: base-26 has no zero digit
        let digit = (col % 26) as u8;
        name.push(b'A' + digit);
        col /= 26;
    }
    name.reverse();
    String::from_utf8(name).expect("ASCII letters are valid UTF-8")
}

/// Parses a base-26 column letter sequence (case-insensitive) into a 0-based index.
pub fn column_name_to_index(name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let mut result: u32 = 0;
    for ch in name.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        result = result.checked_mul(26)?.checked_add(digit)?;
    }
    Some(result - 1)
}

/// A single cell reference, e.g. `A1`. Coordinates are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parses an `A1`-style reference, tolerating mixed case and a leading
    /// `$` on either component.
    pub fn parse(text: &str) -> Result<Self> {
        let (col_str, row_str) = split_ref(text).ok_or_else(|| Error::InvalidCellRef {
            text: text.to_string(),
        })?;
        let col = column_name_to_index(col_str).ok_or_else(|| Error::InvalidCellRef {
            text: text.to_string(),
        })?;
        let row: u32 = row_str.parse().map_err(|_| Error::InvalidCellRef {
            text: text.to_string(),
        })?;
        if row == 0 {
            return Err(Error::InvalidCellRef {
                text: text.to_string(),
            });
        }
        Ok(CellRef { row: row - 1, col })
    }

    pub fn to_a1(self) -> String {
        format!("{}{}", column_index_to_name(self.col), self.row + 1)
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// A rectangular cell range, e.g. `A1:B10`. A single cell parses as a
/// degenerate range where `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRef {
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeRef {
    pub fn new(start: CellRef, end: CellRef) -> Result<Self> {
        if start.row > end.row || start.col > end.col {
            return Err(Error::InvalidRangeRef {
                text: format!("{start}:{end}"),
            });
        }
        Ok(Self { start, end })
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text.split_once(':') {
            Some((a, b)) => {
                let start = CellRef::parse(a).map_err(|_| Error::InvalidRangeRef {
                    text: text.to_string(),
                })?;
                let end = CellRef::parse(b).map_err(|_| Error::InvalidRangeRef {
                    text: text.to_string(),
                })?;
                RangeRef::new(start, end)
            }
            None => {
                let cell = CellRef::parse(text).map_err(|_| Error::InvalidRangeRef {
                    text: text.to_string(),
                })?;
                Ok(RangeRef {
                    start: cell,
                    end: cell,
                })
            }
        }
    }

    pub fn to_a1(self) -> String {
        if self.start == self.end {
            self.start.to_a1()
        } else {
            format!("{}:{}", self.start.to_a1(), self.end.to_a1())
        }
    }
}

impl std::fmt::Display for RangeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Splits `$AB$12` into (`"AB"`, `"12"`), tolerating an optional leading `$`
/// on each component.
fn split_ref(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('$').unwrap_or(text);
    let split_at = text.find(|c: char| c.is_ascii_digit())?;
    let (mut col, mut row) = text.split_at(split_at);
    if col.is_empty() || row.is_empty() {
        return None;
    }
    row = row.strip_prefix('$').unwrap_or(row);
    if row.starts_with('$') {
        return None;
    }
    col = col.strip_suffix('$').unwrap_or(col);
    Some((col, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_round_trip() {
        for &(idx, name) in &[(0u32, "A"), (25, "Z"), (26, "AA"), (701, "ZZ"), (702, "AAA")] {
            assert_eq!(column_index_to_name(idx), name);
            assert_eq!(column_name_to_index(name), Some(idx));
        }
    }

    #[test]
    fn parses_plain_reference() {
        let r = CellRef::parse("B3").unwrap();
        assert_eq!(r, CellRef::new(2, 1));
        assert_eq!(r.to_a1(), "B3");
    }

    #[test]
    fn parses_mixed_case_and_dollar_anchors() {
        assert_eq!(CellRef::parse("$a$1").unwrap(), CellRef::new(0, 0));
        assert_eq!(CellRef::parse("$A1").unwrap(), CellRef::new(0, 0));
        assert_eq!(CellRef::parse("A$1").unwrap(), CellRef::new(0, 0));
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(CellRef::parse("1A").is_err());
        assert!(CellRef::parse("A0").is_err());
        assert!(CellRef::parse("").is_err());
    }

    #[test]
    fn single_cell_range_is_degenerate() {
        let r = RangeRef::parse("C5").unwrap();
        assert_eq!(r.start, r.end);
        assert_eq!(r.to_a1(), "C5");
    }

    #[test]
    fn parses_full_range() {
        let r = RangeRef::parse("A1:B10").unwrap();
        assert_eq!(r.start, CellRef::new(0, 0));
        assert_eq!(r.end, CellRef::new(9, 1));
        assert_eq!(r.to_a1(), "A1:B10");
    }

    #[test]
    fn rejects_inverted_range() {
        let err = RangeRef::new(CellRef::new(5, 0), CellRef::new(0, 0));
        assert!(err.is_err());
    }
}
