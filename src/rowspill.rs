//! An append-only, file-backed row log used by the writer to bound memory
//! on very large sheets.
//!
//! Rows are serialized to a fixed binary frame as they are appended; once
//! [`RowSpill::seal`] is called the file switches to read-only and rows can
//! be streamed back out in order via [`RowSpill::for_each_row`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::model::{Cell, CellValue, Row};

const TAG_EMPTY: u8 = 0;
const TAG_TEXT: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_DATE: u8 = 4;
const TAG_FORMULA: u8 = 5;
const TAG_ERROR: u8 = 6;

/// A single spilled row, owned independently of any `Sheet`.
#[derive(Debug, Clone)]
pub struct SpilledRow {
    pub row_num: i32,
    pub height: f64,
    pub custom_height: bool,
    pub hidden: bool,
    pub cells: Vec<SpilledCell>,
}

#[derive(Debug, Clone)]
pub struct SpilledCell {
    pub column: i32,
    pub style: i32,
    pub value: CellValue,
}

enum SpillFile {
    Open(BufWriter<NamedTempFile>),
    Sealed(BufReader<File>),
    Transitioning,
}

/// The append-only row log.
pub struct RowSpill {
    file: SpillFile,
    count: usize,
}

impl RowSpill {
    pub fn new() -> Result<Self> {
        let tmp = NamedTempFile::new()?;
        Ok(RowSpill {
            file: SpillFile::Open(BufWriter::new(tmp)),
            count: 0,
        })
    }

    /// Appends one row's frame to the log. Fails if the log has already
    /// been sealed.
    pub fn append(&mut self, row: &Row) -> Result<()> {
        let writer = match &mut self.file {
            SpillFile::Open(w) => w,
            SpillFile::Sealed(_) | SpillFile::Transitioning => {
                return Err(Error::Other("row spill is sealed".to_string()));
            }
        };
        write_row_frame(writer, row)?;
        self.count += 1;
        Ok(())
    }

    /// Flushes pending writes and switches the log to read-only.
    pub fn seal(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.file, SpillFile::Transitioning) {
            SpillFile::Open(mut w) => {
                w.flush()?;
                let tmp = w.into_inner().map_err(|e| e.into_error())?;
                let mut file = tmp.reopen()?;
                file.seek(SeekFrom::Start(0))?;
                self.file = SpillFile::Sealed(BufReader::new(file));
            }
            sealed @ SpillFile::Sealed(_) => self.file = sealed,
            SpillFile::Transitioning => unreachable!(),
        }
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.file, SpillFile::Sealed(_))
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Streams rows forward from the start of the log, calling `visitor`
    /// for each. Iteration halts as soon as `visitor` returns `false`.
    /// Fails if the log is not sealed.
    pub fn for_each_row(&mut self, mut visitor: impl FnMut(&SpilledRow) -> bool) -> Result<()> {
        let reader = match &mut self.file {
            SpillFile::Sealed(r) => r,
            SpillFile::Open(_) | SpillFile::Transitioning => {
                return Err(Error::Other(
                    "row spill must be sealed before reading".to_string(),
                ));
            }
        };
        reader.seek(SeekFrom::Start(0))?;
        for _ in 0..self.count {
            let row = read_row_frame(reader)?;
            if !visitor(&row) {
                break;
            }
        }
        Ok(())
    }
}

// `NamedTempFile`'s own `Drop` removes the backing file unconditionally,
// so `RowSpill` needs no explicit cleanup of its own.

fn write_len_prefixed(w: &mut impl Write, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    w.write_all(&(bytes.len() as i32).to_le_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_len_prefixed(r: &mut impl Read) -> Result<String> {
    let len = read_i32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| Error::Parse(e.to_string()))
}

fn read_i32(r: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn write_row_frame(w: &mut impl Write, row: &Row) -> Result<()> {
    w.write_all(&(row.row_num() as i32).to_le_bytes())?;
    w.write_all(&row.height().to_le_bytes())?;
    w.write_all(&[row.custom_height() as u8])?;
    w.write_all(&[row.hidden() as u8])?;
    w.write_all(&(row.cell_count() as i32).to_le_bytes())?;
    for cell in row.cells() {
        write_cell_frame(w, cell)?;
    }
    Ok(())
}

fn write_cell_frame(w: &mut impl Write, cell: &Cell) -> Result<()> {
    w.write_all(&(cell.column() as i32).to_le_bytes())?;
    w.write_all(&(cell.style() as i32).to_le_bytes())?;
    write_cell_value(w, cell.value())
}

/// Writes a single tagged `CellValue`, recursing once into a formula's
/// cached result so it survives the spill round-trip too.
fn write_cell_value(w: &mut impl Write, value: &CellValue) -> Result<()> {
    match value {
        CellValue::Empty => {
            w.write_all(&[TAG_EMPTY])?;
        }
        CellValue::Text(s) => {
            w.write_all(&[TAG_TEXT])?;
            write_len_prefixed(w, s)?;
        }
        CellValue::Number(n) => {
            w.write_all(&[TAG_NUMBER])?;
            w.write_all(&n.to_le_bytes())?;
        }
        CellValue::Bool(b) => {
            w.write_all(&[TAG_BOOL])?;
            w.write_all(&[*b as u8])?;
        }
        CellValue::Date(dt) => {
            w.write_all(&[TAG_DATE])?;
            write_len_prefixed(w, &dt.format("%Y-%m-%dT%H:%M:%S").to_string())?;
        }
        CellValue::Formula { expression, cached } => {
            w.write_all(&[TAG_FORMULA])?;
            write_len_prefixed(w, expression)?;
            write_cell_value(w, cached)?;
        }
        CellValue::Error(code) => {
            w.write_all(&[TAG_ERROR])?;
            write_len_prefixed(w, code)?;
        }
    }
    Ok(())
}

fn read_row_frame(r: &mut impl Read) -> Result<SpilledRow> {
    let row_num = read_i32(r)?;
    let height = read_f64(r)?;
    let mut flag = [0u8; 1];
    r.read_exact(&mut flag)?;
    let custom_height = flag[0] != 0;
    r.read_exact(&mut flag)?;
    let hidden = flag[0] != 0;
    let cell_count = read_i32(r)? as usize;
    let mut cells = Vec::with_capacity(cell_count);
    for _ in 0..cell_count {
        cells.push(read_cell_frame(r)?);
    }
    Ok(SpilledRow {
        row_num,
        height,
        custom_height,
        hidden,
        cells,
    })
}

fn read_cell_frame(r: &mut impl Read) -> Result<SpilledCell> {
    let column = read_i32(r)?;
    let style = read_i32(r)?;
    let value = read_cell_value(r)?;
    Ok(SpilledCell {
        column,
        style,
        value,
    })
}

fn read_cell_value(r: &mut impl Read) -> Result<CellValue> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    Ok(match tag[0] {
        TAG_EMPTY => CellValue::Empty,
        TAG_TEXT => CellValue::Text(read_len_prefixed(r)?),
        TAG_NUMBER => CellValue::Number(read_f64(r)?),
        TAG_BOOL => {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            CellValue::Bool(b[0] != 0)
        }
        TAG_DATE => {
            let s = read_len_prefixed(r)?;
            let dt = chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S")
                .map_err(|e| Error::Parse(e.to_string()))?;
            CellValue::Date(dt)
        }
        TAG_FORMULA => {
            let expression = read_len_prefixed(r)?;
            let cached = Box::new(read_cell_value(r)?);
            CellValue::Formula { expression, cached }
        }
        TAG_ERROR => CellValue::Error(read_len_prefixed(r)?),
        other => return Err(Error::Parse(format!("unknown cell tag {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sheet;

    #[test]
    fn round_trips_rows_through_spill() -> Result<()> {
        let mut sheet = Sheet::new("S".into(), 0);
        sheet.cell(0, 0)?.set_text("hello");
        sheet.cell(0, 1)?.set_number(3.25);
        sheet.cell(1, 0)?.set_bool(true);

        let mut spill = RowSpill::new()?;
        for row in sheet.rows() {
            spill.append(row)?;
        }
        spill.seal()?;

        let mut seen = Vec::new();
        spill.for_each_row(|row| {
            seen.push(row.row_num);
            true
        })?;
        assert_eq!(seen, vec![0, 1]);
        Ok(())
    }

    #[test]
    fn for_each_row_halts_when_visitor_returns_false() -> Result<()> {
        let mut sheet = Sheet::new("S".into(), 0);
        for r in 0..5 {
            sheet.cell(r, 0)?.set_number(r as f64);
        }
        let mut spill = RowSpill::new()?;
        for row in sheet.rows() {
            spill.append(row)?;
        }
        spill.seal()?;

        let mut seen = 0;
        spill.for_each_row(|_| {
            seen += 1;
            seen < 2
        })?;
        assert_eq!(seen, 2);
        Ok(())
    }

    #[test]
    fn append_after_seal_fails() -> Result<()> {
        let mut spill = RowSpill::new()?;
        spill.seal()?;
        let row = {
            let mut s = Sheet::new("S".into(), 0);
            s.cell(0, 0)?;
            s.get_row(0).unwrap().clone()
        };
        assert!(spill.append(&row).is_err());
        Ok(())
    }

    #[test]
    fn formula_cached_value_survives_the_spill() -> Result<()> {
        let mut sheet = Sheet::new("S".into(), 0);
        sheet
            .cell(0, 0)?
            .set_formula("A2+A3", CellValue::Number(5.0));

        let mut spill = RowSpill::new()?;
        for row in sheet.rows() {
            spill.append(row)?;
        }
        spill.seal()?;

        let mut cached = None;
        spill.for_each_row(|row| {
            cached = row.cells.first().map(|c| c.value.clone());
            true
        })?;
        match cached {
            Some(CellValue::Formula { expression, cached }) => {
                assert_eq!(expression, "A2+A3");
                assert_eq!(*cached, CellValue::Number(5.0));
            }
            other => panic!("expected a spilled formula cell, got {other:?}"),
        }
        Ok(())
    }
}
