//! Streaming spreadsheet writer
//!
//! The writer tracks a `(worksheet, row, col)` cursor, buffers the cells of
//! the current row and hands each finished row to a codec [`CellSink`].

use chrono::NaiveDateTime;

use crate::error::{Result, SheetError};
use crate::types::CellValue;
use crate::value::{CellEmitter, WriteValue};

/// One buffered cell of a row
#[derive(Debug, Clone, PartialEq)]
pub struct CellEntry {
    pub col: u32,
    pub value: CellValue,
    /// Number format pattern of a date cell, such as `yyyy-MM-dd`
    pub pattern: Option<String>,
}

/// Codec side of a writer
pub trait CellSink {
    /// Open a worksheet; rows written afterwards belong to it
    fn start_worksheet(&mut self, name: &str) -> Result<()>;

    /// Write one row. Cells arrive in ascending column order.
    fn write_row(&mut self, row: u32, cells: &[CellEntry]) -> Result<()>;

    /// Encode whatever is still buffered and flush the output. Called once.
    fn finish(&mut self) -> Result<()>;
}

/// Spreadsheet writer with row-by-row buffering
///
/// # Examples
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut writer = sheetstream::create_path("report.xlsx")?;
/// writer.start_worksheet("Orders")?;
/// writer.write(&("Order", "Quantity", "Paid"))?.next_row()?;
/// writer.write(&("A-100", 3, true))?.next_row()?;
/// writer.close()?;
/// # Ok(())
/// # }
/// ```
pub struct SpreadsheetWriter<'a> {
    sink: Box<dyn CellSink + 'a>,
    sheet: Option<String>,
    row: u32,
    col: u32,
    started: u32,
    pending: Vec<CellEntry>,
    closed: bool,
}

impl<'a> SpreadsheetWriter<'a> {
    pub fn new(sink: Box<dyn CellSink + 'a>) -> Self {
        SpreadsheetWriter {
            sink,
            sheet: None,
            row: 0,
            col: 0,
            started: 0,
            pending: Vec::new(),
            closed: false,
        }
    }

    /// Start a worksheet named `sheetN`, N counting from 1
    pub fn start(&mut self) -> Result<&mut Self> {
        let name = format!("sheet{}", self.started + 1);
        self.start_worksheet(&name)
    }

    /// Start or reopen the worksheet `name` at row 0, column 0
    pub fn start_worksheet(&mut self, name: &str) -> Result<&mut Self> {
        self.ensure_open()?;
        self.flush_row()?;
        self.sink.start_worksheet(name)?;
        log::debug!("writing worksheet '{}'", name);

        self.sheet = Some(name.to_string());
        self.started += 1;
        self.row = 0;
        self.col = 0;
        Ok(self)
    }

    /// Write a value at the cursor.
    ///
    /// Sequences and tuples write one cell per element. See [`WriteValue`]
    /// for the accepted types.
    pub fn write<V: WriteValue + ?Sized>(&mut self, value: &V) -> Result<&mut Self> {
        self.ensure_writable()?;
        value.write_to(self)?;
        Ok(self)
    }

    /// Write a date with an explicit pattern such as `dd/MM/yyyy`
    pub fn write_date(&mut self, value: NaiveDateTime, pattern: &str) -> Result<&mut Self> {
        self.emit_date(value, pattern)?;
        Ok(self)
    }

    pub fn write_blank(&mut self) -> Result<&mut Self> {
        self.emit_blank()?;
        Ok(self)
    }

    /// Flush the current row and move to column 0 of the next one
    pub fn next_row(&mut self) -> Result<&mut Self> {
        self.ensure_writable()?;
        self.flush_row()?;
        self.row += 1;
        self.col = 0;
        Ok(self)
    }

    pub fn worksheet_name(&self) -> Option<&str> {
        self.sheet.as_deref()
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flush the partial row and finalise the output.
    ///
    /// The underlying stream is flushed but not closed. Later calls do
    /// nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let flushed = self.flush_row();
        let finished = self.sink.finish();
        flushed.and(finished)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SheetError::IllegalState("writer is closed".to_string()));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.sheet.is_none() {
            return Err(SheetError::IllegalState(
                "no worksheet started, call start() first".to_string(),
            ));
        }
        Ok(())
    }

    fn push(&mut self, value: CellValue, pattern: Option<&str>) -> Result<()> {
        self.ensure_writable()?;
        self.pending.push(CellEntry {
            col: self.col,
            value,
            pattern: pattern.map(str::to_string),
        });
        self.col += 1;
        Ok(())
    }

    fn flush_row(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let cells = std::mem::take(&mut self.pending);
        self.sink.write_row(self.row, &cells)
    }
}

impl CellEmitter for SpreadsheetWriter<'_> {
    fn emit_bool(&mut self, value: bool) -> Result<()> {
        self.push(CellValue::Bool(value), None)
    }

    fn emit_int(&mut self, value: i64) -> Result<()> {
        self.push(CellValue::Int(value), None)
    }

    fn emit_float(&mut self, value: f64) -> Result<()> {
        self.push(CellValue::Float(value), None)
    }

    fn emit_date(&mut self, value: NaiveDateTime, pattern: &str) -> Result<()> {
        self.push(CellValue::DateTime(value), Some(pattern))
    }

    fn emit_text(&mut self, value: &str) -> Result<()> {
        self.push(CellValue::String(value.to_string()), None)
    }

    fn emit_blank(&mut self) -> Result<()> {
        self.push(CellValue::Empty, None)
    }
}

impl Drop for SpreadsheetWriter<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close spreadsheet writer on drop: {}", e);
        }
    }
}

impl std::fmt::Debug for SpreadsheetWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpreadsheetWriter")
            .field("sheet", &self.sheet)
            .field("row", &self.row)
            .field("col", &self.col)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::value::Formatted;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Sheet(String),
        Row(u32, Vec<CellEntry>),
        Finish,
    }

    /// Sink recording every call it receives
    #[derive(Default, Clone)]
    pub(crate) struct Recorder(pub(crate) Rc<RefCell<Vec<Call>>>);

    impl CellSink for Recorder {
        fn start_worksheet(&mut self, name: &str) -> Result<()> {
            self.0.borrow_mut().push(Call::Sheet(name.to_string()));
            Ok(())
        }

        fn write_row(&mut self, row: u32, cells: &[CellEntry]) -> Result<()> {
            self.0.borrow_mut().push(Call::Row(row, cells.to_vec()));
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.0.borrow_mut().push(Call::Finish);
            Ok(())
        }
    }

    fn entry(col: u32, value: CellValue) -> CellEntry {
        CellEntry {
            col,
            value,
            pattern: None,
        }
    }

    #[test]
    fn test_rows_are_buffered_and_flushed() {
        let recorder = Recorder::default();
        let mut writer = SpreadsheetWriter::new(Box::new(recorder.clone()));
        writer.start().unwrap();
        writer.write(&(true, 42, "hello")).unwrap();
        assert_eq!(writer.col(), 3);
        assert_eq!(recorder.0.borrow().len(), 1);

        writer.next_row().unwrap().write(&None::<i32>).unwrap();
        writer.close().unwrap();

        assert_eq!(
            *recorder.0.borrow(),
            vec![
                Call::Sheet("sheet1".into()),
                Call::Row(
                    0,
                    vec![
                        entry(0, CellValue::Bool(true)),
                        entry(1, CellValue::Int(42)),
                        entry(2, CellValue::String("hello".into())),
                    ]
                ),
                Call::Row(1, vec![entry(0, CellValue::Empty)]),
                Call::Finish,
            ]
        );
    }

    #[test]
    fn test_worksheet_naming_and_reset() {
        let recorder = Recorder::default();
        let mut writer = SpreadsheetWriter::new(Box::new(recorder.clone()));
        writer.start().unwrap().write(&1).unwrap().next_row().unwrap();
        writer.start_worksheet("Totals").unwrap();
        assert_eq!((writer.row(), writer.col()), (0, 0));
        writer.start().unwrap();
        assert_eq!(writer.worksheet_name(), Some("sheet3"));

        let sheets: Vec<_> = recorder
            .0
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Sheet(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(sheets, vec!["sheet1", "Totals", "sheet3"]);
    }

    #[test]
    fn test_dates_carry_patterns() {
        let recorder = Recorder::default();
        let mut writer = SpreadsheetWriter::new(Box::new(recorder.clone()));
        let at = NaiveDate::from_ymd_opt(2023, 7, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        writer.start().unwrap();
        writer.write_date(at, "dd/MM/yyyy").unwrap();
        writer.write(&at).unwrap();
        writer
            .write(&Formatted {
                value: at,
                pattern: "HH:mm",
            })
            .unwrap();
        writer.close().unwrap();

        let calls = recorder.0.borrow();
        let Call::Row(0, cells) = &calls[1] else {
            panic!("expected a row, got {:?}", calls[1]);
        };
        let patterns: Vec<_> = cells.iter().map(|c| c.pattern.as_deref()).collect();
        assert_eq!(
            patterns,
            vec![Some("dd/MM/yyyy"), Some("yyyy-MM-dd HH:mm:ss"), Some("HH:mm")]
        );
    }

    #[test]
    fn test_write_before_start_is_illegal() {
        let mut writer = SpreadsheetWriter::new(Box::new(Recorder::default()));
        assert!(matches!(writer.write(&1), Err(SheetError::IllegalState(_))));
        assert!(matches!(writer.write_blank(), Err(SheetError::IllegalState(_))));
        assert!(matches!(writer.next_row(), Err(SheetError::IllegalState(_))));
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let recorder = Recorder::default();
        let mut writer = SpreadsheetWriter::new(Box::new(recorder.clone()));
        writer.start().unwrap().write("partial").unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());
        assert!(matches!(writer.write(&1), Err(SheetError::IllegalState(_))));
        assert!(matches!(writer.start(), Err(SheetError::IllegalState(_))));
        drop(writer);

        let calls = recorder.0.borrow();
        assert_eq!(calls.iter().filter(|c| **c == Call::Finish).count(), 1);
        assert!(matches!(calls[1], Call::Row(0, _)));
    }

    #[test]
    fn test_drop_finishes_output() {
        let recorder = Recorder::default();
        {
            let mut writer = SpreadsheetWriter::new(Box::new(recorder.clone()));
            writer.start().unwrap().write(&[1, 2]).unwrap();
        }
        assert_eq!(recorder.0.borrow().last(), Some(&Call::Finish));
    }
}
