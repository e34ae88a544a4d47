//! Parser events and the cursor they describe

use crate::error::{Result, SheetError};
use crate::types::CellValue;
use std::fmt;

/// Events reported by [`SpreadsheetParser::advance`](crate::SpreadsheetParser::advance).
///
/// Events nest strictly: a workbook holds worksheets, a worksheet holds
/// records and a record holds cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Event {
    /// Nothing has been read yet
    NotStarted,
    StartWorkbook,
    StartWorksheet,
    StartRecord,
    StartCell,
    EndCell,
    EndRecord,
    EndWorksheet,
    EndWorkbook,
    /// The input ended before the workbook was closed
    Eof,
}

impl Event {
    /// Events for which the current worksheet is defined
    pub fn in_worksheet(self) -> bool {
        matches!(
            self,
            Event::StartWorksheet
                | Event::StartRecord
                | Event::StartCell
                | Event::EndCell
                | Event::EndRecord
                | Event::EndWorksheet
        )
    }

    /// Events for which the current row is defined
    pub fn in_record(self) -> bool {
        matches!(
            self,
            Event::StartRecord | Event::StartCell | Event::EndCell | Event::EndRecord
        )
    }

    /// Events for which the current column and value are defined
    pub fn in_cell(self) -> bool {
        matches!(self, Event::StartCell | Event::EndCell)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Current parser position: the last event and its attributes.
///
/// Only [`SpreadsheetParser::advance`](crate::SpreadsheetParser::advance)
/// updates it. Each getter fails with `IllegalState` when the current event
/// is outside the getter's domain.
#[derive(Debug, Clone)]
pub struct Cursor {
    pub(crate) event: Event,
    pub(crate) worksheet_index: Option<usize>,
    pub(crate) worksheet_name: Option<String>,
    pub(crate) row: Option<u32>,
    pub(crate) col: Option<u32>,
    pub(crate) value: Option<CellValue>,
}

impl Cursor {
    pub(crate) fn new() -> Self {
        Cursor {
            event: Event::NotStarted,
            worksheet_index: None,
            worksheet_name: None,
            row: None,
            col: None,
            value: None,
        }
    }

    pub fn event(&self) -> Event {
        self.event
    }

    pub fn worksheet_index(&self) -> Result<usize> {
        self.check(self.event.in_worksheet(), "worksheet index")?;
        self.worksheet_index
            .ok_or_else(|| self.illegal("worksheet index"))
    }

    pub fn worksheet_name(&self) -> Result<&str> {
        self.check(self.event.in_worksheet(), "worksheet name")?;
        self.worksheet_name
            .as_deref()
            .ok_or_else(|| self.illegal("worksheet name"))
    }

    pub fn row(&self) -> Result<u32> {
        self.check(self.event.in_record(), "row")?;
        self.row.ok_or_else(|| self.illegal("row"))
    }

    pub fn col(&self) -> Result<u32> {
        self.check(self.event.in_cell(), "column")?;
        self.col.ok_or_else(|| self.illegal("column"))
    }

    pub fn value(&self) -> Result<&CellValue> {
        self.check(self.event.in_cell(), "value")?;
        self.value.as_ref().ok_or_else(|| self.illegal("value"))
    }

    /// Move the value out at `EndCell`; the record assembler owns it from then on
    pub(crate) fn take_value(&mut self) -> Result<CellValue> {
        self.check(self.event == Event::EndCell, "value")?;
        self.value.take().ok_or_else(|| self.illegal("value"))
    }

    fn check(&self, legal: bool, attribute: &str) -> Result<()> {
        if legal {
            Ok(())
        } else {
            Err(self.illegal(attribute))
        }
    }

    fn illegal(&self, attribute: &str) -> SheetError {
        SheetError::IllegalState(format!("{} is not available at {}", attribute, self.event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_domains() {
        assert!(!Event::StartWorkbook.in_worksheet());
        assert!(!Event::EndWorkbook.in_worksheet());
        assert!(!Event::Eof.in_worksheet());
        assert!(Event::EndWorksheet.in_worksheet());
        assert!(Event::EndRecord.in_record());
        assert!(!Event::StartWorksheet.in_record());
        assert!(Event::EndCell.in_cell());
        assert!(!Event::EndRecord.in_cell());
    }

    #[test]
    fn test_fresh_cursor_rejects_attributes() {
        let cursor = Cursor::new();
        assert_eq!(cursor.event(), Event::NotStarted);
        assert!(matches!(
            cursor.worksheet_index(),
            Err(SheetError::IllegalState(_))
        ));
        assert!(matches!(cursor.row(), Err(SheetError::IllegalState(_))));
        assert!(matches!(cursor.value(), Err(SheetError::IllegalState(_))));
    }

    #[test]
    fn test_value_taken_once() {
        let mut cursor = Cursor::new();
        cursor.event = Event::EndCell;
        cursor.col = Some(0);
        cursor.value = Some(CellValue::Int(1));
        assert_eq!(cursor.take_value().unwrap(), CellValue::Int(1));
        assert!(cursor.take_value().is_err());
    }
}
