//! Record assembly on top of the event parser

use crate::error::{Result, SheetError};
use crate::event::Event;
use crate::parser::SpreadsheetParser;
use crate::types::{CellValue, Record};

impl<'a> SpreadsheetParser<'a> {
    /// Read the next row as a dense record.
    ///
    /// Gaps between cells are filled with [`CellValue::Empty`]. With
    /// `ignore_empty` set, rows without values are skipped. Returns `None`
    /// once the workbook is exhausted.
    pub fn next_record(&mut self, ignore_empty: bool) -> Result<Option<Record>> {
        let mut values: Vec<CellValue> = Vec::new();
        let mut row = 0;
        let mut produced = false;

        while self.has_next() {
            match self.advance()? {
                Event::StartRecord => row = self.cursor.row()?,
                Event::EndCell => {
                    produced = true;
                    let col = self.cursor.col()?;
                    if (col as usize) < values.len() {
                        return Err(SheetError::IllegalColumn {
                            row,
                            col,
                            len: values.len(),
                        });
                    }
                    let value = self.cursor.take_value()?;
                    if !value.is_empty() {
                        values.resize(col as usize, CellValue::Empty);
                        values.push(value);
                    }
                }
                Event::EndRecord => {
                    if !ignore_empty || !values.is_empty() {
                        return Ok(Some(Record::new(row, values)));
                    }
                    produced = false;
                }
                _ => {}
            }
        }

        // A record cut short by the end of input still carries its cells
        Ok(produced.then(|| Record::new(row, values)))
    }

    /// Iterate over the remaining records
    pub fn records(&mut self, ignore_empty: bool) -> Records<'_, 'a> {
        Records {
            parser: self,
            ignore_empty,
            done: false,
        }
    }
}

/// Iterator returned by [`SpreadsheetParser::records`]
pub struct Records<'p, 'a> {
    parser: &'p mut SpreadsheetParser<'a>,
    ignore_empty: bool,
    done: bool,
}

impl Iterator for Records<'_, '_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.parser.next_record(self.ignore_empty) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
