//! XLS reading on top of calamine
//!
//! calamine decodes one worksheet at a time into a range; the range is
//! replayed as row and cell tokens before the next worksheet is decoded.
//! Date serials always use the 1900 system, even in DATE1904 workbooks.

use std::collections::VecDeque;
use std::io::Cursor;

use calamine::{Data, Reader, Xls};

use super::decode_error;
use crate::date::{from_serial, parse_iso};
use crate::error::Result;
use crate::parser::{CellSource, Token};
use crate::types::CellValue;

pub(crate) struct XlsSource {
    workbook: Xls<Cursor<Vec<u8>>>,
    names: Vec<String>,
    next_sheet: usize,
    pending: VecDeque<Token>,
}

impl XlsSource {
    pub(crate) fn open(bytes: Vec<u8>) -> Result<Self> {
        let workbook = Xls::new(Cursor::new(bytes)).map_err(decode_error)?;
        let names = workbook.sheet_names();
        log::debug!("xls workbook with {} worksheets", names.len());
        Ok(XlsSource {
            workbook,
            names,
            next_sheet: 0,
            pending: VecDeque::new(),
        })
    }

    /// Queue the tokens of the next worksheet
    fn load_sheet(&mut self, name: String) -> Result<()> {
        let range = self.workbook.worksheet_range(&name)?;
        let (first_row, first_col) = range.start().unwrap_or((0, 0));

        self.pending.push_back(Token::Worksheet(name));
        let mut current_row = None;
        for (row, col, data) in range.used_cells() {
            let row = first_row + row as u32;
            let col = first_col + col as u32;
            if current_row != Some(row) {
                current_row = Some(row);
                self.pending.push_back(Token::Record(row));
            }
            self.pending.push_back(Token::Cell(col, cell_value(data)));
        }
        Ok(())
    }
}

impl CellSource for XlsSource {
    fn next_token(&mut self) -> Result<Token> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }
            let Some(name) = self.names.get(self.next_sheet).cloned() else {
                return Ok(Token::End);
            };
            self.next_sheet += 1;
            self.load_sheet(name)?;
        }
    }

    fn worksheet_count(&self) -> usize {
        self.names.len()
    }

    fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.next_sheet = self.names.len();
        Ok(())
    }
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::from_number(*f),
        Data::String(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
        // Serials are read in the 1900 system; a workbook's DATE1904 flag is ignored
        Data::DateTime(dt) => match from_serial(dt.as_f64(), false) {
            Some(date) => CellValue::DateTime(date),
            None => CellValue::from_number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso(s)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::String(s.clone())),
        Data::DurationIso(s) => CellValue::String(s.clone()),
    }
}
