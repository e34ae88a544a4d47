//! In-memory workbook shared by the binary writers
//!
//! XLS and XLSX writers collect every row into a [`Book`] and encode it
//! when the writer closes. A template workbook is decoded into the same
//! model first, so writing extends it instead of replacing it.

use std::collections::BTreeMap;
use std::io::Write;

use crate::date::DEFAULT_DATE_PATTERN;
use crate::error::Result;
use crate::event::Event;
use crate::parser::SpreadsheetParser;
use crate::types::CellValue;
use crate::writer::{CellEntry, CellSink};

pub const TEMPLATE: &str = "template";

#[derive(Debug, Clone, PartialEq)]
pub struct BookCell {
    pub value: CellValue,
    pub pattern: Option<String>,
}

impl BookCell {
    /// Number format pattern of a date cell
    pub fn date_pattern(&self) -> Option<&str> {
        match self.value {
            CellValue::DateTime(_) => Some(self.pattern.as_deref().unwrap_or(DEFAULT_DATE_PATTERN)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: BTreeMap<u32, BTreeMap<u32, BookCell>>,
}

impl Sheet {
    /// `(last_row, last_col)` of the used area
    pub fn extent(&self) -> Option<(u32, u32)> {
        let last_row = *self.rows.keys().next_back()?;
        let last_col = self
            .rows
            .values()
            .filter_map(|cells| cells.keys().next_back())
            .max()
            .copied()
            .unwrap_or(0);
        Some((last_row, last_col))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    pub sheets: Vec<Sheet>,
}

impl Book {
    /// Decode a whole workbook through `parser`
    pub fn load(parser: &mut SpreadsheetParser) -> Result<Self> {
        let mut book = Book::default();
        let mut current = 0;
        while parser.has_next() {
            match parser.advance()? {
                Event::StartWorksheet => current = book.open_sheet(parser.worksheet_name()?),
                Event::EndCell => {
                    let value = parser.value()?;
                    if !value.is_empty() {
                        book.sheets[current]
                            .rows
                            .entry(parser.row()?)
                            .or_default()
                            .insert(
                                parser.col()?,
                                BookCell {
                                    value: value.clone(),
                                    pattern: None,
                                },
                            );
                    }
                }
                _ => {}
            }
        }
        parser.close()?;
        Ok(book)
    }

    /// Index of the sheet named `name`, appended when missing
    pub fn open_sheet(&mut self, name: &str) -> usize {
        if let Some(index) = self.sheets.iter().position(|s| s.name == name) {
            return index;
        }
        self.sheets.push(Sheet {
            name: name.to_string(),
            rows: BTreeMap::new(),
        });
        self.sheets.len() - 1
    }

    /// Distinct date patterns in first-use order
    pub fn date_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = Vec::new();
        for sheet in &self.sheets {
            for cell in sheet.rows.values().flat_map(|cells| cells.values()) {
                if let Some(pattern) = cell.date_pattern() {
                    if !patterns.iter().any(|p| p == pattern) {
                        patterns.push(pattern.to_string());
                    }
                }
            }
        }
        patterns
    }
}

/// Serialises a finished book
pub type Encoder = fn(&Book) -> Result<Vec<u8>>;

/// Sink collecting rows into a [`Book`] and encoding it on finish
pub struct BookSink<'a> {
    book: Book,
    current: Option<usize>,
    output: Box<dyn Write + 'a>,
    encode: Encoder,
}

impl<'a> BookSink<'a> {
    pub fn new(book: Book, output: Box<dyn Write + 'a>, encode: Encoder) -> Self {
        BookSink {
            book,
            current: None,
            output,
            encode,
        }
    }
}

impl CellSink for BookSink<'_> {
    fn start_worksheet(&mut self, name: &str) -> Result<()> {
        self.current = Some(self.book.open_sheet(name));
        Ok(())
    }

    fn write_row(&mut self, row: u32, cells: &[CellEntry]) -> Result<()> {
        let Some(index) = self.current else {
            return Ok(());
        };
        let target = self.book.sheets[index].rows.entry(row).or_default();
        for entry in cells {
            target.insert(
                entry.col,
                BookCell {
                    value: entry.value.clone(),
                    pattern: entry.pattern.clone(),
                },
            );
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let bytes = (self.encode)(&self.book)?;
        self.output.write_all(&bytes)?;
        self.output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::Replay;
    use crate::parser::Token;
    use crate::writer::SpreadsheetWriter;

    #[test]
    fn test_load_and_extent() {
        let mut parser = Replay::parser(vec![
            Token::Worksheet("data".into()),
            Token::Record(0),
            Token::Cell(0, CellValue::Int(1)),
            Token::Record(3),
            Token::Cell(4, CellValue::String("x".into())),
            Token::Cell(5, CellValue::Empty),
            Token::Worksheet("empty".into()),
            Token::End,
        ]);
        let book = Book::load(&mut parser).unwrap();
        assert_eq!(book.sheets.len(), 2);
        assert_eq!(book.sheets[0].extent(), Some((3, 4)));
        assert_eq!(book.sheets[1].extent(), None);
    }

    #[test]
    fn test_sink_reopens_sheets_and_overwrites_cells() {
        let mut encoded = Vec::<u8>::new();
        let mut template = Book::default();
        let index = template.open_sheet("sheet1");
        template.sheets[index].rows.entry(0).or_default().insert(
            1,
            BookCell {
                value: CellValue::String("kept".into()),
                pattern: None,
            },
        );

        fn encode(book: &Book) -> Result<Vec<u8>> {
            let rows: Vec<usize> = book.sheets.iter().map(|s| s.rows.len()).collect();
            Ok(format!("{:?}", rows).into_bytes())
        }

        {
            let sink = BookSink::new(template, Box::new(&mut encoded), encode);
            let mut writer = SpreadsheetWriter::new(Box::new(sink));
            writer.start().unwrap().write(&"new").unwrap();
            writer.start_worksheet("extra").unwrap();
            writer.next_row().unwrap().write(&1).unwrap();
            writer.close().unwrap();
        }
        assert_eq!(encoded, b"[1, 1]");
    }

    #[test]
    fn test_date_patterns_are_distinct() {
        let at = chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut book = Book::default();
        let index = book.open_sheet("s");
        let row = book.sheets[index].rows.entry(0).or_default();
        for (col, pattern) in [None, Some("dd/MM"), None, Some("dd/MM")].into_iter().enumerate() {
            row.insert(
                col as u32,
                BookCell {
                    value: CellValue::DateTime(at),
                    pattern: pattern.map(str::to_string),
                },
            );
        }
        assert_eq!(book.date_patterns(), vec![DEFAULT_DATE_PATTERN, "dd/MM"]);
    }
}
