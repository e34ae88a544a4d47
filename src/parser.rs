//! Forward-only event parser
//!
//! Codecs implement [`CellSource`], which yields flat native tokens. The
//! parser turns them into the canonical nested event sequence:
//!
//! ```text
//! StartWorkbook
//!   StartWorksheet
//!     StartRecord
//!       StartCell EndCell ...
//!     EndRecord ...
//!   EndWorksheet ...
//! EndWorkbook
//! ```
//!
//! Closing events are synthesised from one token of look-ahead, so a
//! codec never reports them. The parser also rejects tokens that break the
//! nesting, such as a cell outside a record.

use crate::error::{Result, SheetError};
use crate::event::{Cursor, Event};
use crate::types::CellValue;

/// Native token produced by a codec
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A new worksheet begins
    Worksheet(String),
    /// A new row begins, 0-based
    Record(u32),
    /// A cell of the current row, 0-based column
    Cell(u32, CellValue),
    /// The workbook ended cleanly
    End,
    /// The input ended before the workbook was complete
    Eof,
}

/// Codec side of a parser
pub trait CellSource {
    /// Next native token. After `End` or `Eof` the parser stops asking.
    fn next_token(&mut self) -> Result<Token>;

    /// Number of worksheets in the workbook
    fn worksheet_count(&self) -> usize;

    /// Release codec buffers. Called at most once.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Streaming parser over one workbook.
///
/// # Examples
///
/// ```no_run
/// use sheetstream::Event;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut parser = sheetstream::open_path("data.xlsx")?;
/// while parser.has_next() {
///     if parser.advance()? == Event::EndCell {
///         println!("{}{}: {}", parser.col()?, parser.row()?, parser.value()?);
///     }
/// }
/// parser.close()?;
/// # Ok(())
/// # }
/// ```
pub struct SpreadsheetParser<'a> {
    source: Box<dyn CellSource + 'a>,
    pub(crate) cursor: Cursor,
    pending: Option<Token>,
    worksheets_seen: usize,
    closed: bool,
}

impl<'a> SpreadsheetParser<'a> {
    pub fn new(source: Box<dyn CellSource + 'a>) -> Self {
        SpreadsheetParser {
            source,
            cursor: Cursor::new(),
            pending: None,
            worksheets_seen: 0,
            closed: false,
        }
    }

    /// The current event and its attributes
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn event(&self) -> Event {
        self.cursor.event()
    }

    pub fn worksheet_count(&self) -> usize {
        self.source.worksheet_count()
    }

    pub fn worksheet_index(&self) -> Result<usize> {
        self.cursor.worksheet_index()
    }

    pub fn worksheet_name(&self) -> Result<&str> {
        self.cursor.worksheet_name()
    }

    pub fn row(&self) -> Result<u32> {
        self.cursor.row()
    }

    pub fn col(&self) -> Result<u32> {
        self.cursor.col()
    }

    pub fn value(&self) -> Result<&CellValue> {
        self.cursor.value()
    }

    /// False once the workbook ended, the input was cut short, or the parser was closed
    pub fn has_next(&self) -> bool {
        !self.closed && !matches!(self.cursor.event, Event::EndWorkbook | Event::Eof)
    }

    /// Move to the next event
    pub fn advance(&mut self) -> Result<Event> {
        if self.closed {
            return Err(SheetError::IllegalState("parser is closed".to_string()));
        }
        match self.cursor.event {
            Event::EndWorkbook => return Err(SheetError::NoMoreElements),
            Event::Eof => {
                return Err(SheetError::BrokenStream(
                    "input ended before the end of the workbook".to_string(),
                ))
            }
            Event::NotStarted => {
                self.cursor.event = Event::StartWorkbook;
                return Ok(Event::StartWorkbook);
            }
            Event::StartCell => {
                self.cursor.event = Event::EndCell;
                return Ok(Event::EndCell);
            }
            _ => {}
        }

        let token = match self.pending.take() {
            Some(token) => token,
            None => self.source.next_token()?,
        };
        let event = self.apply(token)?;
        self.cursor.event = event;
        Ok(event)
    }

    /// Translate one token against the current nesting depth
    fn apply(&mut self, token: Token) -> Result<Event> {
        let cursor = &mut self.cursor;
        let in_record = matches!(cursor.event, Event::StartRecord | Event::EndCell);
        let in_worksheet =
            in_record || matches!(cursor.event, Event::StartWorksheet | Event::EndRecord);

        if token == Token::Eof {
            log::debug!("input ended at {}", cursor.event);
            *cursor = Cursor::new();
            return Ok(Event::Eof);
        }

        if in_record {
            if let Token::Cell(col, value) = token {
                cursor.col = Some(col);
                cursor.value = Some(value);
                return Ok(Event::StartCell);
            }
            self.pending = Some(token);
            cursor.col = None;
            cursor.value = None;
            return Ok(Event::EndRecord);
        }

        if in_worksheet {
            return match token {
                Token::Record(row) => {
                    cursor.row = Some(row);
                    Ok(Event::StartRecord)
                }
                Token::Cell(col, _) => Err(SheetError::IllegalState(format!(
                    "cell in column {} reported outside a record",
                    col
                ))),
                other => {
                    self.pending = Some(other);
                    cursor.row = None;
                    Ok(Event::EndWorksheet)
                }
            };
        }

        match token {
            Token::Worksheet(name) => {
                cursor.worksheet_index = Some(self.worksheets_seen);
                cursor.worksheet_name = Some(name);
                cursor.row = None;
                self.worksheets_seen += 1;
                Ok(Event::StartWorksheet)
            }
            Token::End => {
                *cursor = Cursor::new();
                Ok(Event::EndWorkbook)
            }
            Token::Record(row) => Err(SheetError::IllegalState(format!(
                "row {} reported outside a worksheet",
                row
            ))),
            Token::Cell(col, _) => Err(SheetError::IllegalState(format!(
                "cell in column {} reported outside a worksheet",
                col
            ))),
            Token::Eof => Ok(Event::Eof),
        }
    }

    /// Release codec resources; later calls do nothing
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending = None;
        self.source.close()
    }
}

impl std::fmt::Debug for SpreadsheetParser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpreadsheetParser")
            .field("cursor", &self.cursor)
            .field("closed", &self.closed)
            .finish()
    }
}
