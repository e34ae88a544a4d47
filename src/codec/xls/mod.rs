//! XLS codec (BIFF8 in an OLE compound file)
//!
//! Reading goes through calamine one worksheet at a time. Writing collects
//! the workbook and emits BIFF8 records when the writer closes; sheets are
//! limited to 65536 rows and 256 columns.
//!
//! Recognised options: `template`.

pub mod biff;
mod reader;
mod writer;

use std::io::Write;

use super::book::{Book, BookSink, TEMPLATE};
use crate::error::{Result, SheetError};
use crate::input::Input;
use crate::options::Options;
use crate::parser::SpreadsheetParser;
use crate::writer::SpreadsheetWriter;

pub use writer::{MAX_COLS, MAX_ROWS};

pub(crate) fn open_read<'a>(input: Input<'a>, options: &Options) -> Result<SpreadsheetParser<'a>> {
    options.log_unknown("xls", &[]);
    let source = reader::XlsSource::open(input.into_bytes()?)?;
    Ok(SpreadsheetParser::new(Box::new(source)))
}

pub(crate) fn open_write<'a>(
    output: Box<dyn Write + 'a>,
    options: &Options,
) -> Result<SpreadsheetWriter<'a>> {
    options.log_unknown("xls", &[TEMPLATE]);
    let book = match options.bytes(TEMPLATE)? {
        Some(template) => {
            let mut parser = open_read(Input::from_bytes(template.to_vec()), &Options::new())?;
            Book::load(&mut parser)?
        }
        None => Book::default(),
    };
    let sink = BookSink::new(book, output, writer::encode);
    Ok(SpreadsheetWriter::new(Box::new(sink)))
}

pub(crate) fn decode_error(message: impl std::fmt::Display) -> SheetError {
    SheetError::decode("xls", message)
}
