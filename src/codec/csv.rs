//! CSV codec
//!
//! A CSV file is a workbook with a single worksheet named `sheet1`. Fields
//! are transcoded through `encoding_rs`, so any ASCII-compatible encoding
//! works; every cell reads back as text.
//!
//! Recognised options: `encoding`, `separator_char`, `quote_char` and
//! `escape_char`.

use std::borrow::Cow;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use ::csv::{ByteRecord, ReaderBuilder, Terminator, WriterBuilder};
use encoding_rs::{Encoding, UTF_8};

use crate::date::format_date;
use crate::error::{Result, SheetError};
use crate::input::Input;
use crate::options::{invalid, Options};
use crate::parser::{CellSource, SpreadsheetParser, Token};
use crate::types::CellValue;
use crate::writer::{CellEntry, CellSink, SpreadsheetWriter};

pub const SHEET_NAME: &str = "sheet1";

pub const ENCODING: &str = "encoding";
pub const SEPARATOR_CHAR: &str = "separator_char";
pub const QUOTE_CHAR: &str = "quote_char";
pub const ESCAPE_CHAR: &str = "escape_char";

const KNOWN_OPTIONS: &[&str] = &[ENCODING, SEPARATOR_CHAR, QUOTE_CHAR, ESCAPE_CHAR];

/// Dialect and encoding of a CSV file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CsvOptions {
    encoding: &'static Encoding,
    separator: u8,
    quote: u8,
    escape: Option<u8>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            encoding: UTF_8,
            separator: b',',
            quote: b'"',
            escape: None,
        }
    }
}

impl CsvOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the CSV keys of `options`, ignoring any other key
    pub fn from_options(options: &Options) -> Result<Self> {
        options.log_unknown("csv", KNOWN_OPTIONS);

        let mut csv = CsvOptions::default();
        if let Some(label) = options.text(ENCODING)? {
            csv = csv.encoding(&label)?;
        }
        if let Some(separator) = options.ascii_char(SEPARATOR_CHAR)? {
            csv = csv.separator(separator);
        }
        if let Some(quote) = options.ascii_char(QUOTE_CHAR)? {
            csv = csv.quote(quote);
        }
        if let Some(escape) = options.ascii_char(ESCAPE_CHAR)? {
            csv = csv.escape(escape);
        }
        Ok(csv)
    }

    /// Select an encoding by WHATWG label, such as `gbk` or `windows-1252`
    pub fn encoding(mut self, label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| invalid(ENCODING, format!("unknown encoding '{}'", label)))?;
        if !encoding.is_ascii_compatible() {
            return Err(invalid(
                ENCODING,
                format!("{} is not ASCII-compatible", encoding.name()),
            ));
        }
        self.encoding = encoding;
        Ok(self)
    }

    pub fn separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    /// Escape quotes with `escape` instead of doubling them
    pub fn escape(mut self, escape: u8) -> Self {
        self.escape = Some(escape);
        self
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    fn reader_builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.separator)
            .quote(self.quote);
        if let Some(escape) = self.escape {
            builder.escape(Some(escape)).double_quote(false);
        }
        builder
    }

    fn writer_builder(&self) -> WriterBuilder {
        let mut builder = WriterBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.separator)
            .quote(self.quote)
            .terminator(Terminator::CRLF);
        if let Some(escape) = self.escape {
            builder.escape(escape).double_quote(false);
        }
        builder
    }
}

pub(crate) fn open_read<'a>(input: Input<'a>, options: &Options) -> Result<SpreadsheetParser<'a>> {
    let csv = CsvOptions::from_options(options)?;
    Ok(SpreadsheetParser::new(Box::new(CsvSource::new(input, csv))))
}

pub(crate) fn open_write<'a>(
    output: Box<dyn Write + 'a>,
    options: &Options,
) -> Result<SpreadsheetWriter<'a>> {
    let csv = CsvOptions::from_options(options)?;
    Ok(SpreadsheetWriter::new(Box::new(CsvSink::new(output, csv))))
}

enum ReadState {
    Start,
    Records,
    Done,
}

/// Streams records straight from the underlying reader
struct CsvSource<'a> {
    reader: ::csv::Reader<Input<'a>>,
    encoding: &'static Encoding,
    record: ByteRecord,
    state: ReadState,
    row: u32,
    field: usize,
    in_record: bool,
}

impl<'a> CsvSource<'a> {
    fn new(input: Input<'a>, options: CsvOptions) -> Self {
        CsvSource {
            reader: options.reader_builder().from_reader(input),
            encoding: options.encoding,
            record: ByteRecord::new(),
            state: ReadState::Start,
            row: 0,
            field: 0,
            in_record: false,
        }
    }

    fn decode_field(&self, index: usize, bytes: &[u8]) -> String {
        let (text, _) = self.encoding.decode_without_bom_handling(bytes);
        if index == 0 && self.row == 0 {
            if let Some(stripped) = text.strip_prefix('\u{feff}') {
                return stripped.to_string();
            }
        }
        text.into_owned()
    }
}

impl CellSource for CsvSource<'_> {
    fn next_token(&mut self) -> Result<Token> {
        match self.state {
            ReadState::Start => {
                self.state = ReadState::Records;
                return Ok(Token::Worksheet(SHEET_NAME.to_string()));
            }
            ReadState::Done => return Ok(Token::End),
            ReadState::Records => {}
        }

        if self.in_record {
            if let Some(bytes) = self.record.get(self.field) {
                let index = self.field;
                let text = self.decode_field(index, bytes);
                self.field += 1;
                return Ok(Token::Cell(index as u32, CellValue::String(text)));
            }
            self.in_record = false;
            self.row += 1;
        }

        if self.reader.read_byte_record(&mut self.record)? {
            self.in_record = true;
            self.field = 0;
            Ok(Token::Record(self.row))
        } else {
            log::debug!("csv input ended after {} records", self.row);
            self.state = ReadState::Done;
            Ok(Token::End)
        }
    }

    fn worksheet_count(&self) -> usize {
        1
    }
}

/// Output shared by the csv writer and the raw blank-line path
#[derive(Clone)]
struct SharedOutput<'a>(Rc<RefCell<Box<dyn Write + 'a>>>);

impl Write for SharedOutput<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

/// Writes each row as soon as it is complete
struct CsvSink<'a> {
    writer: ::csv::Writer<SharedOutput<'a>>,
    output: SharedOutput<'a>,
    encoding: &'static Encoding,
    started: bool,
    next_row: u32,
}

impl<'a> CsvSink<'a> {
    fn new(output: Box<dyn Write + 'a>, options: CsvOptions) -> Self {
        let output = SharedOutput(Rc::new(RefCell::new(output)));
        CsvSink {
            writer: options.writer_builder().from_writer(output.clone()),
            output,
            encoding: options.encoding.output_encoding(),
            started: false,
            next_row: 0,
        }
    }

    fn encode<'s>(&self, text: &'s str) -> Cow<'s, [u8]> {
        let (bytes, _, _) = self.encoding.encode(text);
        bytes
    }

    fn field(&self, entry: &CellEntry) -> Cow<'static, [u8]> {
        let text = match &entry.value {
            CellValue::Empty => return Cow::Borrowed(b""),
            CellValue::String(s) | CellValue::Error(s) => s.clone(),
            CellValue::Int(i) => itoa::Buffer::new().format(*i).to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateTime(d) => match &entry.pattern {
                Some(pattern) => format_date(d, pattern),
                None => format_date(d, crate::date::DEFAULT_DATE_PATTERN),
            },
        };
        Cow::Owned(self.encode(&text).into_owned())
    }

    /// Blank lines keep skipped rows in place.
    ///
    /// csv writes an empty record as `""`, so the terminators bypass it once
    /// its buffer is flushed.
    fn write_blank_lines(&mut self, count: u32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.writer.flush()?;
        for _ in 0..count {
            self.output.write_all(b"\r\n")?;
        }
        Ok(())
    }
}

impl CellSink for CsvSink<'_> {
    fn start_worksheet(&mut self, name: &str) -> Result<()> {
        if self.started {
            return Err(SheetError::NotSupported(format!(
                "a csv file holds a single worksheet, cannot start '{}'",
                name
            )));
        }
        self.started = true;
        Ok(())
    }

    fn write_row(&mut self, row: u32, cells: &[CellEntry]) -> Result<()> {
        if row < self.next_row {
            return Err(SheetError::WriteError(format!(
                "csv rows are written in order, row {} already written",
                row
            )));
        }
        self.write_blank_lines(row - self.next_row)?;

        let mut fields: Vec<Cow<'static, [u8]>> = Vec::with_capacity(cells.len());
        for entry in cells {
            while fields.len() < entry.col as usize {
                fields.push(Cow::Borrowed(b""));
            }
            fields.push(self.field(entry));
        }
        self.writer.write_record(&fields)?;
        self.next_row = row + 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
