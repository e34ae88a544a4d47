//! XLSX codec (Office Open XML SpreadsheetML)
//!
//! Reading pulls each worksheet part through `quick-xml` one element at a
//! time. Writing collects the workbook and packs every part into a ZIP
//! archive when the writer closes.
//!
//! Recognised options: `template`.

mod reader;
pub mod shared_strings;
pub mod styles;
mod writer;
pub mod xml_writer;

use std::io::Write;

use quick_xml::events::BytesStart;

use super::book::{Book, BookSink, TEMPLATE};
use crate::error::{Result, SheetError};
use crate::input::Input;
use crate::options::Options;
use crate::parser::SpreadsheetParser;
use crate::writer::SpreadsheetWriter;

pub(crate) const SPREADSHEETML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub(crate) const RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const PACKAGE_RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";

pub(crate) fn open_read<'a>(input: Input<'a>, options: &Options) -> Result<SpreadsheetParser<'a>> {
    options.log_unknown("xlsx", &[]);
    let source = reader::XlsxSource::open(input.into_bytes()?)?;
    Ok(SpreadsheetParser::new(Box::new(source)))
}

pub(crate) fn open_write<'a>(
    output: Box<dyn Write + 'a>,
    options: &Options,
) -> Result<SpreadsheetWriter<'a>> {
    options.log_unknown("xlsx", &[TEMPLATE]);
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

/// Unescaped value of the attribute whose local name is `name`
pub(crate) fn attr(element: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute?;
        if attribute.key.local_name().as_ref() == name {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Resolve a relationship target against the directory of its source part
pub(crate) fn resolve_part(base_dir: &str, target: &str) -> String {
    let mut parts: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|p| !p.is_empty()).collect()
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

pub(crate) fn decode_error(message: impl std::fmt::Display) -> SheetError {
    SheetError::decode("xlsx", message)
}
