//! Built-in codecs
//!
//! | Codec | Signature | Extension |
//! |-------|-----------|-----------|
//! | XLS (BIFF8) | `D0 CF 11 E0 A1 B1 1A E1` | `xls` |
//! | XLSX (SpreadsheetML) | `50 4B 03 04` | `xlsx` |
//! | CSV | none | `csv` |

pub mod book;
pub mod csv;
pub mod xls;
pub mod xlsx;

use std::io::Write;

use crate::error::Result;
use crate::input::Input;
use crate::options::Options;
use crate::parser::SpreadsheetParser;
use crate::registry::{CodecFactory, Format};
use crate::writer::SpreadsheetWriter;

/// OLE2 compound file header
pub const XLS_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// ZIP local file header
pub const XLSX_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

impl Format {
    pub fn xls() -> Self {
        Format::new("xls", &XLS_SIGNATURE, &["xls"])
    }

    pub fn xlsx() -> Self {
        Format::new("xlsx", &XLSX_SIGNATURE, &["xlsx"])
    }

    pub fn csv() -> Self {
        Format::new("csv", &[], &["csv"])
    }
}

/// The codecs shipped with the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinCodec {
    Xls,
    Xlsx,
    Csv,
}

impl BuiltinCodec {
    /// Registration order of the default registry
    pub const ALL: [BuiltinCodec; 3] = [BuiltinCodec::Xls, BuiltinCodec::Xlsx, BuiltinCodec::Csv];

    pub fn format(self) -> Format {
        match self {
            BuiltinCodec::Xls => Format::xls(),
            BuiltinCodec::Xlsx => Format::xlsx(),
            BuiltinCodec::Csv => Format::csv(),
        }
    }
}

impl CodecFactory for BuiltinCodec {
    fn supported_formats(&self) -> Vec<Format> {
        vec![self.format()]
    }

    fn open_read<'a>(&self, input: Input<'a>, options: &Options) -> Result<SpreadsheetParser<'a>> {
        match self {
            BuiltinCodec::Xls => xls::open_read(input, options),
            BuiltinCodec::Xlsx => xlsx::open_read(input, options),
            BuiltinCodec::Csv => csv::open_read(input, options),
        }
    }

    fn open_write<'a>(
        &self,
        output: Box<dyn Write + 'a>,
        options: &Options,
    ) -> Result<SpreadsheetWriter<'a>> {
        match self {
            BuiltinCodec::Xls => xls::open_write(output, options),
            BuiltinCodec::Xlsx => xlsx::open_write(output, options),
            BuiltinCodec::Csv => csv::open_write(output, options),
        }
    }
}
