//! # sheetstream
//!
//! Streaming, format-independent access to spreadsheet files.
//!
//! ## Features
//!
//! - **Event Parsing**: Pull workbooks one event at a time (worksheet, record, cell)
//! - **Record Assembly**: Dense rows with typed values on top of the event stream
//! - **Format Detection**: Resolve the codec from the leading bytes of the input
//! - **Typed Writing**: Scalars, tuples, sequences and dates are laid out as cells
//! - **Multiple Formats**: CSV (any ASCII-compatible encoding), XLS and XLSX
//!
//! ## Quick Start
//!
//! ### Reading
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut parser = sheetstream::open_path("data.xlsx")?;
//!
//! for record in parser.records(true) {
//!     let record = record?;
//!     println!("row {}: {:?}", record.row, record.to_strings());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Writing
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = sheetstream::create_path("output.xlsx")?;
//!
//! writer.start_worksheet("People")?;
//! writer.write(&("Name", "Age", "Active"))?;
//! writer.next_row()?.write(&("Alice", 30, true))?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Options
//!
//! ```rust,no_run
//! use sheetstream::{Input, Options};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = Options::new()
//!     .set("encoding", "gbk")
//!     .set("separator_char", ';');
//! let file = std::io::BufReader::new(std::fs::File::open("legacy.csv")?);
//! let mut parser = sheetstream::open_with(Input::buffered(file), &options)?;
//! # parser.close()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod date;
pub mod error;
pub mod event;
pub mod input;
pub mod options;
pub mod parser;
pub mod record;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod types;
pub mod value;
pub mod writer;

pub use codec::csv::CsvOptions;
pub use codec::BuiltinCodec;
pub use error::{Result, SheetError};
pub use event::{Cursor, Event};
pub use input::Input;
pub use options::{OptionValue, Options};
pub use parser::SpreadsheetParser;
pub use registry::{
    create, create_path, create_with, install, open, open_path, open_with, registry, CodecFactory,
    Format, Registry,
};
pub use resolver::MixedFactory;
pub use types::{CellValue, Record};
pub use value::{Formatted, Text, WriteValue};
pub use writer::SpreadsheetWriter;
