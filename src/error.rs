//! Error types for sheetstream

use thiserror::Error;

/// Result type alias for sheetstream operations
pub type Result<T> = std::result::Result<T, SheetError>;

/// Main error type for all parser, writer and registry operations
#[derive(Error, Debug)]
pub enum SheetError {
    /// An operation or attribute was used outside its valid cursor state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// `advance` was called after the workbook ended cleanly
    #[error("No more elements: the workbook has already ended")]
    NoMoreElements,

    /// `advance` was called after the input ended before the end of the workbook
    #[error("Broken stream: {0}")]
    BrokenStream(String),

    /// A cell reported a column that would overwrite an already collected value
    #[error("Illegal column {col} in row {row}: {len} values already collected")]
    IllegalColumn { row: u32, col: u32, len: usize },

    /// No codec is registered for the requested format
    #[error("No factory found: {0}")]
    NoFactoryFound(String),

    /// A codec rejected the byte content
    #[error("Invalid {format} content: {message}")]
    FormatDecode { format: String, message: String },

    /// Every factory failed on a stream that cannot be peeked
    #[error("Unable to detect the format of a non-peekable stream, wrap it in a BufReader: {source}")]
    NotPeekable {
        #[source]
        source: Box<SheetError>,
    },

    /// The input held no bytes at all
    #[error("Empty input stream")]
    EmptyInput,

    /// A known option carried an unusable value
    #[error("Invalid option '{key}': {message}")]
    InvalidOption { key: String, message: String },

    /// Error occurred while encoding output
    #[error("Failed to write spreadsheet: {0}")]
    WriteError(String),

    /// Feature not supported by the selected codec
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SheetError {
    /// Build a decode error for `format`
    pub fn decode(format: &str, message: impl std::fmt::Display) -> Self {
        SheetError::FormatDecode {
            format: format.to_string(),
            message: message.to_string(),
        }
    }

    /// True when a codec rejected the content, which lets resolution try the next candidate
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, SheetError::FormatDecode { .. })
    }

    /// True for truncated input and underlying I/O failures
    pub fn is_broken_stream(&self) -> bool {
        matches!(self, SheetError::BrokenStream(_) | SheetError::IoError(_))
    }
}

impl From<csv::Error> for SheetError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(io) => SheetError::IoError(io),
                other => SheetError::decode("csv", format!("{:?}", other)),
            }
        } else {
            SheetError::decode("csv", err)
        }
    }
}

impl From<zip::result::ZipError> for SheetError {
    fn from(err: zip::result::ZipError) -> Self {
        SheetError::WriteError(err.to_string())
    }
}

impl From<quick_xml::Error> for SheetError {
    fn from(err: quick_xml::Error) -> Self {
        SheetError::decode("xlsx", err)
    }
}

impl From<quick_xml::events::attributes::AttrError> for SheetError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        SheetError::decode("xlsx", err)
    }
}

impl From<calamine::XlsError> for SheetError {
    fn from(err: calamine::XlsError) -> Self {
        SheetError::decode("xls", err)
    }
}
