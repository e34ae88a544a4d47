//! Encodes a [`Book`] as a BIFF8 workbook inside an OLE compound file

use std::collections::HashSet;
use std::io::{Cursor, Write};

use super::biff::{self, Payload, RecordStream};
use crate::codec::book::{Book, Sheet};
use crate::codec::xlsx::shared_strings::SharedStrings;
use crate::date::{to_excel_format, to_serial};
use crate::error::{Result, SheetError};
use crate::types::CellValue;

pub const MAX_ROWS: u32 = 65_536;
pub const MAX_COLS: u32 = 256;

const DEFAULT_SHEET: &str = "sheet1";
const MAX_SHEET_NAME: usize = 31;

/// Built-in style XFs preceding the cell XFs
const STYLE_XF_COUNT: u16 = 15;
/// XF of cells without a number format
const DEFAULT_CELL_XF: u16 = STYLE_XF_COUNT;
const FIRST_CUSTOM_FORMAT: u16 = 164;

/// Encode the whole workbook as an XLS file
pub(crate) fn encode(book: &Book) -> Result<Vec<u8>> {
    let placeholder;
    let sheets: &[Sheet] = if book.sheets.is_empty() {
        placeholder = [Sheet {
            name: DEFAULT_SHEET.to_string(),
            ..Sheet::default()
        }];
        &placeholder
    } else {
        &book.sheets
    };
    for sheet in sheets {
        check_limits(sheet)?;
    }

    let patterns = book.date_patterns();
    let mut strings = SharedStrings::new();
    let sheet_streams: Vec<RecordStream> = sheets
        .iter()
        .map(|sheet| encode_sheet(sheet, &patterns, &mut strings))
        .collect();

    let mut stream = RecordStream::new();
    stream.record(biff::BOF, &bof(biff::SUBSTREAM_WORKBOOK));
    stream.record(biff::CODEPAGE, &biff::CODEPAGE_UTF16.to_le_bytes());
    stream.record(biff::WINDOW1, &window1());
    stream.record(biff::DATE1904, &0u16.to_le_bytes());
    for _ in 0..4 {
        stream.record(biff::FONT, &font());
    }
    for (i, pattern) in patterns.iter().enumerate() {
        let mut payload = Payload::new();
        payload
            .u16(FIRST_CUSTOM_FORMAT + i as u16)
            .bytes(&biff::unicode_string(&to_excel_format(pattern)));
        stream.record(biff::FORMAT, &payload.0);
    }
    for _ in 0..STYLE_XF_COUNT {
        stream.record(biff::XF, &xf(0, true));
    }
    stream.record(biff::XF, &xf(0, false));
    for i in 0..patterns.len() {
        stream.record(biff::XF, &xf(FIRST_CUSTOM_FORMAT + i as u16, false));
    }
    stream.record(biff::STYLE, &[0x00, 0x80, 0x00, 0xFF]);

    let mut positions = Vec::with_capacity(sheets.len());
    for name in sheet_names(sheets) {
        positions.push(stream.position() + 4);
        let mut payload = Payload::new();
        payload
            .u32(0)
            .u16(0)
            .bytes(&biff::short_unicode_string(&name));
        stream.record(biff::BOUNDSHEET, &payload.0);
    }

    biff::write_sst(&mut stream, strings.strings(), strings.references() as u32);
    stream.record(biff::EOF, &[]);

    for (offset, sheet_stream) in positions.into_iter().zip(sheet_streams) {
        let start = stream.position() as u32;
        stream.patch_u32(offset, start);
        stream.append(sheet_stream);
    }

    let workbook = stream.into_inner();
    log::debug!(
        "encoded xls workbook: {} sheets, {} shared strings, {} byte stream",
        sheets.len(),
        strings.count(),
        workbook.len()
    );
    package(&workbook)
}

/// Wrap the workbook stream in a compound file
///
/// BIFF8 readers expect the version 3 layout with 512-byte sectors.
fn package(workbook: &[u8]) -> Result<Vec<u8>> {
    let mut compound =
        cfb::CompoundFile::create_with_version(cfb::Version::V3, Cursor::new(Vec::new()))?;
    {
        let mut stream = compound.create_stream("/Workbook")?;
        stream.write_all(workbook)?;
        stream.flush()?;
    }
    compound.flush()?;
    Ok(compound.into_inner().into_inner())
}

fn check_limits(sheet: &Sheet) -> Result<()> {
    if let Some((last_row, last_col)) = sheet.extent() {
        if last_row >= MAX_ROWS || last_col >= MAX_COLS {
            return Err(SheetError::WriteError(format!(
                "sheet '{}' exceeds the xls limit of {} rows and {} columns",
                sheet.name, MAX_ROWS, MAX_COLS
            )));
        }
    }
    Ok(())
}

/// Names are cut to 31 characters
fn sheet_name(name: &str) -> String {
    name.chars().take(MAX_SHEET_NAME).collect()
}

/// Truncated names, with a `~n` suffix where truncation made two equal.
/// Excel compares sheet names case-insensitively.
fn sheet_names(sheets: &[Sheet]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(sheets.len());
    let mut names = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        let mut name = sheet_name(&sheet.name);
        let mut n = 1;
        while taken.contains(&name.to_lowercase()) {
            let suffix = format!("~{}", n);
            let keep = MAX_SHEET_NAME - suffix.len();
            name = sheet.name.chars().take(keep).collect::<String>() + &suffix;
            n += 1;
        }
        taken.insert(name.to_lowercase());
        names.push(name);
    }
    names
}

fn encode_sheet(sheet: &Sheet, patterns: &[String], strings: &mut SharedStrings) -> RecordStream {
    let mut stream = RecordStream::new();
    stream.record(biff::BOF, &bof(biff::SUBSTREAM_WORKSHEET));

    let first_row = sheet.rows.keys().next().copied().unwrap_or(0);
    let first_col = sheet
        .rows
        .values()
        .filter_map(|cells| cells.keys().next())
        .min()
        .copied()
        .unwrap_or(0);
    let mut dimensions = Payload::new();
    match sheet.extent() {
        Some((last_row, last_col)) => dimensions
            .u32(first_row)
            .u32(last_row + 1)
            .u16(first_col as u16)
            .u16(last_col as u16 + 1),
        None => dimensions.u32(0).u32(0).u16(0).u16(0),
    };
    dimensions.u16(0);
    stream.record(biff::DIMENSIONS, &dimensions.0);
    stream.record(biff::WSBOOL, &0x04C1u16.to_le_bytes());

    for (&row, cells) in &sheet.rows {
        for (&col, cell) in cells {
            let mut payload = Payload::new();
            payload.u16(row as u16).u16(col as u16);
            match &cell.value {
                CellValue::Empty => {
                    payload.u16(DEFAULT_CELL_XF);
                    stream.record(biff::BLANK, &payload.0);
                }
                CellValue::String(s) => label(&mut stream, payload, strings, s),
                CellValue::Int(i) => {
                    payload.u16(DEFAULT_CELL_XF).f64(*i as f64);
                    stream.record(biff::NUMBER, &payload.0);
                }
                CellValue::Float(f) if f.is_finite() => {
                    payload.u16(DEFAULT_CELL_XF).f64(*f);
                    stream.record(biff::NUMBER, &payload.0);
                }
                CellValue::Float(f) => label(&mut stream, payload, strings, &f.to_string()),
                CellValue::Bool(b) => {
                    payload.u16(DEFAULT_CELL_XF).u8(*b as u8).u8(0);
                    stream.record(biff::BOOLERR, &payload.0);
                }
                CellValue::DateTime(dt) => {
                    let xf = cell
                        .date_pattern()
                        .and_then(|p| patterns.iter().position(|q| q == p))
                        .map_or(DEFAULT_CELL_XF, |i| DEFAULT_CELL_XF + 1 + i as u16);
                    payload.u16(xf).f64(to_serial(*dt, false));
                    stream.record(biff::NUMBER, &payload.0);
                }
                CellValue::Error(code) => match error_code(code) {
                    Some(byte) => {
                        payload.u16(DEFAULT_CELL_XF).u8(byte).u8(1);
                        stream.record(biff::BOOLERR, &payload.0);
                    }
                    None => label(&mut stream, payload, strings, code),
                },
            }
        }
    }

    stream.record(biff::WINDOW2, &window2());
    stream.record(biff::EOF, &[]);
    stream
}

fn label(stream: &mut RecordStream, mut payload: Payload, strings: &mut SharedStrings, text: &str) {
    payload.u16(DEFAULT_CELL_XF).u32(strings.add_string(text));
    stream.record(biff::LABELSST, &payload.0);
}

fn error_code(code: &str) -> Option<u8> {
    Some(match code {
        "#NULL!" => 0x00,
        "#DIV/0!" => 0x07,
        "#VALUE!" => 0x0F,
        "#REF!" => 0x17,
        "#NAME?" => 0x1D,
        "#NUM!" => 0x24,
        "#N/A" => 0x2A,
        _ => return None,
    })
}

fn bof(substream: u16) -> Vec<u8> {
    let mut payload = Payload::new();
    payload
        .u16(0x0600)
        .u16(substream)
        .u16(0x0DBB)
        .u16(0x07CC)
        .u32(0)
        .u32(6);
    payload.0
}

fn window1() -> Vec<u8> {
    let mut payload = Payload::new();
    for v in [0u16, 0, 0x3000, 0x1E00, 0x0038, 0, 0, 1, 0x0258] {
        payload.u16(v);
    }
    payload.0
}

fn window2() -> Vec<u8> {
    let mut payload = Payload::new();
    for v in [0x06B6u16, 0, 0, 0x0040, 0, 0, 0, 0, 0] {
        payload.u16(v);
    }
    payload.0
}

/// 10pt Arial
fn font() -> Vec<u8> {
    let mut payload = Payload::new();
    payload
        .u16(200)
        .u16(0)
        .u16(0x7FFF)
        .u16(400)
        .u16(0)
        .u8(0)
        .u8(0)
        .u8(0)
        .u8(0)
        .bytes(&biff::short_unicode_string("Arial"));
    payload.0
}

fn xf(format: u16, style: bool) -> Vec<u8> {
    let mut payload = Payload::new();
    payload
        .u16(0)
        .u16(format)
        .u16(if style { 0xFFF5 } else { 0x0001 })
        .u8(0x20)
        .u8(0)
        .u8(0)
        .u8(if format >= FIRST_CUSTOM_FORMAT { 0x04 } else { 0 })
        .u16(0)
        .u16(0)
        .u32(0)
        .u16(0x20C0);
    payload.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::book::BookCell;

    fn book_with(row: u32, col: u32, value: CellValue) -> Book {
        let mut book = Book::default();
        let index = book.open_sheet("data");
        book.sheets[index].rows.entry(row).or_default().insert(
            col,
            BookCell {
                value,
                pattern: None,
            },
        );
        book
    }

    #[test]
    fn test_limits() {
        assert!(encode(&book_with(65_535, 255, CellValue::Int(1))).is_ok());
        assert!(matches!(
            encode(&book_with(65_536, 0, CellValue::Int(1))),
            Err(SheetError::WriteError(_))
        ));
        assert!(matches!(
            encode(&book_with(0, 256, CellValue::Int(1))),
            Err(SheetError::WriteError(_))
        ));
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(bof(biff::SUBSTREAM_WORKBOOK).len(), 16);
        assert_eq!(window1().len(), 18);
        assert_eq!(window2().len(), 18);
        assert_eq!(xf(0, true).len(), 20);
        assert_eq!(font().len(), 14 + 2 + 5);
    }

    #[test]
    fn test_sheet_names_are_truncated() {
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
        assert_eq!(sheet_name("short"), "short");
    }

    #[test]
    fn test_truncated_names_stay_unique() {
        let long = "quarterly revenue by region and product";
        let longer = format!("{} line", long);
        let sheets: Vec<Sheet> = [long, longer.as_str(), "Other", "OTHER"]
            .iter()
            .map(|name| Sheet {
                name: name.to_string(),
                ..Sheet::default()
            })
            .collect();
        let names = sheet_names(&sheets);
        assert_eq!(names[0], "quarterly revenue by region and");
        assert_eq!(names[1], "quarterly revenue by region a~1");
        assert_eq!(names[2], "Other");
        assert_eq!(names[3], "OTHER~1");
        assert!(names.iter().all(|n| n.chars().count() <= MAX_SHEET_NAME));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(error_code("#DIV/0!"), Some(0x07));
        assert_eq!(error_code("#SPILL!"), None);
    }
}
