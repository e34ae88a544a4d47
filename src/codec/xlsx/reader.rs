//! Pull reader over the parts of an XLSX package

use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use super::styles::parse_date_styles;
use super::{attr, decode_error, resolve_part};
use crate::date::{from_serial, parse_iso};
use crate::error::Result;
use crate::parser::{CellSource, Token};
use crate::reference::parse_cell_reference;
use crate::types::CellValue;

const OFFICE_DOCUMENT: &str = "/officeDocument";
const WORKSHEET: &str = "/worksheet";
const SHARED_STRINGS: &str = "/sharedStrings";
const STYLES: &str = "/styles";

struct SheetEntry {
    name: String,
    path: String,
}

/// Relationship of a part, keyed by id
struct Relationship {
    id: String,
    kind: String,
    target: String,
}

/// Worksheet part being pulled
struct SheetCursor {
    reader: Reader<Cursor<Vec<u8>>>,
    buf: Vec<u8>,
    in_data: bool,
    row: Option<u32>,
    col: Option<u32>,
}

enum Step {
    Open(BytesStart<'static>, bool),
    Close,
    Eof,
    Skip,
}

/// Attributes and content of one `<c>` element
#[derive(Default)]
struct RawCell {
    reference: Option<String>,
    kind: Option<String>,
    style: Option<usize>,
    value: Option<String>,
    inline: Option<String>,
}

pub(crate) struct XlsxSource {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    sheets: Vec<SheetEntry>,
    strings: Vec<String>,
    date_styles: Vec<bool>,
    date1904: bool,
    next_sheet: usize,
    current: Option<SheetCursor>,
}

impl XlsxSource {
    pub(crate) fn open(bytes: Vec<u8>) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(decode_error)?;

        let root_rels = read_part(&mut archive, "_rels/.rels")?
            .ok_or_else(|| decode_error("missing package relationships"))?;
        let workbook_path = parse_relationships(&root_rels)?
            .into_iter()
            .find(|r| r.kind.ends_with(OFFICE_DOCUMENT))
            .map(|r| resolve_part("", &r.target))
            .unwrap_or_else(|| "xl/workbook.xml".to_string());

        let (dir, file) = match workbook_path.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file.to_string()),
            None => (String::new(), workbook_path.clone()),
        };
        let workbook = read_part(&mut archive, &workbook_path)?
            .ok_or_else(|| decode_error(format!("missing workbook part {}", workbook_path)))?;
        let rels_path = resolve_part(&dir, &format!("_rels/{}.rels", file));
        let relationships = match read_part(&mut archive, &rels_path)? {
            Some(xml) => parse_relationships(&xml)?,
            None => Vec::new(),
        };

        let (declared, date1904) = parse_workbook(&workbook)?;
        let mut sheets = Vec::with_capacity(declared.len());
        for (name, rel_id) in declared {
            let rel = relationships
                .iter()
                .find(|r| r.id == rel_id && r.kind.ends_with(WORKSHEET));
            match rel {
                Some(rel) => sheets.push(SheetEntry {
                    name,
                    path: resolve_part(&dir, &rel.target),
                }),
                // Chart sheets and dialogs carry no cells
                None => log::debug!("skipping non-worksheet sheet '{}'", name),
            }
        }

        let part_of = |suffix: &str| {
            relationships
                .iter()
                .find(|r| r.kind.ends_with(suffix))
                .map(|r| resolve_part(&dir, &r.target))
        };
        let strings = match part_of(SHARED_STRINGS) {
            Some(path) => match read_part(&mut archive, &path)? {
                Some(xml) => parse_shared_strings(&xml)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        let date_styles = match part_of(STYLES) {
            Some(path) => match read_part(&mut archive, &path)? {
                Some(xml) => parse_date_styles(&xml)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        log::debug!(
            "xlsx workbook with {} worksheets, {} shared strings",
            sheets.len(),
            strings.len()
        );
        Ok(XlsxSource {
            archive,
            sheets,
            strings,
            date_styles,
            date1904,
            next_sheet: 0,
            current: None,
        })
    }

    fn open_sheet(&mut self) -> Result<Option<Token>> {
        let Some(entry) = self.sheets.get(self.next_sheet) else {
            return Ok(None);
        };
        let name = entry.name.clone();
        let path = entry.path.clone();
        self.next_sheet += 1;

        let xml = read_part(&mut self.archive, &path)?
            .ok_or_else(|| decode_error(format!("missing worksheet part {}", path)))?;
        let mut reader = Reader::from_reader(Cursor::new(xml));
        reader.config_mut().trim_text(false);
        self.current = Some(SheetCursor {
            reader,
            buf: Vec::new(),
            in_data: false,
            row: None,
            col: None,
        });
        log::debug!("reading worksheet '{}' from {}", name, path);
        Ok(Some(Token::Worksheet(name)))
    }

    fn cell_value(&self, cell: RawCell) -> Result<CellValue> {
        let RawCell {
            kind,
            style,
            value,
            inline,
            ..
        } = cell;

        let value = match (kind.as_deref(), value) {
            (Some("inlineStr"), _) => return Ok(inline.map(CellValue::String).unwrap_or_default()),
            (_, None) => return Ok(CellValue::Empty),
            (kind, Some(value)) => (kind, value),
        };

        Ok(match value {
            (Some("s"), index) => {
                let index: usize = index
                    .trim()
                    .parse()
                    .map_err(|_| decode_error(format!("bad shared string index '{}'", index)))?;
                let text = self
                    .strings
                    .get(index)
                    .ok_or_else(|| decode_error(format!("shared string {} out of range", index)))?;
                CellValue::String(text.clone())
            }
            (Some("str"), text) => CellValue::String(text),
            (Some("b"), flag) => CellValue::Bool(matches!(flag.trim(), "1" | "true")),
            (Some("e"), code) => CellValue::Error(code),
            (Some("d"), text) => match parse_iso(&text) {
                Some(date) => CellValue::DateTime(date),
                None => CellValue::String(text),
            },
            (_, number) => {
                let number: f64 = number
                    .trim()
                    .parse()
                    .map_err(|_| decode_error(format!("bad numeric value '{}'", number)))?;
                let is_date = style
                    .and_then(|s| self.date_styles.get(s))
                    .copied()
                    .unwrap_or(false);
                match is_date.then(|| from_serial(number, self.date1904)).flatten() {
                    Some(date) => CellValue::DateTime(date),
                    None => CellValue::from_number(number),
                }
            }
        })
    }

    /// Pull the next row or cell out of the current worksheet.
    ///
    /// `Ok(None)` once `</sheetData>` has been reached.
    fn pull(&mut self) -> Result<Option<Token>> {
        loop {
            let Some(sheet) = self.current.as_mut() else {
                return Ok(None);
            };
            sheet.buf.clear();
            let step = match sheet.reader.read_event_into(&mut sheet.buf)? {
                Event::Start(e) => Step::Open(e.into_owned(), false),
                Event::Empty(e) => Step::Open(e.into_owned(), true),
                Event::End(e) if e.local_name().as_ref() == b"sheetData" => Step::Close,
                Event::Eof => Step::Eof,
                _ => Step::Skip,
            };
            let (element, empty) = match step {
                Step::Open(element, empty) => (element, empty),
                Step::Close => {
                    self.current = None;
                    return Ok(None);
                }
                Step::Eof => return Ok(Some(Token::Eof)),
                Step::Skip => continue,
            };

            match element.local_name().as_ref() {
                b"sheetData" if empty => {
                    self.current = None;
                    return Ok(None);
                }
                b"sheetData" => sheet.in_data = true,
                b"row" if sheet.in_data => {
                    let row = match attr(&element, b"r")?.and_then(|r| r.trim().parse::<u32>().ok()) {
                        Some(r) if r > 0 => r - 1,
                        _ => sheet.row.map_or(0, |r| r + 1),
                    };
                    sheet.row = Some(row);
                    sheet.col = None;
                    return Ok(Some(Token::Record(row)));
                }
                b"c" if sheet.in_data => {
                    let mut cell = read_cell_attributes(&element)?;
                    if !empty {
                        read_cell_content(&mut sheet.reader, &mut sheet.buf, &mut cell)?;
                    }
                    let col = cell
                        .reference
                        .as_deref()
                        .and_then(parse_cell_reference)
                        .map(|(_, col)| col)
                        .unwrap_or_else(|| sheet.col.map_or(0, |c| c + 1));
                    sheet.col = Some(col);
                    let value = self.cell_value(cell)?;
                    return Ok(Some(Token::Cell(col, value)));
                }
                _ => {}
            }
        }
    }
}

impl CellSource for XlsxSource {
    fn next_token(&mut self) -> Result<Token> {
        loop {
            if self.current.is_none() {
                return Ok(self.open_sheet()?.unwrap_or(Token::End));
            }
            if let Some(token) = self.pull()? {
                return Ok(token);
            }
        }
    }

    fn worksheet_count(&self) -> usize {
        self.sheets.len()
    }

    fn close(&mut self) -> Result<()> {
        self.current = None;
        self.strings.clear();
        Ok(())
    }
}

fn read_cell_attributes(element: &BytesStart) -> Result<RawCell> {
    Ok(RawCell {
        reference: attr(element, b"r")?,
        kind: attr(element, b"t")?,
        style: attr(element, b"s")?.and_then(|s| s.trim().parse().ok()),
        ..RawCell::default()
    })
}

/// Consume a `<c>` element up to its end tag, collecting `<v>` and `<is>` text
fn read_cell_content(
    reader: &mut Reader<Cursor<Vec<u8>>>,
    buf: &mut Vec<u8>,
    cell: &mut RawCell,
) -> Result<()> {
    let mut in_value = false;
    let mut in_inline = false;
    let mut in_phonetic = false;
    let mut in_text = false;

    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => in_value = true,
                b"is" => in_inline = true,
                b"rPh" => in_phonetic = true,
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"v" => {
                cell.value.get_or_insert_with(String::new);
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                if in_value {
                    cell.value.get_or_insert_with(String::new).push_str(&text);
                } else if in_inline && in_text && !in_phonetic {
                    cell.inline.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if in_value {
                    cell.value.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"c" => return Ok(()),
                b"v" => in_value = false,
                b"is" => in_inline = false,
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => return Err(decode_error("worksheet ended inside a cell")),
            _ => {}
        }
    }
}

/// Upper bound on the buffer reserved up front for a part
const MAX_PREALLOCATION: u64 = 1 << 20;

/// Read a whole part; `None` when the archive has no such entry
fn read_part(archive: &mut ZipArchive<Cursor<Vec<u8>>>, path: &str) -> Result<Option<Vec<u8>>> {
    let mut entry = match archive.by_name(path) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(decode_error(e)),
    };
    // The declared size comes from the archive and is not trusted
    let mut bytes = Vec::with_capacity(entry.size().min(MAX_PREALLOCATION) as usize);
    entry.read_to_end(&mut bytes).map_err(decode_error)?;
    Ok(Some(bytes))
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id")?, attr(&e, b"Target")?) {
                    relationships.push(Relationship {
                        id,
                        kind: attr(&e, b"Type")?.unwrap_or_default(),
                        target,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(relationships)
}

/// Declared sheets as `(name, relationship id)` plus the date system flag
fn parse_workbook(xml: &[u8]) -> Result<(Vec<(String, String)>, bool)> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut date1904 = false;
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"workbookPr" => {
                    date1904 = matches!(attr(&e, b"date1904")?.as_deref(), Some("1" | "true"));
                }
                b"sheet" => {
                    if let (Some(name), Some(id)) = (attr(&e, b"name")?, attr(&e, b"id")?) {
                        sheets.push((name, id));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok((sheets, date1904))
}

/// Shared string items; rich text runs are joined and phonetic runs skipped
fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(e) if in_text && !in_phonetic => {
                if let Some(current) = current.as_mut() {
                    current.push_str(&e.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    #[test]
    fn test_declared_part_size_is_capped() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("part.xml", options).unwrap();
        zip.write_all(b"x").unwrap();
        let mut bytes = zip.finish().unwrap().into_inner();

        // Uncompressed size of the central directory entry
        let central = bytes.windows(4).position(|w| w == b"PK\x01\x02").unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let part = read_part(&mut archive, "part.xml").unwrap().unwrap();
        assert_eq!(part, b"x");
        assert!(part.capacity() <= MAX_PREALLOCATION as usize);
    }

    #[test]
    fn test_parse_shared_strings() {
        let xml = br#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3">
<si><t>plain</t></si>
<si><r><t>rich </t></r><r><rPr><b/></rPr><t>text</t></r><rPh sb="0" eb="1"><t>skip</t></rPh></si>
<si><t xml:space="preserve"> a &amp; b </t></si>
<si/>
</sst>"#;
        assert_eq!(
            parse_shared_strings(xml).unwrap(),
            vec!["plain", "rich text", " a & b ", ""]
        );
    }

    #[test]
    fn test_parse_workbook() {
        let xml = br#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<workbookPr date1904="1"/>
<sheets><sheet name="Data" sheetId="1" r:id="rId3"/><sheet name="Q&amp;A" sheetId="2" r:id="rId1"/></sheets>
</workbook>"#;
        let (sheets, date1904) = parse_workbook(xml).unwrap();
        assert!(date1904);
        assert_eq!(
            sheets,
            vec![
                ("Data".to_string(), "rId3".to_string()),
                ("Q&A".to_string(), "rId1".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_relationships() {
        let xml = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;
        let rels = parse_relationships(xml).unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].id, "rId1");
        assert!(rels[0].kind.ends_with(WORKSHEET));
        assert_eq!(rels[0].target, "worksheets/sheet1.xml");
    }
}
