//! Packs a [`Book`] into an XLSX archive

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::shared_strings::SharedStrings;
use super::styles::StyleTable;
use super::xml_writer::XmlWriter;
use super::{PACKAGE_RELATIONSHIPS_NS, RELATIONSHIPS_NS, SPREADSHEETML_NS};
use crate::codec::book::{Book, BookCell, Sheet};
use crate::date::to_serial;
use crate::error::Result;
use crate::reference::cell_reference;
use crate::types::CellValue;

const DEFAULT_SHEET: &str = "sheet1";

const CONTENT_TYPES_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;

const APP_PROPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>sheetstream</Application>
<DocSecurity>0</DocSecurity>
<ScaleCrop>false</ScaleCrop>
<LinksUpToDate>false</LinksUpToDate>
<SharedDoc>false</SharedDoc>
<HyperlinksChanged>false</HyperlinksChanged>
</Properties>"#;

/// Encode the whole workbook as XLSX bytes
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

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(6));
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let styles = StyleTable::new(book.date_patterns());
    let mut strings = SharedStrings::new();

    zip.start_file("[Content_Types].xml", options)?;
    write_content_types(&mut zip, sheets.len())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    zip.start_file("docProps/core.xml", options)?;
    write_core_props(&mut zip)?;

    zip.start_file("docProps/app.xml", options)?;
    zip.write_all(APP_PROPS.as_bytes())?;

    zip.start_file("xl/workbook.xml", options)?;
    write_workbook_xml(&mut XmlWriter::new(&mut zip), sheets)?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    write_workbook_rels(&mut XmlWriter::new(&mut zip), sheets.len())?;

    for (i, sheet) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        write_sheet(&mut XmlWriter::new(&mut zip), sheet, &styles, &mut strings)?;
    }

    // Strings are collected while the sheets are written
    zip.start_file("xl/styles.xml", options)?;
    styles.write_xml(&mut XmlWriter::new(&mut zip))?;

    zip.start_file("xl/sharedStrings.xml", options)?;
    strings.write_xml(&mut XmlWriter::new(&mut zip))?;

    let bytes = zip.finish()?.into_inner();
    log::debug!(
        "encoded xlsx workbook: {} sheets, {} shared strings, {} bytes",
        sheets.len(),
        strings.count(),
        bytes.len()
    );
    Ok(bytes)
}

fn write_content_types<W: Write>(writer: &mut W, sheet_count: usize) -> Result<()> {
    writer.write_all(CONTENT_TYPES_HEAD.as_bytes())?;
    for i in 1..=sheet_count {
        writeln!(
            writer,
            "<Override PartName=\"/xl/worksheets/sheet{}.xml\" \
             ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
            i
        )?;
    }
    writer.write_all(b"</Types>")?;
    Ok(())
}

fn write_core_props<W: Write>(writer: &mut W) -> Result<()> {
    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    write!(
        writer,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>sheetstream</dc:creator>
<dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified>
</cp:coreProperties>"#
    )?;
    Ok(())
}

fn write_workbook_xml<W: Write>(writer: &mut XmlWriter<W>, sheets: &[Sheet]) -> Result<()> {
    writer.declaration()?;
    writer.start_element("workbook")?;
    writer.attribute("xmlns", SPREADSHEETML_NS)?;
    writer.attribute("xmlns:r", RELATIONSHIPS_NS)?;
    writer.close_start_tag()?;

    writer.start_element("sheets")?;
    writer.close_start_tag()?;
    for (i, sheet) in sheets.iter().enumerate() {
        writer.start_element("sheet")?;
        writer.attribute("name", &sheet.name)?;
        writer.attribute_int("sheetId", i as u64 + 1)?;
        writer.attribute("r:id", &format!("rId{}", i + 1))?;
        writer.close_empty()?;
    }
    writer.end_element("sheets")?;

    writer.end_element("workbook")?;
    writer.flush()
}

/// Sheets take `rId1..=n`, then styles and shared strings
fn write_workbook_rels<W: Write>(writer: &mut XmlWriter<W>, sheet_count: usize) -> Result<()> {
    writer.declaration()?;
    writer.start_element("Relationships")?;
    writer.attribute("xmlns", PACKAGE_RELATIONSHIPS_NS)?;
    writer.close_start_tag()?;

    let targets = (1..=sheet_count)
        .map(|i| ("worksheet", format!("worksheets/sheet{}.xml", i)))
        .chain([
            ("styles", "styles.xml".to_string()),
            ("sharedStrings", "sharedStrings.xml".to_string()),
        ]);
    for (i, (kind, target)) in targets.enumerate() {
        writer.start_element("Relationship")?;
        writer.attribute("Id", &format!("rId{}", i + 1))?;
        writer.attribute("Type", &format!("{}/{}", RELATIONSHIPS_NS, kind))?;
        writer.attribute("Target", &target)?;
        writer.close_empty()?;
    }

    writer.end_element("Relationships")?;
    writer.flush()
}

fn write_sheet<W: Write>(
    writer: &mut XmlWriter<W>,
    sheet: &Sheet,
    styles: &StyleTable,
    strings: &mut SharedStrings,
) -> Result<()> {
    writer.declaration()?;
    writer.start_element("worksheet")?;
    writer.attribute("xmlns", SPREADSHEETML_NS)?;
    writer.attribute("xmlns:r", RELATIONSHIPS_NS)?;
    writer.close_start_tag()?;

    let first_row = sheet.rows.keys().next().copied().unwrap_or(0);
    let first_col = sheet
        .rows
        .values()
        .filter_map(|cells| cells.keys().next())
        .min()
        .copied()
        .unwrap_or(0);
    let dimension = match sheet.extent() {
        Some((last_row, last_col)) if (first_row, first_col) != (last_row, last_col) => format!(
            "{}:{}",
            cell_reference(first_row, first_col),
            cell_reference(last_row, last_col)
        ),
        _ => cell_reference(first_row, first_col),
    };
    writer.start_element("dimension")?;
    writer.attribute("ref", &dimension)?;
    writer.close_empty()?;

    if sheet.rows.is_empty() {
        writer.write_str("<sheetData/>")?;
    } else {
        writer.start_element("sheetData")?;
        writer.close_start_tag()?;
        for (&row, cells) in &sheet.rows {
            writer.start_element("row")?;
            writer.attribute_int("r", row as u64 + 1)?;
            writer.close_start_tag()?;
            for (&col, cell) in cells {
                write_cell(writer, row, col, cell, styles, strings)?;
            }
            writer.end_element("row")?;
        }
        writer.end_element("sheetData")?;
    }

    writer.end_element("worksheet")?;
    writer.flush()
}

fn write_cell<W: Write>(
    writer: &mut XmlWriter<W>,
    row: u32,
    col: u32,
    cell: &BookCell,
    styles: &StyleTable,
    strings: &mut SharedStrings,
) -> Result<()> {
    writer.start_element("c")?;
    writer.attribute("r", &cell_reference(row, col))?;

    let shared = |strings: &mut SharedStrings, text: &str| {
        let mut buf = itoa::Buffer::new();
        buf.format(strings.add_string(text)).to_string()
    };
    let (kind, value) = match &cell.value {
        CellValue::Empty => return writer.close_empty(),
        CellValue::String(s) => (Some("s"), shared(strings, s)),
        CellValue::Int(i) => {
            let mut buf = itoa::Buffer::new();
            (None, buf.format(*i).to_string())
        }
        CellValue::Float(f) if f.is_finite() => (None, f.to_string()),
        CellValue::Float(f) => (Some("s"), shared(strings, &f.to_string())),
        CellValue::Bool(b) => (Some("b"), if *b { "1" } else { "0" }.to_string()),
        CellValue::DateTime(dt) => {
            if let Some(xf) = cell.date_pattern().and_then(|p| styles.xf_for(p)) {
                writer.attribute_int("s", xf as u64)?;
            }
            (None, to_serial(*dt, false).to_string())
        }
        CellValue::Error(code) => (Some("e"), code.clone()),
    };

    if let Some(kind) = kind {
        writer.attribute("t", kind)?;
    }
    writer.close_start_tag()?;
    writer.text_element("v", &value)?;
    writer.end_element("c")
}
