//! Integration tests for sheetstream

use std::io::{Cursor, Write};

use chrono::{NaiveDate, NaiveDateTime};
use sheetstream::{
    create, create_path, create_with, open, open_path, open_with, CellValue, Event, Input,
    Options, SheetError,
};
use tempfile::Builder;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

fn write_bytes(extension: &str, options: &Options, rows: &[Vec<CellValue>]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut writer = create_with(&mut out, extension, options).unwrap();
        writer.start().unwrap();
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                writer.next_row().unwrap();
            }
            writer.write(row).unwrap();
        }
        writer.close().unwrap();
    }
    out
}

#[test]
fn test_xlsx_file_roundtrip() {
    let temp = Builder::new().suffix(".xlsx").tempfile().unwrap();

    {
        let mut writer = create_path(temp.path()).unwrap();
        writer.start_worksheet("People").unwrap();
        writer.write(&("Name", "Age", "Active")).unwrap();
        writer.next_row().unwrap().write(&("Alice", 30, true)).unwrap();
        writer.next_row().unwrap().write(&("Bob", 25.5, false)).unwrap();
        writer.close().unwrap();
    }

    let mut parser = open_path(temp.path()).unwrap();
    assert_eq!(parser.worksheet_count(), 1);
    let records: Vec<_> = parser.records(false).collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].to_strings(), vec!["Name", "Age", "Active"]);
    assert_eq!(records[1].get_i64(1), Some(30));
    assert_eq!(records[1].get_bool(2), Some(true));
    assert_eq!(records[2].get_f64(1), Some(25.5));
    assert_eq!(records[2].row, 2);
}

#[test]
fn test_typed_values_in_every_binary_format() {
    for extension in ["xlsx", "xls"] {
        let bytes = write_bytes(
            extension,
            &Options::new(),
            &[vec![
                CellValue::Bool(true),
                CellValue::Int(42),
                CellValue::String("hello".into()),
            ]],
        );

        let mut parser = open(&bytes[..]).unwrap();
        let record = parser.next_record(false).unwrap().unwrap();
        assert_eq!(
            record.cells,
            vec![
                CellValue::Bool(true),
                CellValue::Int(42),
                CellValue::String("hello".into())
            ],
            "{}",
            extension
        );
        assert!(parser.next_record(false).unwrap().is_none());
    }
}

#[test]
fn test_large_xls_is_detected_and_read_back() {
    let long = "x".repeat(9000);
    let mut rows: Vec<Vec<CellValue>> = (0..1000)
        .map(|i| {
            vec![
                CellValue::Int(i),
                CellValue::Float(i as f64 + 0.5),
                CellValue::String(format!("row {}", i)),
            ]
        })
        .collect();
    rows.push(vec![CellValue::String(long.clone())]);
    let bytes = write_bytes("xls", &Options::new(), &rows);

    let mut parser = open(&bytes[..]).unwrap();
    let records: Vec<_> = parser.records(false).collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 1001);
    for (i, record) in records[..1000].iter().enumerate() {
        assert_eq!(record.cells, rows[i], "row {}", i);
    }
    assert_eq!(records[1000].get_string(0), Some(long));
}

#[test]
fn test_dates_keep_their_value() {
    let when = at(2024, 2, 29, 13, 45);
    for extension in ["xlsx", "xls"] {
        let mut out = Vec::new();
        {
            let mut writer = create(&mut out, extension).unwrap();
            writer.start().unwrap();
            writer.write(&when).unwrap();
            writer.write_date(when, "dd.MM.yyyy").unwrap();
            writer.close().unwrap();
        }

        let mut parser = open(&out[..]).unwrap();
        let record = parser.next_record(false).unwrap().unwrap();
        assert_eq!(record.get_datetime(0), Some(when), "{}", extension);
        assert_eq!(record.get_datetime(1), Some(when), "{}", extension);
    }
}

#[test]
fn test_csv_with_legacy_encoding() {
    let options = Options::new().set("encoding", "gbk").set("separator_char", ';');
    let bytes = write_bytes(
        "csv",
        &options,
        &[
            vec![CellValue::String("城市".into()), CellValue::String("人口".into())],
            vec![CellValue::String("上海".into()), CellValue::Int(24_870_895)],
        ],
    );
    assert!(std::str::from_utf8(&bytes).is_err());

    let mut parser = open_with(Input::from_bytes(bytes), &options).unwrap();
    let records: Vec<_> = parser.records(false).collect::<Result<_, _>>().unwrap();
    assert_eq!(records[0].to_strings(), vec!["城市", "人口"]);
    assert_eq!(records[1].to_strings(), vec!["上海", "24870895"]);
}

#[test]
fn test_template_is_extended() {
    let template = write_bytes(
        "xlsx",
        &Options::new(),
        &[vec![CellValue::String("header".into())]],
    );

    let mut out = Vec::new();
    {
        let options = Options::new().set("template", template);
        let mut writer = create_with(&mut out, "xlsx", &options).unwrap();
        writer.start_worksheet("sheet1").unwrap();
        writer.next_row().unwrap().write(&"appended").unwrap();
        writer.start_worksheet("extra").unwrap().write(&1).unwrap();
        writer.close().unwrap();
    }

    let mut parser = open(&out[..]).unwrap();
    assert_eq!(parser.worksheet_count(), 2);
    let records: Vec<_> = parser.records(false).collect::<Result<_, _>>().unwrap();
    let strings: Vec<_> = records.iter().map(|r| r.to_strings()).collect();
    assert_eq!(strings, vec![vec!["header"], vec!["appended"], vec!["1"]]);
}

fn truncated_xlsx() -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let parts: [(&str, &str); 4] = [
        (
            "_rels/.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        ),
        (
            "xl/workbook.xml",
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="cut" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
        ),
        (
            "xl/worksheets/sheet1.xml",
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>x</t></is></c><c r="B1"><v>2</v></c></row>"#,
        ),
    ];
    for (name, xml) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[test]
fn test_truncated_worksheet_reports_eof() {
    let mut parser = open(Cursor::new(truncated_xlsx())).unwrap();
    let record = parser.next_record(false).unwrap().unwrap();
    assert_eq!(
        record.cells,
        vec![CellValue::String("x".into()), CellValue::Int(2)]
    );
    assert_eq!(parser.event(), Event::Eof);
    assert!(!parser.has_next());

    let err = parser.advance().unwrap_err();
    assert!(err.is_broken_stream());
}

#[test]
fn test_format_fallback_and_detection() {
    let mut parser = open(&b"PK\x03\x04,not,a,zip\n"[..]).unwrap();
    let record = parser.next_record(false).unwrap().unwrap();
    assert_eq!(record.cells.len(), 4);

    let xls = write_bytes("xls", &Options::new(), &[vec![CellValue::Int(5)]]);
    let mut parser = open(&xls[..]).unwrap();
    assert_eq!(parser.next_record(false).unwrap().unwrap().get_i64(0), Some(5));

    assert!(matches!(open(&b""[..]), Err(SheetError::EmptyInput)));
}

#[test]
fn test_non_peekable_input() {
    let parser = open_with(Input::unbuffered(&b"a,b\n"[..]), &Options::new());
    let record = parser.unwrap().next_record(false).unwrap().unwrap();
    assert_eq!(record.to_strings(), vec!["a", "b"]);

    let xlsx = write_bytes("xlsx", &Options::new(), &[vec![CellValue::Int(9)]]);
    let mut parser = open_with(Input::unbuffered(Cursor::new(xlsx)), &Options::new()).unwrap();
    assert_eq!(parser.next_record(false).unwrap().unwrap().get_i64(0), Some(9));
}

#[test]
fn test_close_is_idempotent() {
    let mut out = Vec::new();
    {
        let mut writer = create(&mut out, "csv").unwrap();
        writer.start().unwrap().write(&"only").unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());
        assert!(matches!(
            writer.write(&"late"),
            Err(SheetError::IllegalState(_))
        ));
    }
    assert_eq!(out, b"only\r\n");

    let mut parser = open(&out[..]).unwrap();
    parser.close().unwrap();
    parser.close().unwrap();
    assert!(!parser.has_next());
    assert!(matches!(parser.advance(), Err(SheetError::IllegalState(_))));
}

#[test]
fn test_unknown_extensions() {
    assert!(matches!(
        create(Vec::new(), "ods"),
        Err(SheetError::NoFactoryFound(_))
    ));

    let temp = Builder::new().suffix(".dat").tempfile().unwrap();
    std::fs::write(temp.path(), "k,v\n").unwrap();
    let mut parser = open_path(temp.path()).unwrap();
    assert_eq!(
        parser.next_record(false).unwrap().unwrap().to_strings(),
        vec!["k", "v"]
    );
}
