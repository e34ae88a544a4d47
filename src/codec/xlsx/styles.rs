//! Cell formats: detecting date styles on read, declaring them on write

use std::collections::HashMap;
use std::io::Write;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::xml_writer::XmlWriter;
use super::{attr, SPREADSHEETML_NS};
use crate::date::{is_builtin_date_format, is_date_format_code, to_excel_format};
use crate::error::Result;

/// First id available to custom number formats
pub const FIRST_CUSTOM_FORMAT: u32 = 164;

/// For each cell format of `styles.xml`, whether it displays a date
pub fn parse_date_styles(xml: &[u8]) -> Result<Vec<bool>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut custom: HashMap<u32, bool> = HashMap::new();
    let mut in_cell_xfs = false;
    let mut dates = Vec::new();

    loop {
        buf.clear();
        let (element, empty) = match reader.read_event_into(&mut buf)? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                if e.local_name().as_ref() == b"cellXfs" {
                    in_cell_xfs = false;
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        match element.local_name().as_ref() {
            b"numFmt" => {
                let id = attr(&element, b"numFmtId")?.and_then(|v| v.parse::<u32>().ok());
                if let (Some(id), Some(code)) = (id, attr(&element, b"formatCode")?) {
                    custom.insert(id, is_date_format_code(&code));
                }
            }
            b"cellXfs" => in_cell_xfs = !empty,
            b"xf" if in_cell_xfs => {
                let id = attr(&element, b"numFmtId")?
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(0);
                let is_date = custom
                    .get(&id)
                    .copied()
                    .unwrap_or_else(|| is_builtin_date_format(id));
                dates.push(is_date);
            }
            _ => {}
        }
    }
    Ok(dates)
}

/// Cell formats of a written workbook: the default format plus one per
/// date pattern
#[derive(Debug, Default)]
pub struct StyleTable {
    patterns: Vec<String>,
}

impl StyleTable {
    pub fn new(patterns: Vec<String>) -> Self {
        StyleTable { patterns }
    }

    /// `s` attribute of a date cell written with `pattern`
    pub fn xf_for(&self, pattern: &str) -> Option<u32> {
        self.patterns
            .iter()
            .position(|p| p == pattern)
            .map(|i| i as u32 + 1)
    }

    pub fn write_xml<W: Write>(&self, writer: &mut XmlWriter<W>) -> Result<()> {
        writer.declaration()?;
        writer.start_element("styleSheet")?;
        writer.attribute("xmlns", SPREADSHEETML_NS)?;
        writer.close_start_tag()?;

        if !self.patterns.is_empty() {
            writer.start_element("numFmts")?;
            writer.attribute_int("count", self.patterns.len() as u64)?;
            writer.close_start_tag()?;
            for (i, pattern) in self.patterns.iter().enumerate() {
                writer.start_element("numFmt")?;
                writer.attribute_int("numFmtId", (FIRST_CUSTOM_FORMAT as usize + i) as u64)?;
                writer.attribute("formatCode", &to_excel_format(pattern))?;
                writer.close_empty()?;
            }
            writer.end_element("numFmts")?;
        }

        writer.write_str(
            "<fonts count=\"1\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>\
             <fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill>\
             <fill><patternFill patternType=\"gray125\"/></fill></fills>\
             <borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>\
             <cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>",
        )?;

        writer.start_element("cellXfs")?;
        writer.attribute_int("count", self.patterns.len() as u64 + 1)?;
        writer.close_start_tag()?;
        writer.write_str("<xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>")?;
        for i in 0..self.patterns.len() {
            writer.start_element("xf")?;
            writer.attribute_int("numFmtId", (FIRST_CUSTOM_FORMAT as usize + i) as u64)?;
            writer.write_str(" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\" applyNumberFormat=\"1\"")?;
            writer.close_empty()?;
        }
        writer.end_element("cellXfs")?;

        writer.write_str(
            "<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>",
        )?;
        writer.end_element("styleSheet")?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_styles() {
        let xml = br#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="2"><numFmt numFmtId="164" formatCode="dd/mm/yyyy"/><numFmt numFmtId="165" formatCode="0.000"/></numFmts>
<cellStyleXfs count="1"><xf numFmtId="14"/></cellStyleXfs>
<cellXfs count="5"><xf numFmtId="0"/><xf numFmtId="14"/><xf numFmtId="164"/><xf numFmtId="165"/><xf/></cellXfs>
</styleSheet>"#;
        assert_eq!(
            parse_date_styles(xml).unwrap(),
            vec![false, true, true, false, false]
        );
    }

    #[test]
    fn test_written_styles_read_back() {
        let table = StyleTable::new(vec!["yyyy-MM-dd".to_string(), "HH:mm".to_string()]);
        assert_eq!(table.xf_for("HH:mm"), Some(2));
        assert_eq!(table.xf_for("MM/yy"), None);

        let mut out = Vec::new();
        table.write_xml(&mut XmlWriter::new(&mut out)).unwrap();
        assert_eq!(parse_date_styles(&out).unwrap(), vec![false, true, true]);
        assert!(String::from_utf8(out).unwrap().contains("formatCode=\"yyyy-mm-dd\""));
    }
}
