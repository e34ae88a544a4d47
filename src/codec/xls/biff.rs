//! BIFF8 record stream construction
//!
//! Every record is a little-endian `(id: u16, len: u16)` header followed by
//! at most [`MAX_RECORD_DATA`] bytes of payload. Longer payloads spill into
//! CONTINUE records.

pub const BOF: u16 = 0x0809;
pub const EOF: u16 = 0x000A;
pub const CODEPAGE: u16 = 0x0042;
pub const DATE1904: u16 = 0x0022;
pub const WINDOW1: u16 = 0x003D;
pub const FONT: u16 = 0x0031;
pub const FORMAT: u16 = 0x041E;
pub const XF: u16 = 0x00E0;
pub const STYLE: u16 = 0x0293;
pub const BOUNDSHEET: u16 = 0x0085;
pub const SST: u16 = 0x00FC;
pub const CONTINUE: u16 = 0x003C;
pub const DIMENSIONS: u16 = 0x0200;
pub const WSBOOL: u16 = 0x0081;
pub const WINDOW2: u16 = 0x023E;
pub const NUMBER: u16 = 0x0203;
pub const LABELSST: u16 = 0x00FD;
pub const BOOLERR: u16 = 0x0205;
pub const BLANK: u16 = 0x0201;

pub const MAX_RECORD_DATA: usize = 8224;

/// BOF substream types
pub const SUBSTREAM_WORKBOOK: u16 = 0x0005;
pub const SUBSTREAM_WORKSHEET: u16 = 0x0010;

/// UTF-16LE, the only code page written
pub const CODEPAGE_UTF16: u16 = 1200;

/// Growing workbook stream
#[derive(Debug, Default)]
pub struct RecordStream {
    data: Vec<u8>,
}

impl RecordStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the next record
    pub fn position(&self) -> usize {
        self.data.len()
    }

    /// Append one record; the payload must fit a single record
    pub fn record(&mut self, id: u16, payload: &[u8]) {
        debug_assert!(payload.len() <= MAX_RECORD_DATA);
        self.data.extend_from_slice(&id.to_le_bytes());
        self.data.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.data.extend_from_slice(payload);
    }

    /// Overwrite a `u32` previously written at `offset`
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Append a separately built substream
    pub fn append(&mut self, other: RecordStream) {
        self.data.extend_from_slice(&other.data);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Little-endian payload builder
#[derive(Debug, Default)]
pub struct Payload(pub Vec<u8>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.0.extend_from_slice(v);
        self
    }
}

/// Character data of a BIFF8 string: `(is_utf16, bytes, char count)`.
///
/// ASCII is stored compressed, one byte per character.
pub fn encode_chars(text: &str) -> (bool, Vec<u8>, usize) {
    if text.is_ascii() {
        return (false, text.as_bytes().to_vec(), text.len());
    }
    let units: Vec<u16> = text.encode_utf16().collect();
    let bytes = units.iter().flat_map(|u| u.to_le_bytes()).collect();
    (true, bytes, units.len())
}

/// XLUnicodeString with a 16-bit length
pub fn unicode_string(text: &str) -> Vec<u8> {
    let (wide, bytes, count) = encode_chars(text);
    let mut payload = Payload::new();
    payload.u16(count as u16).u8(wide as u8).bytes(&bytes);
    payload.0
}

/// ShortXLUnicodeString with an 8-bit length
pub fn short_unicode_string(text: &str) -> Vec<u8> {
    let (wide, bytes, count) = encode_chars(text);
    let mut payload = Payload::new();
    payload.u8(count as u8).u8(wide as u8).bytes(&bytes);
    payload.0
}

/// Write the shared string table, splitting it across CONTINUE records.
///
/// A string never splits inside its 3-byte header; a string continued in
/// a new record restarts with its option flags byte.
pub fn write_sst(stream: &mut RecordStream, strings: &[String], total: u32) {
    let mut id = SST;
    let mut buffer = Payload::new();
    buffer.u32(total).u32(strings.len() as u32);

    let mut flush = |buffer: &mut Payload, id: &mut u16| {
        stream.record(*id, &buffer.0);
        buffer.0.clear();
        *id = CONTINUE;
    };

    for text in strings {
        let (wide, bytes, count) = encode_chars(text);
        let unit = if wide { 2 } else { 1 };
        if MAX_RECORD_DATA - buffer.0.len() < 3 + unit {
            flush(&mut buffer, &mut id);
        }
        buffer.u16(count as u16).u8(wide as u8);

        let mut rest = bytes.as_slice();
        loop {
            let room = (MAX_RECORD_DATA - buffer.0.len()) / unit * unit;
            let take = room.min(rest.len());
            buffer.bytes(&rest[..take]);
            rest = &rest[take..];
            if rest.is_empty() {
                break;
            }
            flush(&mut buffer, &mut id);
            buffer.u8(wide as u8);
        }
    }
    flush(&mut buffer, &mut id);
}
