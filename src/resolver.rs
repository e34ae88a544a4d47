//! Byte-signature format resolution
//!
//! [`MixedFactory`] opens a parser without knowing the format up front. It
//! peeks at the leading bytes, ranks the candidate formats by signature and
//! tries them in order until one accepts the content.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Result, SheetError};
use crate::input::Input;
use crate::options::Options;
use crate::parser::SpreadsheetParser;
use crate::registry::{CodecFactory, Format};
use crate::writer::SpreadsheetWriter;

/// Peek length when no candidate declares a signature
const DEFAULT_PEEK_LEN: usize = 8;

/// Order candidates for the peeked leading bytes.
///
/// Candidates whose signature prefixes `peeked` come first, longest
/// signature first; candidates with an empty signature follow. Candidates
/// sharing a signature keep their relative order.
pub fn rank_candidates<F: Clone>(candidates: &[(Format, F)], peeked: &[u8]) -> Vec<(Format, F)> {
    let mut ranked: Vec<(Format, F)> = candidates
        .iter()
        .filter(|(format, _)| {
            let signature = format.signature();
            !signature.is_empty() && peeked.starts_with(signature)
        })
        .cloned()
        .collect();
    ranked.sort_by(|a, b| b.0.signature().len().cmp(&a.0.signature().len()));

    ranked.extend(
        candidates
            .iter()
            .filter(|(format, _)| format.signature().is_empty())
            .cloned(),
    );
    ranked
}

/// Parser factory that detects the format of its input
#[derive(Clone)]
pub struct MixedFactory {
    candidates: Vec<(Format, Arc<dyn CodecFactory>)>,
}

impl MixedFactory {
    pub fn new(candidates: Vec<(Format, Arc<dyn CodecFactory>)>) -> Self {
        MixedFactory { candidates }
    }

    pub fn formats(&self) -> Vec<Format> {
        self.candidates.iter().map(|(f, _)| f.clone()).collect()
    }

    fn peek_len(&self) -> usize {
        self.candidates
            .iter()
            .map(|(f, _)| f.signature().len())
            .max()
            .filter(|len| *len > 0)
            .unwrap_or(DEFAULT_PEEK_LEN)
    }

    fn open_ranked<'a>(
        &self,
        input: Input<'a>,
        ranked: Vec<(Format, Arc<dyn CodecFactory>)>,
        options: &Options,
    ) -> Result<SpreadsheetParser<'a>> {
        if let [(format, factory)] = ranked.as_slice() {
            log::debug!("opening input as {}", format);
            return factory.open_read(input, options);
        }

        // Every attempt needs the stream from its first byte
        let bytes = input.into_bytes()?;
        let mut last_error = None;
        for (format, factory) in ranked {
            log::debug!("trying input as {}", format);
            match factory.open_read(Input::from_bytes(bytes.clone()), options) {
                Ok(parser) => return Ok(parser),
                Err(e) if e.is_decode_failure() => {
                    log::debug!("input is not {}: {}", format, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| SheetError::NoFactoryFound("no candidate format".into())))
    }

    /// Try every factory on a stream that cannot be peeked.
    ///
    /// Bytes consumed by a failed attempt are replayed to the next one.
    fn open_degraded<'a>(&self, input: Input<'a>, options: &Options) -> Result<SpreadsheetParser<'a>> {
        let shared = Rc::new(RefCell::new(Rewind {
            input,
            consumed: Vec::new(),
            recording: true,
        }));
        let mut tried: Vec<*const ()> = Vec::new();
        let mut last_error = None;

        for (format, factory) in &self.candidates {
            let id = Arc::as_ptr(factory) as *const ();
            if tried.contains(&id) {
                continue;
            }
            tried.push(id);

            let attempt = Input::unbuffered(SharedReader {
                shared: shared.clone(),
                pos: 0,
            });
            match factory.open_read(attempt, options) {
                Ok(parser) => {
                    shared.borrow_mut().recording = false;
                    return Ok(parser);
                }
                Err(e) if e.is_decode_failure() => {
                    log::warn!(
                        "cannot detect the format of a non-peekable stream, {} failed: {}. \
                         Wrap the stream in a BufReader to enable signature detection",
                        format,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let last = last_error
            .unwrap_or_else(|| SheetError::NoFactoryFound("no candidate format".to_string()));
        Err(SheetError::NotPeekable {
            source: Box::new(last),
        })
    }
}

impl CodecFactory for MixedFactory {
    fn supported_formats(&self) -> Vec<Format> {
        self.formats()
    }

    fn open_read<'a>(&self, mut input: Input<'a>, options: &Options) -> Result<SpreadsheetParser<'a>> {
        let peeked = match input.peek(self.peek_len())? {
            Some(peeked) => peeked,
            None => return self.open_degraded(input, options),
        };
        if peeked.is_empty() {
            return Err(SheetError::EmptyInput);
        }

        let ranked = rank_candidates(&self.candidates, &peeked);
        log::debug!(
            "signature {:02X?} ranks {:?}",
            peeked,
            ranked.iter().map(|(f, _)| f.name()).collect::<Vec<_>>()
        );
        if ranked.is_empty() {
            return Err(SheetError::NoFactoryFound(format!(
                "no format matches signature {:02X?}",
                peeked
            )));
        }
        self.open_ranked(input, ranked, options)
    }

    fn open_write<'a>(
        &self,
        _output: Box<dyn Write + 'a>,
        _options: &Options,
    ) -> Result<SpreadsheetWriter<'a>> {
        Err(SheetError::NotSupported(
            "format detection only applies to parsing, resolve a writer by extension".to_string(),
        ))
    }
}

impl std::fmt::Debug for MixedFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixedFactory")
            .field("formats", &self.formats())
            .finish()
    }
}

/// Live input plus the bytes read from it so far
struct Rewind<'a> {
    input: Input<'a>,
    consumed: Vec<u8>,
    recording: bool,
}

/// One attempt's view of the shared input, starting from its first byte
struct SharedReader<'a> {
    shared: Rc<RefCell<Rewind<'a>>>,
    pos: usize,
}

impl Read for SharedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rewind = self.shared.borrow_mut();
        if self.pos < rewind.consumed.len() {
            let n = buf.len().min(rewind.consumed.len() - self.pos);
            buf[..n].copy_from_slice(&rewind.consumed[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        let n = rewind.input.read(buf)?;
        if rewind.recording {
            rewind.consumed.extend_from_slice(&buf[..n]);
            self.pos += n;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BuiltinCodec;
    use crate::types::CellValue;

    fn candidates() -> Vec<(Format, &'static str)> {
        vec![
            (Format::new("any", b"", &["txt"]), "any"),
            (Format::new("short", b"AB", &["ab"]), "short"),
            (Format::new("long", b"ABCDEFGH", &["long"]), "long"),
            (Format::new("other", b"ZZ", &["zz"]), "other"),
            (Format::new("short2", b"AB", &["ab2"]), "short2"),
        ]
    }

    fn names(ranked: &[(Format, &'static str)]) -> Vec<&'static str> {
        ranked.iter().map(|(_, n)| *n).collect()
    }

    #[test]
    fn test_rank_longest_signature_first() {
        let ranked = rank_candidates(&candidates(), b"ABCDEFGH");
        assert_eq!(names(&ranked), vec!["long", "short", "short2", "any"]);
    }

    #[test]
    fn test_rank_short_peek_cannot_match_long_signature() {
        let ranked = rank_candidates(&candidates(), b"ABC");
        assert_eq!(names(&ranked), vec!["short", "short2", "any"]);

        let ranked = rank_candidates(&candidates(), b"xyz");
        assert_eq!(names(&ranked), vec!["any"]);
    }

    #[test]
    fn test_rank_without_fallback_can_be_empty() {
        let only_signed: Vec<_> = candidates().into_iter().skip(1).collect();
        assert!(rank_candidates(&only_signed, b"nothing").is_empty());
    }

    fn builtin() -> MixedFactory {
        MixedFactory::new(
            BuiltinCodec::ALL
                .into_iter()
                .map(|c| (c.format(), Arc::new(c) as Arc<dyn CodecFactory>))
                .collect(),
        )
    }

    #[test]
    fn test_peek_length() {
        assert_eq!(builtin().peek_len(), 8);
        let unsigned = MixedFactory::new(vec![(
            Format::csv(),
            Arc::new(BuiltinCodec::Csv) as Arc<dyn CodecFactory>,
        )]);
        assert_eq!(unsigned.peek_len(), DEFAULT_PEEK_LEN);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let result = builtin().open_read(Input::from_bytes(Vec::new()), &Options::new());
        assert!(matches!(result, Err(SheetError::EmptyInput)));
    }

    #[test]
    fn test_falls_back_to_csv() {
        let mut parser = builtin()
            .open_read(Input::from_bytes(b"a,b\n1,2\n".to_vec()), &Options::new())
            .unwrap();
        let record = parser.next_record(false).unwrap().unwrap();
        assert_eq!(record.to_strings(), vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_zip_falls_through_to_csv() {
        let mut parser = builtin()
            .open_read(
                Input::from_bytes(b"PK\x03\x04 not a zip".to_vec()),
                &Options::new(),
            )
            .unwrap();
        assert_eq!(parser.worksheet_count(), 1);
        assert!(parser.next_record(false).unwrap().is_some());
    }

    #[test]
    fn test_degraded_path_replays_consumed_bytes() {
        let input = Input::unbuffered(&b"x,y\n"[..]);
        let mut parser = builtin().open_read(input, &Options::new()).unwrap();
        let record = parser.next_record(false).unwrap().unwrap();
        assert_eq!(record.to_strings(), vec!["x", "y"]);
    }

    #[test]
    fn test_degraded_path_exhaustion_is_not_peekable() {
        let signed_only = MixedFactory::new(vec![(
            Format::xlsx(),
            Arc::new(BuiltinCodec::Xlsx) as Arc<dyn CodecFactory>,
        )]);
        let input = Input::unbuffered(&b"plain text"[..]);
        match signed_only.open_read(input, &Options::new()) {
            Err(SheetError::NotPeekable { source }) => assert!(source.is_decode_failure()),
            other => panic!("expected NotPeekable, got {:?}", other),
        }
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn test_degraded_path_stops_on_io_error() {
        match builtin().open_read(Input::unbuffered(Failing), &Options::new()) {
            Err(SheetError::IoError(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected an I/O error, got {:?}", other),
        }
    }

    #[test]
    fn test_signature_survives_short_reads() {
        let mut xlsx = Vec::new();
        {
            let mut writer = BuiltinCodec::Xlsx
                .open_write(Box::new(&mut xlsx), &Options::new())
                .unwrap();
            writer.start().unwrap().write(&42).unwrap();
            writer.close().unwrap();
        }
        let input = Input::buffered(io::BufReader::new(TwoBytes(&xlsx)));
        let mut parser = builtin().open_read(input, &Options::new()).unwrap();
        let record = parser.next_record(false).unwrap().unwrap();
        assert_eq!(record.cells, vec![CellValue::Int(42)]);
    }

    struct TwoBytes<'a>(&'a [u8]);

    impl Read for TwoBytes<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(2).min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_writing_is_not_supported() {
        let result = builtin().open_write(Box::new(Vec::<u8>::new()), &Options::new());
        assert!(matches!(result, Err(SheetError::NotSupported(_))));
    }
}
