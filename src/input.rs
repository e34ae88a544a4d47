//! Byte input handed to codecs

use std::io::{self, BufRead, Cursor, Read};

enum Source<'a> {
    Buffered(Box<dyn BufRead + 'a>),
    Plain(Box<dyn Read + 'a>),
}

/// A byte stream, peekable when it is backed by a [`BufRead`].
///
/// Format resolution peeks the leading bytes of a buffered input without
/// consuming them. A plain [`Read`] cannot be peeked, so resolution falls
/// back to trying each codec in turn.
pub struct Input<'a> {
    source: Source<'a>,
}

impl<'a> Input<'a> {
    /// Wrap a buffered reader, whose buffer allows peeking
    pub fn buffered<R: BufRead + 'a>(reader: R) -> Self {
        Input {
            source: Source::Buffered(Box::new(reader)),
        }
    }

    /// Wrap a plain reader that cannot be peeked
    pub fn unbuffered<R: Read + 'a>(reader: R) -> Self {
        Input {
            source: Source::Plain(Box::new(reader)),
        }
    }

    pub fn is_peekable(&self) -> bool {
        matches!(self.source, Source::Buffered(_))
    }

    /// Up to `len` leading bytes without consuming them; fewer only at end
    /// of input.
    ///
    /// When the reader's buffer holds less than `len` bytes, the prefix is
    /// read out and chained back in front of the stream. `None` when the
    /// input is not peekable.
    pub fn peek(&mut self, len: usize) -> io::Result<Option<Vec<u8>>> {
        let reader = match &mut self.source {
            Source::Plain(_) => return Ok(None),
            Source::Buffered(reader) => reader,
        };
        let buffered = loop {
            match reader.fill_buf() {
                Ok(buf) => break buf.len(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if buffered >= len {
            return Ok(Some(reader.fill_buf()?[..len].to_vec()));
        }

        let mut prefix = Vec::with_capacity(len);
        (&mut *reader).take(len as u64).read_to_end(&mut prefix)?;
        let rest = std::mem::replace(reader, Box::new(io::empty()));
        *reader = Box::new(Cursor::new(prefix.clone()).chain(rest));
        Ok(Some(prefix))
    }

    /// Read the remaining bytes into memory
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Input<'static> {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Input::buffered(Cursor::new(bytes))
    }
}

impl Read for Input<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            Source::Buffered(reader) => reader.read(buf),
            Source::Plain(reader) => reader.read(buf),
        }
    }
}
