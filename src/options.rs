//! Construction options passed to codecs
//!
//! Options are a small ordered map of string keys to values. Each codec
//! documents the keys it reads; keys it does not know are ignored.

use crate::error::{Result, SheetError};
use indexmap::IndexMap;

/// Value of one option
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Text(String),
    Char(char),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Text(s)
    }
}

impl From<char> for OptionValue {
    fn from(c: char) -> Self {
        OptionValue::Char(c)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<Vec<u8>> for OptionValue {
    fn from(bytes: Vec<u8>) -> Self {
        OptionValue::Bytes(bytes)
    }
}

/// Codec options keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    values: IndexMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, replacing any previous value
    pub fn set(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Text value of `key`; a `Char` is accepted as a one-character string
    pub fn text(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Text(s)) => Ok(Some(s.clone())),
            Some(OptionValue::Char(c)) => Ok(Some(c.to_string())),
            Some(_) => Err(invalid(key, "expected text")),
        }
    }

    /// Single-byte ASCII character value of `key`, as the CSV codec needs
    pub fn ascii_char(&self, key: &str) -> Result<Option<u8>> {
        let c = match self.get(key) {
            None => return Ok(None),
            Some(OptionValue::Char(c)) => *c,
            Some(OptionValue::Text(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => return Err(invalid(key, "expected a single character")),
                }
            }
            Some(_) => return Err(invalid(key, "expected a character")),
        };
        if c.is_ascii() {
            Ok(Some(c as u8))
        } else {
            Err(invalid(key, format!("'{}' is not an ASCII character", c)))
        }
    }

    pub fn bytes(&self, key: &str) -> Result<Option<&[u8]>> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Bytes(b)) => Ok(Some(b.as_slice())),
            Some(_) => Err(invalid(key, "expected bytes")),
        }
    }

    /// Log every key outside `known` at debug level
    pub(crate) fn log_unknown(&self, codec: &str, known: &[&str]) {
        for (key, _) in self.iter() {
            if !known.contains(&key) {
                log::debug!("{} codec ignores unknown option '{}'", codec, key);
            }
        }
    }
}

pub(crate) fn invalid(key: &str, message: impl Into<String>) -> SheetError {
    SheetError::InvalidOption {
        key: key.to_string(),
        message: message.into(),
    }
}
