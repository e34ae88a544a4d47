//! Value coercion for the writer
//!
//! [`WriteValue`] turns a Rust value into typed emission calls on a
//! [`CellEmitter`]. Scalars emit one cell; sequences and tuples emit one
//! cell per element, recursively; `None` emits a blank cell.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use std::fmt::Display;

use crate::date::DEFAULT_DATE_PATTERN;
use crate::error::Result;
use crate::types::CellValue;

/// Receiver of typed cell writes; implemented by the writer
pub trait CellEmitter {
    fn emit_bool(&mut self, value: bool) -> Result<()>;
    fn emit_int(&mut self, value: i64) -> Result<()>;
    fn emit_float(&mut self, value: f64) -> Result<()>;
    fn emit_date(&mut self, value: NaiveDateTime, pattern: &str) -> Result<()>;
    fn emit_text(&mut self, value: &str) -> Result<()>;
    fn emit_blank(&mut self) -> Result<()>;
}

/// A value the writer knows how to emit
pub trait WriteValue {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()>;
}

/// Write any `Display` value as text
#[derive(Debug, Clone, Copy)]
pub struct Text<T>(pub T);

impl<T: Display> WriteValue for Text<T> {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_text(&self.0.to_string())
    }
}

/// A date written with an explicit pattern such as `dd/MM/yyyy`
#[derive(Debug, Clone, Copy)]
pub struct Formatted<'p> {
    pub value: NaiveDateTime,
    pub pattern: &'p str,
}

impl WriteValue for Formatted<'_> {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_date(self.value, self.pattern)
    }
}

impl WriteValue for bool {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_bool(*self)
    }
}

macro_rules! write_int {
    ($($t:ty),*) => {
        $(impl WriteValue for $t {
            fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
                out.emit_int(*self as i64)
            }
        })*
    };
}

write_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! write_wide_int {
    ($($t:ty),*) => {
        $(impl WriteValue for $t {
            fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
                match i64::try_from(*self) {
                    Ok(v) => out.emit_int(v),
                    Err(_) => out.emit_float(*self as f64),
                }
            }
        })*
    };
}

write_wide_int!(u64, usize, isize, i128, u128);

impl WriteValue for f32 {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_float(*self as f64)
    }
}

impl WriteValue for f64 {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_float(*self)
    }
}

impl WriteValue for str {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_text(self)
    }
}

impl WriteValue for String {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_text(self)
    }
}

impl WriteValue for char {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        let mut buf = [0u8; 4];
        out.emit_text(self.encode_utf8(&mut buf))
    }
}

impl WriteValue for NaiveDateTime {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_date(*self, DEFAULT_DATE_PATTERN)
    }
}

impl WriteValue for NaiveDate {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_date(self.and_time(chrono::NaiveTime::default()), DEFAULT_DATE_PATTERN)
    }
}

impl<Tz: TimeZone> WriteValue for DateTime<Tz> {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        out.emit_date(self.naive_local(), DEFAULT_DATE_PATTERN)
    }
}

impl WriteValue for CellValue {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        match self {
            CellValue::Empty => out.emit_blank(),
            CellValue::String(s) => out.emit_text(s),
            CellValue::Int(i) => out.emit_int(*i),
            CellValue::Float(f) => out.emit_float(*f),
            CellValue::Bool(b) => out.emit_bool(*b),
            CellValue::DateTime(d) => out.emit_date(*d, DEFAULT_DATE_PATTERN),
            CellValue::Error(e) => out.emit_text(e),
        }
    }
}

impl<T: WriteValue> WriteValue for Option<T> {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        match self {
            Some(value) => value.write_to(out),
            None => out.emit_blank(),
        }
    }
}

impl<T: WriteValue + ?Sized> WriteValue for &T {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        (**self).write_to(out)
    }
}

impl<T: WriteValue + ?Sized> WriteValue for Box<T> {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        (**self).write_to(out)
    }
}

impl<T: WriteValue> WriteValue for [T] {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        for item in self {
            item.write_to(out)?;
        }
        Ok(())
    }
}

impl<T: WriteValue, const N: usize> WriteValue for [T; N] {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        self.as_slice().write_to(out)
    }
}

impl<T: WriteValue> WriteValue for Vec<T> {
    fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
        self.as_slice().write_to(out)
    }
}

macro_rules! write_tuple {
    ($($name:ident)+) => {
        impl<$($name: WriteValue),+> WriteValue for ($($name,)+) {
            #[allow(non_snake_case)]
            fn write_to(&self, out: &mut dyn CellEmitter) -> Result<()> {
                let ($($name,)+) = self;
                $($name.write_to(out)?;)+
                Ok(())
            }
        }
    };
}

write_tuple!(A);
write_tuple!(A B);
write_tuple!(A B C);
write_tuple!(A B C D);
write_tuple!(A B C D E);
write_tuple!(A B C D E F);
write_tuple!(A B C D E F G);
write_tuple!(A B C D E F G H);
