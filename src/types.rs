//! Cell values and assembled records

use chrono::NaiveDateTime;
use std::fmt;

use crate::reference::column_index;

/// Largest integer an f64 holds exactly
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// A single cell value
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellValue {
    /// Empty cell, also the placeholder for gaps in a record
    #[default]
    Empty,
    /// String value
    String(String),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Date and time
    DateTime(NaiveDateTime),
    /// Error value such as `#DIV/0!`
    Error(String),
}

impl CellValue {
    /// Number read from a cell: integral values become `Int`, the rest `Float`
    pub fn from_number(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < MAX_EXACT_INT {
            CellValue::Int(value as i64)
        } else {
            CellValue::Float(value)
        }
    }

    /// Convert cell value to string
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateTime(d) => d.to_string(),
            CellValue::Error(e) => e.clone(),
        }
    }

    /// Check if cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Try to convert to integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::Float(f) => Some(*f as i64),
            CellValue::Bool(b) => Some(*b as i64),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(f) => Some(*f),
            CellValue::Int(i) => Some(*i as f64),
            CellValue::DateTime(d) => Some(crate::date::to_serial(*d, false)),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            CellValue::Int(i) => Some(*i != 0),
            CellValue::Float(f) => Some(*f != 0.0),
            CellValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Try to convert to a date; numbers are read as 1900-system serials
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(d) => Some(*d),
            CellValue::Int(i) => crate::date::from_serial(*i as f64, false),
            CellValue::Float(f) => crate::date::from_serial(*f, false),
            CellValue::String(s) => crate::date::parse_iso(s).or_else(|| {
                NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S").ok()
            }),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(d: NaiveDateTime) -> Self {
        CellValue::DateTime(d)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Empty, Into::into)
    }
}

/// One assembled row: values indexed by column, `Empty` in the gaps
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Row index (0-based)
    pub row: u32,
    /// Cells in column order
    pub cells: Vec<CellValue>,
}

impl Record {
    /// Create a new record
    pub fn new(row: u32, cells: Vec<CellValue>) -> Self {
        Record { row, cells }
    }

    /// Get cell at column index
    pub fn get(&self, col: usize) -> Option<&CellValue> {
        self.cells.get(col)
    }

    /// Get cell by column name (`"A"`, `"AB"`)
    pub fn get_by_name(&self, column: &str) -> Option<&CellValue> {
        column_index(column).and_then(|col| self.get(col as usize))
    }

    /// Get number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if record has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get_bool(&self, col: usize) -> Option<bool> {
        self.get(col).and_then(CellValue::as_bool)
    }

    pub fn get_i64(&self, col: usize) -> Option<i64> {
        self.get(col).and_then(CellValue::as_i64)
    }

    pub fn get_f64(&self, col: usize) -> Option<f64> {
        self.get(col).and_then(CellValue::as_f64)
    }

    /// Text of a cell; `None` for gaps and columns past the end
    pub fn get_string(&self, col: usize) -> Option<String> {
        self.get(col)
            .filter(|v| !v.is_empty())
            .map(CellValue::as_string)
    }

    pub fn get_datetime(&self, col: usize) -> Option<NaiveDateTime> {
        self.get(col).and_then(CellValue::as_datetime)
    }

    pub fn get_bool_by_name(&self, column: &str) -> Option<bool> {
        self.get_by_name(column).and_then(CellValue::as_bool)
    }

    pub fn get_i64_by_name(&self, column: &str) -> Option<i64> {
        self.get_by_name(column).and_then(CellValue::as_i64)
    }

    pub fn get_f64_by_name(&self, column: &str) -> Option<f64> {
        self.get_by_name(column).and_then(CellValue::as_f64)
    }

    pub fn get_string_by_name(&self, column: &str) -> Option<String> {
        column_index(column).and_then(|col| self.get_string(col as usize))
    }

    pub fn get_datetime_by_name(&self, column: &str) -> Option<NaiveDateTime> {
        self.get_by_name(column).and_then(CellValue::as_datetime)
    }

    /// Convert record to vector of strings
    pub fn to_strings(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.as_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_cell_value_conversions() {
        let val = CellValue::Int(42);
        assert_eq!(val.as_i64(), Some(42));
        assert_eq!(val.as_f64(), Some(42.0));

        let val = CellValue::String("true".to_string());
        assert_eq!(val.as_bool(), Some(true));

        assert_eq!(CellValue::from(None::<i64>), CellValue::Empty);
        assert_eq!(CellValue::from(Some("x")), CellValue::String("x".into()));
    }

    #[test]
    fn test_from_number_normalises_integers() {
        assert_eq!(CellValue::from_number(42.0), CellValue::Int(42));
        assert_eq!(CellValue::from_number(-3.0), CellValue::Int(-3));
        assert_eq!(CellValue::from_number(1234.56), CellValue::Float(1234.56));
        assert_eq!(CellValue::from_number(1e300), CellValue::Float(1e300));
    }

    #[test]
    fn test_datetime_conversion() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(CellValue::Float(45306.5).as_datetime(), Some(date));
        assert_eq!(
            CellValue::String("2024-01-15 12:00:00".into()).as_datetime(),
            Some(date)
        );
        assert_eq!(CellValue::DateTime(date).as_f64(), Some(45306.5));
    }

    #[test]
    fn test_record_lookup_by_name() {
        let record = Record::new(
            3,
            vec![
                CellValue::String("Alice".into()),
                CellValue::Empty,
                CellValue::Int(30),
            ],
        );
        assert_eq!(record.len(), 3);
        assert_eq!(record.get_string_by_name("A"), Some("Alice".to_string()));
        assert_eq!(record.get_string_by_name("B"), None);
        assert_eq!(record.get_i64_by_name("C"), Some(30));
        assert_eq!(record.get_i64_by_name("Z"), None);
        assert_eq!(record.get_i64(7), None);
        assert_eq!(record.to_strings(), vec!["Alice", "", "30"]);
    }
}
