//! In-memory tables exchanged with the relational store

use std::fmt::{self, Write as _};
use unicase::UniCase;

/// Dynamically typed table cell, following the value model of SQL stores
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(Box<str>),
    Blob(Box<[u8]>),
}
//
impl Value {
    /// Text content, if this is a text cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Numerical content, if this cell holds a number or numeric text
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(r) if !r.is_nan() => Some(*r),
            Self::Text(text) => text.trim().parse::<f64>().ok().filter(|r| !r.is_nan()),
            _ => None,
        }
    }

    /// Truth that this cell is empty
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}
//
impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.into())
    }
}
//
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r:.6}"),
            Self::Text(text) => f.write_str(text),
            Self::Blob(blob) => write!(f, "<{} bytes>", blob.len()),
        }
    }
}

/// Named columns of dynamically typed values
///
/// Column names are looked up case-insensitively, like SQL identifiers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    /// Column names, in table order
    columns: Vec<Box<str>>,

    /// Rows, each with one value per column
    rows: Vec<Box<[Value]>>,
}
//
impl Table {
    /// Set up an empty table with certain columns
    pub fn new<S: Into<Box<str>>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row
    ///
    /// The row must have one value per column.
    pub fn push_row(&mut self, row: impl Into<Box<[Value]>>) {
        let row = row.into();
        assert_eq!(
            row.len(),
            self.columns.len(),
            "rows should have one value per column"
        );
        self.rows.push(row);
    }

    /// Column names
    pub fn columns(&self) -> &[Box<str>] {
        &self.columns
    }

    /// Rows of values
    pub fn rows(&self) -> &[Box<[Value]>] {
        &self.rows
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column, if present
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = UniCase::new(name);
        self.columns
            .iter()
            .position(|column| UniCase::new(&**column) == name)
    }

    /// Values of the column at a certain position
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Append a column, or replace an existing column of the same name
    pub fn with_column(mut self, name: &str, values: Vec<Value>) -> Self {
        assert_eq!(
            values.len(),
            self.rows.len(),
            "new columns should have one value per row"
        );
        let existing = self.column_index(name);
        if existing.is_none() {
            self.columns.push(name.into());
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            match existing {
                Some(idx) => row[idx] = value,
                None => {
                    let mut extended = std::mem::take(row).into_vec();
                    extended.push(value);
                    *row = extended.into_boxed_slice();
                }
            }
        }
        self
    }
}
//
impl fmt::Display for Table {
    /// Render as an aligned text grid
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self
            .rows
            .iter()
            .map(|row| row.iter().map(Value::to_string).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let widths = (self.columns.iter().enumerate())
            .map(|(idx, name)| {
                (cells.iter().map(|row| row[idx].chars().count()))
                    .fold(name.chars().count(), usize::max)
            })
            .collect::<Vec<_>>();

        write_row(f, &widths, self.columns.iter().map(|name| &**name))?;
        for row in &cells {
            write_row(f, &widths, row.iter().map(String::as_str))?;
        }
        Ok(())
    }
}

/// Write a line of right-aligned fields
fn write_row<'a>(
    f: &mut fmt::Formatter<'_>,
    widths: &[usize],
    fields: impl Iterator<Item = &'a str>,
) -> fmt::Result {
    let mut line = String::new();
    for (field, &width) in fields.zip(widths) {
        write!(line, "{field:>width$}  ")?;
    }
    writeln!(f, "{}", line.trim_end())
}
