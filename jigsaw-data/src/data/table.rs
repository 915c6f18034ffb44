//! In-memory table: named columns over rows of typed cells, with CSV I/O.

use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// A single cell.
///
/// Floats compare and hash by bit pattern so rows can be grouped and
/// deduplicated; `NaN` never appears because empty cells read as `Null`
/// and non-finite spellings (`nan`, `inf`) keep a column textual.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in mismatch reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{i}"),
            // Keep a decimal point so the column reads back as float.
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{x:.1}")
            }
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Inferred type family of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Null,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Null => "null",
        };
        f.write_str(name)
    }
}

/// Infer the type family of a sequence of cells, ignoring nulls.
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
    let mut has_int = false;
    let mut has_float = false;

    for v in values {
        match v {
            Value::Str(_) => return ColumnType::String,
            Value::Float(_) => has_float = true,
            Value::Int(_) => has_int = true,
            Value::Null => {}
        }
    }

    if has_float {
        ColumnType::Float
    } else if has_int {
        ColumnType::Integer
    } else {
        ColumnType::Null
    }
}

/// An ordered sequence of rows over named columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn require_column(&self, name: &str) -> Result<usize, DataError> {
        self.column_index(name)
            .ok_or_else(|| DataError::missing_column(name))
    }

    /// Cells of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>, DataError> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn column_type(&self, name: &str) -> Result<ColumnType, DataError> {
        Ok(infer_column_type(self.column_values(name)?))
    }

    /// Project onto `names`, in that order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table, DataError> {
        let indices = names
            .iter()
            .map(|n| self.require_column(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table::new(
            names.iter().map(|n| n.as_ref().to_string()).collect(),
            rows,
        ))
    }

    /// Remove the named columns; names not present are ignored.
    pub fn drop_columns<S: AsRef<str>>(mut self, names: &[S]) -> Table {
        let drop: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !drop.contains(c.as_str()))
            .collect();
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
        self
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(col) = self.columns.iter_mut().find(|c| c.as_str() == from) {
            *col = to.to_string();
        }
    }

    /// Append a column, or replace it if one with the same name exists.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), DataError> {
        if values.len() != self.rows.len() {
            return Err(DataError::validation(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        Ok(())
    }

    /// New table holding the rows at `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table::new(
            self.columns.clone(),
            indices.iter().map(|&i| self.rows[i].clone()).collect(),
        )
    }

    /// Split into (rows not in `indices`, rows in `indices`), preserving order.
    pub fn partition_rows(&self, indices: &[usize]) -> (Table, Table) {
        let marked: HashSet<usize> = indices.iter().copied().collect();
        let mut kept = Table::empty(self.columns.clone());
        let mut taken = Table::empty(self.columns.clone());
        for (i, row) in self.rows.iter().enumerate() {
            if marked.contains(&i) {
                taken.rows.push(row.clone());
            } else {
                kept.rows.push(row.clone());
            }
        }
        (kept, taken)
    }

    /// Indices of rows that repeat an earlier row on `subset` (all columns when `None`).
    pub fn duplicate_rows<S: AsRef<str>>(
        &self,
        subset: Option<&[S]>,
    ) -> Result<Vec<usize>, DataError> {
        let indices: Vec<usize> = match subset {
            Some(cols) => cols
                .iter()
                .map(|c| self.require_column(c.as_ref()))
                .collect::<Result<_, _>>()?,
            None => (0..self.columns.len()).collect(),
        };

        let mut seen: HashSet<Vec<&Value>> = HashSet::with_capacity(self.rows.len());
        let mut duplicates = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            let key: Vec<&Value> = indices.iter().map(|&c| &row[c]).collect();
            if !seen.insert(key) {
                duplicates.push(i);
            }
        }
        Ok(duplicates)
    }

    /// Drop repeated rows, keeping first occurrences. Returns the number removed.
    pub fn drop_duplicates<S: AsRef<str>>(
        &mut self,
        subset: Option<&[S]>,
    ) -> Result<usize, DataError> {
        let duplicates = self.duplicate_rows(subset)?;
        if duplicates.is_empty() {
            return Ok(0);
        }
        let (kept, _) = self.partition_rows(&duplicates);
        self.rows = kept.rows;
        Ok(duplicates.len())
    }

    /// Row-wise concatenation over the union of columns; absent cells are null.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for table in &tables {
            for col in &table.columns {
                if !positions.contains_key(col) {
                    positions.insert(col.clone(), columns.len());
                    columns.push(col.clone());
                }
            }
        }

        let width = columns.len();
        let mut rows = Vec::with_capacity(tables.iter().map(Table::row_count).sum());
        for table in tables {
            let mapping: Vec<usize> = table.columns.iter().map(|c| positions[c]).collect();
            for row in table.rows {
                let mut out = vec![Value::Null; width];
                for (value, &pos) in row.into_iter().zip(&mapping) {
                    out[pos] = value;
                }
                rows.push(out);
            }
        }
        Table::new(columns, rows)
    }

    /// Read a delimited file with one header row.
    ///
    /// Cell types are inferred per column: integer if every non-empty cell
    /// parses as `i64`, float if every one parses as a finite `f64`, string
    /// otherwise.
    pub fn read_csv(path: &Path) -> Result<Table, DataError> {
        Self::read_csv_limited(path, None)
    }

    /// Like [`Table::read_csv`], stopping after `limit` data rows.
    pub fn read_csv_limited(path: &Path, limit: Option<usize>) -> Result<Table, DataError> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut raw: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            if limit.is_some_and(|max| raw.len() >= max) {
                break;
            }
            let record = record?;
            raw.push(record.iter().map(str::to_string).collect());
        }

        let types: Vec<ColumnType> = (0..columns.len())
            .map(|c| infer_raw_type(raw.iter().map(|row| row[c].as_str())))
            .collect();

        let rows = raw
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&types)
                    .map(|(cell, ty)| parse_cell(cell, *ty))
                    .collect()
            })
            .collect();

        Ok(Table::new(columns, rows))
    }

    /// Write as CSV with a header row, atomically.
    pub fn write_csv(&self, path: &Path) -> Result<(), DataError> {
        jigsaw_core::persistence::atomic_write_with(path, |out| {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(&self.columns).map_err(csv_to_io)?;
            for row in &self.rows {
                writer
                    .write_record(row.iter().map(|v| v.to_string()))
                    .map_err(csv_to_io)?;
            }
            writer.flush()
        })?;
        tracing::debug!(
            path = %path.display(),
            rows = self.row_count(),
            columns = self.column_count(),
            "Saved table"
        );
        Ok(())
    }
}

fn csv_to_io(e: csv::Error) -> std::io::Error {
    std::io::Error::other(e)
}

fn infer_raw_type<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut all_int = true;
    let mut all_float = true;
    let mut any = false;
    for cell in cells.filter(|c| !c.is_empty()) {
        any = true;
        if all_int && cell.parse::<i64>().is_err() {
            all_int = false;
        }
        if all_float && !cell.parse::<f64>().is_ok_and(f64::is_finite) {
            all_float = false;
        }
        if !all_int && !all_float {
            return ColumnType::String;
        }
    }
    match (any, all_int, all_float) {
        (false, _, _) => ColumnType::Null,
        (true, true, _) => ColumnType::Integer,
        (true, false, true) => ColumnType::Float,
        _ => ColumnType::String,
    }
}

fn parse_cell(cell: String, ty: ColumnType) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match ty {
        ColumnType::Integer => cell.parse().map(Value::Int).unwrap_or(Value::Str(cell)),
        ColumnType::Float => cell.parse().map(Value::Float).unwrap_or(Value::Str(cell)),
        ColumnType::String | ColumnType::Null => Value::Str(cell),
    }
}
