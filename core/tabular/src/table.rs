//! Typed in-memory tables.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use campusdrive_common::{Error, Result};

/// Type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    /// Parse user input as a value of this column type.
    ///
    /// # Errors
    /// - Input is not a valid integer for an integer column
    /// - Input is not a valid number for a float column
    pub fn parse(&self, input: &str) -> Result<CellValue> {
        let trimmed = input.trim();
        match self {
            ColumnKind::Integer => trimmed
                .parse::<i64>()
                .map(CellValue::Integer)
                .map_err(|_| Error::InvalidInput(format!("'{}' is not an integer", trimmed))),
            ColumnKind::Float => trimmed
                .parse::<f64>()
                .map(CellValue::Float)
                .map_err(|_| Error::InvalidInput(format!("'{}' is not a number", trimmed))),
            ColumnKind::Text => Ok(CellValue::Text(input.to_string())),
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Integer => write!(f, "integer"),
            ColumnKind::Float => write!(f, "float"),
            ColumnKind::Text => write!(f, "text"),
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Infer the narrowest value for free-form input: integer, then float, then text.
    pub fn infer(input: &str) -> Self {
        let trimmed = input.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            CellValue::Integer(i)
        } else if let Ok(f) = trimmed.parse::<f64>() {
            CellValue::Float(f)
        } else {
            CellValue::Text(input.to_string())
        }
    }

    /// Type of this value.
    pub fn kind(&self) -> ColumnKind {
        match self {
            CellValue::Integer(_) => ColumnKind::Integer,
            CellValue::Float(_) => ColumnKind::Float,
            CellValue::Text(_) => ColumnKind::Text,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            CellValue::Integer(i) => Value::from(*i),
            CellValue::Float(f) => Value::from(*f),
            CellValue::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Float(f) => serializer.serialize_f64(*f),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Values of one column, stored by type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnData {
    /// A column of `len` copies of `value`.
    pub fn repeat(value: &CellValue, len: usize) -> Self {
        match value {
            CellValue::Integer(i) => ColumnData::Integer(vec![*i; len]),
            CellValue::Float(f) => ColumnData::Float(vec![*f; len]),
            CellValue::Text(s) => ColumnData::Text(vec![s.clone(); len]),
        }
    }

    /// Build a column from free-form strings, picking the narrowest type
    /// that fits every value.
    pub fn infer_from_strings(values: &[String]) -> Self {
        let trimmed: Vec<&str> = values.iter().map(|v| v.trim()).collect();
        if let Ok(ints) = trimmed
            .iter()
            .map(|v| v.parse::<i64>())
            .collect::<std::result::Result<Vec<_>, _>>()
        {
            return ColumnData::Integer(ints);
        }
        if let Ok(floats) = trimmed
            .iter()
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
        {
            return ColumnData::Float(floats);
        }
        ColumnData::Text(values.to_vec())
    }

    /// Build a column from JSON values.
    ///
    /// All integers give an integer column, all numbers a float column.
    /// Anything else becomes text; `null` becomes an empty string.
    pub fn from_json_values(values: &[Value]) -> Self {
        if let Some(ints) = values.iter().map(Value::as_i64).collect::<Option<Vec<_>>>() {
            return ColumnData::Integer(ints);
        }
        if let Some(floats) = values.iter().map(Value::as_f64).collect::<Option<Vec<_>>>() {
            return ColumnData::Float(floats);
        }
        ColumnData::Text(
            values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
        )
    }

    /// Type of this column.
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Integer(_) => ColumnKind::Integer,
            ColumnData::Float(_) => ColumnKind::Float,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    /// Check if the column has no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the value at `index`.
    pub fn get(&self, index: usize) -> Option<CellValue> {
        match self {
            ColumnData::Integer(v) => v.get(index).copied().map(CellValue::Integer),
            ColumnData::Float(v) => v.get(index).copied().map(CellValue::Float),
            ColumnData::Text(v) => v.get(index).cloned().map(CellValue::Text),
        }
    }

    /// Convert a value to this column's type without changing its meaning.
    ///
    /// Integers widen into float columns; every other mismatch is rejected.
    fn coerce(&self, value: CellValue) -> Result<CellValue> {
        match (self.kind(), value) {
            (ColumnKind::Float, CellValue::Integer(i)) => Ok(CellValue::Float(i as f64)),
            (kind, value) if value.kind() == kind => Ok(value),
            (kind, value) => Err(Error::InvalidInput(format!(
                "cannot store {} value '{}' in {} column",
                value.kind(),
                value,
                kind
            ))),
        }
    }

    fn push_unchecked(&mut self, value: CellValue) {
        match (self, value) {
            (ColumnData::Integer(v), CellValue::Integer(i)) => v.push(i),
            (ColumnData::Float(v), CellValue::Float(f)) => v.push(f),
            (ColumnData::Text(v), CellValue::Text(s)) => v.push(s),
            _ => unreachable!("value must be coerced before insertion"),
        }
    }

    fn set_unchecked(&mut self, index: usize, value: CellValue) {
        match (self, value) {
            (ColumnData::Integer(v), CellValue::Integer(i)) => v[index] = i,
            (ColumnData::Float(v), CellValue::Float(f)) => v[index] = f,
            (ColumnData::Text(v), CellValue::Text(s)) => v[index] = s,
            _ => unreachable!("value must be coerced before insertion"),
        }
    }

    fn remove(&mut self, index: usize) {
        match self {
            ColumnData::Integer(v) => {
                v.remove(index);
            }
            ColumnData::Float(v) => {
                v.remove(index);
            }
            ColumnData::Text(v) => {
                v.remove(index);
            }
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// A rectangular table of typed columns.
///
/// All columns hold the same number of values and column names are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Create a table from columns.
    ///
    /// # Errors
    /// - Columns have different lengths
    /// - A column name is empty or repeated
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let height = first.data.len();
            if let Some(bad) = columns.iter().find(|c| c.data.len() != height) {
                return Err(Error::InvalidInput(format!(
                    "column '{}' has {} values, expected {}",
                    bad.name,
                    bad.data.len(),
                    height
                )));
            }
        }
        for (i, column) in columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(Error::InvalidInput("column name cannot be empty".to_string()));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::InvalidInput(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// The table used when a spreadsheet is created without content.
    pub fn placeholder() -> Self {
        Self {
            columns: vec![
                Column::new(
                    "Column1",
                    ColumnData::Text(vec!["Value1".into(), "Value2".into(), "Value3".into()]),
                ),
                Column::new("Column2", ColumnData::Integer(vec![10, 20, 30])),
                Column::new(
                    "Column3",
                    ColumnData::Text(vec!["A".into(), "B".into(), "C".into()]),
                ),
            ],
        }
    }

    /// Build a table from a JSON object mapping column names to value arrays.
    ///
    /// Column order follows the object's key order.
    pub fn from_json_columns(object: &Map<String, Value>) -> Result<Self> {
        let columns = object
            .iter()
            .map(|(name, values)| match values {
                Value::Array(values) => Ok(Column::new(name.clone(), ColumnData::from_json_values(values))),
                _ => Err(Error::InvalidInput(format!(
                    "column '{}' must be an array of values",
                    name
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(columns)
    }

    /// Get the columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get the column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    /// Get one row.
    pub fn row(&self, index: usize) -> Option<Vec<CellValue>> {
        if index >= self.height() {
            return None;
        }
        self.columns.iter().map(|c| c.data.get(index)).collect()
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = Vec<CellValue>> + '_ {
        (0..self.height()).filter_map(move |i| self.row(i))
    }

    /// Append a row.
    ///
    /// The table is left untouched if any value does not fit its column.
    pub fn push_row(&mut self, values: Vec<CellValue>) -> Result<()> {
        if values.len() != self.width() {
            return Err(Error::InvalidInput(format!(
                "row has {} values, table has {} columns",
                values.len(),
                self.width()
            )));
        }
        let coerced = self
            .columns
            .iter()
            .zip(values)
            .map(|(column, value)| column.data.coerce(value))
            .collect::<Result<Vec<_>>>()?;
        for (column, value) in self.columns.iter_mut().zip(coerced) {
            column.data.push_unchecked(value);
        }
        Ok(())
    }

    /// Replace a single cell.
    pub fn set_cell(&mut self, row: usize, column: &str, value: CellValue) -> Result<()> {
        let height = self.height();
        if row >= height {
            return Err(Error::InvalidInput(format!(
                "row {} out of range (0-{})",
                row,
                height.saturating_sub(1)
            )));
        }
        let target = self
            .columns
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(|| Error::InvalidInput(format!("unknown column '{}'", column)))?;
        let value = target.data.coerce(value)?;
        target.data.set_unchecked(row, value);
        Ok(())
    }

    /// Add a column filled with `default`.
    pub fn add_column(&mut self, name: impl Into<String>, default: CellValue) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("column name cannot be empty".to_string()));
        }
        if self.column(&name).is_some() {
            return Err(Error::InvalidInput(format!("column '{}' already exists", name)));
        }
        let data = ColumnData::repeat(&default, self.height());
        self.columns.push(Column::new(name, data));
        Ok(())
    }

    /// Remove a row, shifting later rows up.
    pub fn remove_row(&mut self, index: usize) -> Result<()> {
        if index >= self.height() {
            return Err(Error::InvalidInput(format!("row {} out of range", index)));
        }
        for column in &mut self.columns {
            column.data.remove(index);
        }
        Ok(())
    }

    /// Export as CSV with a header row.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(self.column_names())
            .map_err(|e| Error::Serialization(format!("Failed to write CSV header: {}", e)))?;
        for row in self.rows() {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .map_err(|e| Error::Serialization(format!("Failed to write CSV row: {}", e)))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Serialization(format!("Failed to flush CSV: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// JSON-friendly view of the table.
    pub fn content(&self) -> TableContent {
        let column_types = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), Value::from(c.data.kind().to_string())))
            .collect();

        TableContent {
            columns: self.column_names().into_iter().map(String::from).collect(),
            data: self
                .rows()
                .map(|row| row.iter().map(CellValue::to_json).collect())
                .collect(),
            shape: (self.height(), self.width()),
            info: TableInfo {
                rows: self.height(),
                columns: self.width(),
                column_types,
            },
        }
    }
}

/// Row-oriented JSON view of a table.
#[derive(Debug, Clone, Serialize)]
pub struct TableContent {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
    pub shape: (usize, usize),
    pub info: TableInfo,
}

/// Summary information for [`TableContent`].
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub rows: usize,
    pub columns: usize,
    pub column_types: Map<String, Value>,
}
