//! Conversion between tables and spreadsheet file content.

use calamine::{Data, Range, Reader, Xlsx};
use rust_xlsxwriter::{Workbook, XlsxError};
use std::collections::HashSet;
use std::io::Cursor;
use tracing::debug;

use campusdrive_common::{Error, Result};

use crate::table::{Column, ColumnData, ColumnKind, Table};

/// Canonical spreadsheet file extension.
pub const XLSX_EXTENSION: &str = ".xlsx";
/// MIME type of XLSX content.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Integral floats beyond this magnitude stay floats when decoding.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Hidden worksheet recording the row count and column types of a table.
const LAYOUT_SHEET: &str = "campusdrive_layout";
const LAYOUT_ROWS_LABEL: &str = "rows";

/// Stand-in for cells outside the used range.
static EMPTY: Data = Data::Empty;

/// Encoder/decoder between [`Table`] and raw file bytes.
pub trait TabularCodec: Send + Sync {
    /// Encode a table as file content.
    fn encode(&self, table: &Table) -> Result<Vec<u8>>;

    /// Decode file content into a table.
    ///
    /// # Errors
    /// - `Error::Decode` if the content is not a well-formed spreadsheet
    fn decode(&self, bytes: &[u8]) -> Result<Table>;

    /// File extension including the dot.
    fn extension(&self) -> &'static str;

    /// MIME type used when uploading.
    fn content_type(&self) -> &'static str;
}

/// XLSX codec.
///
/// The first row of the first worksheet holds the column names. Encoding
/// also writes a hidden layout worksheet with the row count and column
/// types, so tables written here decode to exactly the same table, empty
/// trailing rows and integral float columns included.
///
/// Workbooks without a usable layout sheet are decoded by inference: a
/// column of integral numbers is an integer column, any other all-numeric
/// column is a float column, and everything else is text. Blank header
/// cells are named `Unnamed: <index>` and repeated names get a `.<n>`
/// suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxCodec;

impl XlsxCodec {
    pub fn new() -> Self {
        Self
    }
}

fn write_error(e: XlsxError) -> Error {
    Error::Serialization(format!("Failed to write spreadsheet: {}", e))
}

fn column_index(index: usize) -> Result<u16> {
    u16::try_from(index)
        .map_err(|_| Error::InvalidInput("too many columns for a worksheet".to_string()))
}

fn row_index(index: usize) -> Result<u32> {
    u32::try_from(index)
        .map_err(|_| Error::InvalidInput("too many rows for a worksheet".to_string()))
}

/// Inverse of the `Display` form of [`ColumnKind`].
fn kind_from_name(name: &str) -> Option<ColumnKind> {
    match name {
        "integer" => Some(ColumnKind::Integer),
        "float" => Some(ColumnKind::Float),
        "text" => Some(ColumnKind::Text),
        _ => None,
    }
}

/// Row count and column names/types recorded in the layout sheet.
#[derive(Debug)]
struct Layout {
    height: usize,
    columns: Vec<(String, ColumnKind)>,
}

impl Layout {
    fn read(range: &Range<Data>) -> Option<Self> {
        let label = range.get_value((0, 0))?;
        if label.to_string() != LAYOUT_ROWS_LABEL {
            return None;
        }
        let height = match range.get_value((0, 1))? {
            Data::Int(n) => usize::try_from(*n).ok()?,
            Data::Float(f) if f.fract() == 0.0 && *f >= 0.0 => *f as usize,
            _ => return None,
        };

        let last_row = range.end().map_or(0, |(row, _)| row);
        let mut columns = Vec::new();
        for row in 1..=last_row {
            let name = match range.get_value((row, 0))? {
                Data::String(name) => name.clone(),
                _ => return None,
            };
            let kind = kind_from_name(&range.get_value((row, 1))?.to_string())?;
            columns.push((name, kind));
        }
        Some(Self { height, columns })
    }
}

fn cell(range: &Range<Data>, row: usize, col: usize) -> Option<&Data> {
    let row = u32::try_from(row).ok()?;
    let col = u32::try_from(col).ok()?;
    range.get_value((row, col))
}

/// Decode one column with a known type. `None` if a cell does not fit it.
fn typed_column(range: &Range<Data>, col: usize, height: usize, kind: ColumnKind) -> Option<ColumnData> {
    let cells = (1..=height).map(|row| cell(range, row, col).unwrap_or(&EMPTY));
    match kind {
        ColumnKind::Integer => cells
            .map(|data| match data {
                Data::Int(i) => Some(*i),
                Data::Float(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER => Some(*f as i64),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(ColumnData::Integer),
        ColumnKind::Float => cells
            .map(|data| match data {
                Data::Int(i) => Some(*i as f64),
                Data::Float(f) => Some(*f),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(ColumnData::Float),
        ColumnKind::Text => Some(ColumnData::Text(
            cells
                .map(|data| match data {
                    Data::String(s) => s.clone(),
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect(),
        )),
    }
}

/// Rebuild the table the layout describes, if the data sheet still matches it.
fn decode_with_layout(range: &Range<Data>, layout: &Layout) -> Option<Table> {
    if let Some((last_row, last_col)) = range.end() {
        if last_row as usize > layout.height || last_col as usize >= layout.columns.len() {
            return None;
        }
    }

    let mut columns = Vec::with_capacity(layout.columns.len());
    for (index, (name, kind)) in layout.columns.iter().enumerate() {
        if cell(range, 0, index)?.to_string() != *name {
            return None;
        }
        columns.push(Column::new(name.clone(), typed_column(range, index, layout.height, *kind)?));
    }
    Table::new(columns).ok()
}

/// Column names for a header row, filling blanks and disambiguating repeats.
fn header_names(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(index, name)| {
            let base = if name.trim().is_empty() {
                format!("Unnamed: {}", index)
            } else {
                name
            };
            let mut candidate = base.clone();
            let mut suffix = 0;
            while !seen.insert(candidate.clone()) {
                suffix += 1;
                candidate = format!("{}.{}", base, suffix);
            }
            candidate
        })
        .collect()
}

fn decode_by_inference(range: &Range<Data>) -> Result<Table> {
    let Some((last_row, last_col)) = range.end() else {
        return Ok(Table::default());
    };
    let width = last_col as usize + 1;
    let height = last_row as usize;

    let names = header_names(
        (0..width)
            .map(|col| cell(range, 0, col).map(Data::to_string).unwrap_or_default())
            .collect(),
    );
    let columns = names
        .into_iter()
        .enumerate()
        .map(|(col, name)| {
            let values: Vec<&Data> = (1..=height)
                .map(|row| cell(range, row, col).unwrap_or(&EMPTY))
                .collect();
            Column::new(name, infer_column(&values))
        })
        .collect();

    Table::new(columns).map_err(|e| Error::Decode(e.to_string()))
}

impl TabularCodec for XlsxCodec {
    fn encode(&self, table: &Table) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        for (index, column) in table.columns().iter().enumerate() {
            let col = column_index(index)?;
            worksheet
                .write_string(0, col, column.name.as_str())
                .map_err(write_error)?;

            for row in 0..column.data.len() {
                let cell_row = row_index(row + 1)?;
                let written = match &column.data {
                    ColumnData::Integer(values) => {
                        worksheet.write_number(cell_row, col, values[row] as f64)
                    }
                    ColumnData::Float(values) => worksheet.write_number(cell_row, col, values[row]),
                    ColumnData::Text(values) if values[row].is_empty() => continue,
                    ColumnData::Text(values) => {
                        worksheet.write_string(cell_row, col, values[row].as_str())
                    }
                };
                written.map_err(write_error)?;
            }
        }

        let layout = workbook.add_worksheet();
        layout.set_name(LAYOUT_SHEET).map_err(write_error)?;
        layout.set_hidden(true);
        layout
            .write_string(0, 0, LAYOUT_ROWS_LABEL)
            .map_err(write_error)?;
        layout
            .write_number(0, 1, table.height() as f64)
            .map_err(write_error)?;
        for (index, column) in table.columns().iter().enumerate() {
            let row = row_index(index + 1)?;
            layout
                .write_string(row, 0, column.name.as_str())
                .map_err(write_error)?;
            layout
                .write_string(row, 1, column.data.kind().to_string())
                .map_err(write_error)?;
        }

        let bytes = workbook.save_to_buffer().map_err(write_error)?;
        debug!(
            "Encoded {}x{} table into {} bytes",
            table.height(),
            table.width(),
            bytes.len()
        );
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Table> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| Error::Decode(format!("Not a valid spreadsheet: {}", e)))?;

        let range = match workbook.worksheet_range_at(0) {
            Some(range) => {
                range.map_err(|e| Error::Decode(format!("Failed to read worksheet: {}", e)))?
            }
            None => return Ok(Table::default()),
        };

        let has_layout = workbook.sheet_names().iter().any(|name| name == LAYOUT_SHEET);
        let layout = if has_layout {
            workbook
                .worksheet_range(LAYOUT_SHEET)
                .ok()
                .and_then(|sheet| Layout::read(&sheet))
        } else {
            None
        };

        if let Some(layout) = layout {
            if let Some(table) = decode_with_layout(&range, &layout) {
                return Ok(table);
            }
            debug!("Layout sheet does not match the data, inferring column types");
        }
        decode_by_inference(&range)
    }

    fn extension(&self) -> &'static str {
        XLSX_EXTENSION
    }

    fn content_type(&self) -> &'static str {
        XLSX_CONTENT_TYPE
    }
}

fn infer_column(cells: &[&Data]) -> ColumnData {
    if cells.is_empty() {
        return ColumnData::Text(Vec::new());
    }
    let numbers: Option<Vec<f64>> = cells
        .iter()
        .map(|cell| match cell {
            Data::Int(i) => Some(*i as f64),
            Data::Float(f) => Some(*f),
            _ => None,
        })
        .collect();

    match numbers {
        Some(values)
            if values
                .iter()
                .all(|v| v.fract() == 0.0 && v.abs() <= MAX_EXACT_INTEGER) =>
        {
            ColumnData::Integer(values.into_iter().map(|v| v as i64).collect())
        }
        Some(values) => ColumnData::Float(values),
        None => ColumnData::Text(cells.iter().map(|cell| cell.to_string()).collect()),
    }
}
