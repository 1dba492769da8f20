//! Tabular content for campusdrive.
//!
//! Spreadsheet files on the drive are handled as typed tables:
//! - Columns carry an explicit type (integer, float or text)
//! - Edits are checked against the column type instead of guessed
//! - The XLSX codec converts tables to and from raw file content
//! - Tables can be exported as CSV or as a JSON content view

pub mod codec;
pub mod table;

pub use codec::{TabularCodec, XlsxCodec, XLSX_CONTENT_TYPE, XLSX_EXTENSION};
pub use table::{CellValue, Column, ColumnData, ColumnKind, Table, TableContent, TableInfo};
