//! Reading uploaded files into datasets and rendering datasets back to CSV

use crate::dataset::{Column, ColumnKind, Dataset, Value};
use crate::error::{PipelineError, Result};
use crate::profiler::{infer_kind, parse_cell};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use polars::prelude::{
    CsvParseOptions, CsvReadOptions, CsvWriter, DataFrame, DataType, NamedFrom, SerReader,
    SerWriter, Series,
};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Comma separated text
    Csv,
    /// Tab separated text
    Tsv,
    /// Spreadsheet workbook (xlsx, xls, xlsb, ods); the first sheet is read
    Spreadsheet,
}

impl DataFormat {
    /// Detect the format from a file name's extension
    pub fn from_filename(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(DataFormat::Csv),
            "tsv" | "tab" => Ok(DataFormat::Tsv),
            "xlsx" | "xls" | "xlsb" | "xlsm" | "ods" => Ok(DataFormat::Spreadsheet),
            _ => Err(PipelineError::UnsupportedFormat(format!(
                "'{}': only CSV, TSV and spreadsheet files are supported",
                name
            ))),
        }
    }
}

/// Parse raw file content into a typed dataset
pub fn read_dataset(bytes: &[u8], format: DataFormat) -> Result<Dataset> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(PipelineError::UnsupportedFormat("file is empty".to_string()));
    }

    let raw = match format {
        DataFormat::Csv => read_delimited(bytes, b',')?,
        DataFormat::Tsv => read_delimited(bytes, b'\t')?,
        DataFormat::Spreadsheet => read_spreadsheet(bytes)?,
    };

    if raw.is_empty() {
        return Err(PipelineError::UnsupportedFormat("no columns found".to_string()));
    }

    let columns = raw
        .into_iter()
        .map(|(name, cells)| {
            let kind = infer_kind(cells.iter().map(|c| c.as_deref()));
            let values = cells
                .iter()
                .map(|c| parse_cell(kind, c.as_deref()))
                .collect();
            Column::new(name, values)
        })
        .collect();

    Dataset::new(columns).map_err(|e| PipelineError::UnsupportedFormat(e.to_string()))
}

type RawColumns = Vec<(String, Vec<Option<String>>)>;

/// Every column is read as text; typing happens afterwards through the profiler's rules.
fn read_delimited(bytes: &[u8], separator: u8) -> Result<RawColumns> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;

    df.get_columns()
        .iter()
        .map(|column| {
            let series = column.as_materialized_series().cast(&DataType::String)?;
            let cells = series
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            Ok((column.name().to_string(), cells))
        })
        .collect()
}

fn read_spreadsheet(bytes: &[u8]) -> Result<RawColumns> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::UnsupportedFormat("workbook has no sheets".to_string()))??;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| PipelineError::UnsupportedFormat("sheet is empty".to_string()))?;

    let mut columns: RawColumns = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell_text(cell) {
            Some(name) => (name, Vec::new()),
            None => (format!("column_{}", i + 1), Vec::new()),
        })
        .collect();

    for row in rows {
        for (i, (_, cells)) in columns.iter_mut().enumerate() {
            cells.push(row.get(i).and_then(cell_text));
        }
    }

    Ok(columns)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Whole numbers in float columns keep a fractional part so the column reads
/// back as float.
fn render_decimal(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v + 0.0)
    } else {
        Value::Float(v).render()
    }
}

/// Render a dataset as CSV with a header row. Missing cells become empty fields.
pub fn write_csv(dataset: &Dataset) -> Result<Vec<u8>> {
    let columns = dataset
        .columns()
        .iter()
        .map(|col| {
            let float_column = col.kind() == ColumnKind::Float;
            let cells: Vec<Option<String>> = col
                .values()
                .iter()
                .map(|v| match v {
                    Value::Missing => None,
                    Value::Int(_) | Value::Float(_) if float_column => v.as_f64().map(render_decimal),
                    other => Some(other.render()),
                })
                .collect();
            Series::new(col.name().into(), cells).into()
        })
        .collect();

    let mut df = DataFrame::new(columns)?;
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut df)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(DataFormat::from_filename("data.CSV").unwrap(), DataFormat::Csv);
        assert_eq!(DataFormat::from_filename("a.tsv").unwrap(), DataFormat::Tsv);
        assert_eq!(DataFormat::from_filename("book.xlsx").unwrap(), DataFormat::Spreadsheet);
        assert!(matches!(
            DataFormat::from_filename("notes.txt"),
            Err(PipelineError::UnsupportedFormat(_))
        ));
        assert!(DataFormat::from_filename("noext").is_err());
    }

    #[test]
    fn test_read_csv_infers_kinds() {
        let csv = b"a,b,c,d\n1,x,true,1.5\n2,y,false,\n,x,TRUE,3\n";
        let ds = read_dataset(csv, DataFormat::Csv).unwrap();

        assert_eq!(ds.shape(), (3, 4));
        assert_eq!(ds.column("a").unwrap().kind(), ColumnKind::Integer);
        assert_eq!(ds.column("b").unwrap().kind(), ColumnKind::Categorical);
        assert_eq!(ds.column("c").unwrap().kind(), ColumnKind::Boolean);
        assert_eq!(ds.column("d").unwrap().kind(), ColumnKind::Float);
        assert_eq!(ds.column("a").unwrap().values()[2], Value::Missing);
        assert_eq!(ds.column("d").unwrap().values()[1], Value::Missing);
    }

    #[test]
    fn test_read_tsv() {
        let tsv = b"a\tb\n1\tNA\n2\tz\n";
        let ds = read_dataset(tsv, DataFormat::Tsv).unwrap();
        assert_eq!(ds.shape(), (2, 2));
        assert_eq!(ds.column("b").unwrap().missing_count(), 1);
    }

    #[test]
    fn test_empty_content_is_unsupported() {
        assert!(matches!(
            read_dataset(b"", DataFormat::Csv),
            Err(PipelineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_garbage_spreadsheet_is_unsupported() {
        assert!(matches!(
            read_dataset(b"definitely not a workbook", DataFormat::Spreadsheet),
            Err(PipelineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_write_csv_renders_missing_as_empty() {
        let ds = Dataset::new(vec![
            Column::new("a", vec![Value::Int(1), Value::Missing]),
            Column::new("b", vec![Value::Float(1.5), Value::Text("x".into())]),
        ])
        .unwrap();

        let csv = String::from_utf8(write_csv(&ds).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["a,b", "1,1.5", ",x"]);
    }

    #[test]
    fn test_csv_survives_export_and_reimport() {
        let csv = b"a,b\n1,x\n2,\n";
        let ds = read_dataset(csv, DataFormat::Csv).unwrap();
        let again = read_dataset(&write_csv(&ds).unwrap(), DataFormat::Csv).unwrap();
        assert_eq!(ds, again);
    }

    #[test]
    fn test_whole_floats_keep_float_kind_after_export() {
        let ds = Dataset::new(vec![
            Column::new("f", vec![Value::Float(1.0), Value::Float(-0.0), Value::Missing]),
            Column::new("i", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ])
        .unwrap();

        let csv = String::from_utf8(write_csv(&ds).unwrap()).unwrap();
        assert_eq!(csv.lines().collect::<Vec<_>>(), vec!["f,i", "1.0,1", "0.0,2", ",3"]);

        let again = read_dataset(csv.as_bytes(), DataFormat::Csv).unwrap();
        assert_eq!(again.column("f").unwrap().kind(), ColumnKind::Float);
        assert_eq!(again.column("i").unwrap().kind(), ColumnKind::Integer);
    }
}
