//! Parquet output for query results, and Parquet uploads read back as CSV.
//!
//! Column types are inferred from the cells: all integers give `Int64`, any
//! other number gives `Float64`, anything else is `Utf8`. Every column is
//! nullable.

use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::reader::ChunkReader;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;

use crate::db::{cell_text, QueryResult};
use crate::error::AppError;

fn column_type(rows: &[Vec<Value>], index: usize) -> DataType {
    let mut inferred: Option<DataType> = None;
    for cell in rows.iter().filter_map(|row| row.get(index)) {
        let next = match cell {
            Value::Null => continue,
            Value::Number(n) if n.is_i64() => DataType::Int64,
            Value::Number(_) => DataType::Float64,
            _ => return DataType::Utf8,
        };
        inferred = Some(match (inferred, next) {
            (None, t) => t,
            (Some(DataType::Int64), DataType::Int64) => DataType::Int64,
            _ => DataType::Float64,
        });
    }
    inferred.unwrap_or(DataType::Utf8)
}

fn column_array(rows: &[Vec<Value>], index: usize, data_type: &DataType) -> ArrayRef {
    let cells = rows.iter().map(|row| row.get(index).unwrap_or(&Value::Null));
    match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(cell.as_i64());
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for cell in cells {
                builder.append_option(cell.as_f64());
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::new();
            for cell in cells {
                match cell {
                    Value::Null => builder.append_null(),
                    other => builder.append_value(cell_text(other)),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

pub fn write_parquet<W: Write + Send>(output: W, result: &QueryResult) -> Result<(), AppError> {
    if result.columns.is_empty() {
        return Err(AppError::InvalidInput(
            "the statement returned no columns to export".to_string(),
        ));
    }

    let types: Vec<DataType> = (0..result.columns.len())
        .map(|i| column_type(&result.rows, i))
        .collect();
    let schema = Arc::new(Schema::new(
        result
            .columns
            .iter()
            .zip(&types)
            .map(|(name, data_type)| Field::new(name, data_type.clone(), true))
            .collect::<Vec<_>>(),
    ));

    let mut writer = ArrowWriter::try_new(output, schema.clone(), None)?;
    if !result.rows.is_empty() {
        let arrays = types
            .iter()
            .enumerate()
            .map(|(i, data_type)| column_array(&result.rows, i, data_type))
            .collect();
        writer.write(&RecordBatch::try_new(schema, arrays)?)?;
    }
    writer.close()?;
    Ok(())
}

pub fn parquet_bytes(result: &QueryResult) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    write_parquet(&mut buf, result)?;
    Ok(buf)
}

/// Re-encodes a Parquet file as CSV so uploads share the CSV import checks.
pub fn parquet_to_csv<R: ChunkReader + 'static>(input: R) -> Result<Vec<u8>, AppError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(input)?.build()?;

    let mut buf = Vec::new();
    {
        let mut writer = arrow::csv::WriterBuilder::new()
            .with_header(true)
            .build(&mut buf);
        for batch in reader {
            writer.write(&batch?)?;
        }
    }
    Ok(buf)
}
