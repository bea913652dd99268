//! CSV import of sources and reviewers; CSV, Parquet and ZIP export of results.

use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::io::{Read, Write};

use super::columnar;
use super::FileFormat;
use crate::db::{self, cell_text, QueryResult, Reviewer, ResponseDetail, Source};
use crate::error::AppError;

/// Tables included in the export bundle, in archive order.
pub const EXPORT_TABLES: &[&str] = &["tbl_source", "tbl_reviewer", "tbl_response", "tbl_log"];

pub const RESPONSE_COLUMNS: &[&str] = &[
    "reviewer_id",
    "reviewer_name",
    "document_id",
    "title",
    "affiliation",
    "coauthors",
    "abstract",
    "biosketch",
    "leverage_plan",
    "student",
    "early_career",
    "workshop_alignment",
    "advancing_science",
    "benefits",
    "comments",
    "screening_order",
    "created_at",
];

fn reader<R: Read>(input: R) -> ::csv::Reader<R> {
    ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .from_reader(input)
}

/// CSV line number of the `index`-th record; line 1 is the header.
fn line_of(index: usize) -> usize {
    index + 2
}

fn parse_rows<T, R>(input: R) -> Result<Vec<T>, AppError>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    reader(input)
        .deserialize::<T>()
        .enumerate()
        .map(|(i, row)| row.map_err(|e| AppError::InvalidInput(format!("row {}: {}", line_of(i), e))))
        .collect()
}

/// An empty cell still deserializes into a `String`, so required names are checked here.
fn require_names(sources: &[Source]) -> Result<(), AppError> {
    for (i, source) in sources.iter().enumerate() {
        for (column, value) in [("first_name", &source.first_name), ("last_name", &source.last_name)] {
            if value.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "row {}: {} is required",
                    line_of(i),
                    column
                )));
            }
        }
    }
    Ok(())
}

/// Appends every row of a sources CSV; nothing is written if any row is bad.
pub async fn import_sources<R: Read>(pool: &SqlitePool, input: R) -> Result<usize, AppError> {
    let sources: Vec<Source> = parse_rows(input)?;
    require_names(&sources)?;

    let mut tx = pool.begin().await?;
    for source in &sources {
        db::insert_source(&mut *tx, source).await?;
    }
    tx.commit().await?;

    tracing::info!(count = sources.len(), "Imported sources");
    Ok(sources.len())
}

pub async fn import_reviewers<R: Read>(pool: &SqlitePool, input: R) -> Result<usize, AppError> {
    let reviewers: Vec<Reviewer> = parse_rows(input)?;

    if let Some(i) = reviewers.iter().position(|r| r.reviewer_name.is_empty()) {
        return Err(AppError::InvalidInput(format!(
            "row {}: reviewer_name is required",
            line_of(i)
        )));
    }

    let mut tx = pool.begin().await?;
    for reviewer in &reviewers {
        db::insert_reviewer(&mut *tx, reviewer).await?;
    }
    tx.commit().await?;

    tracing::info!(count = reviewers.len(), "Imported reviewers");
    Ok(reviewers.len())
}

/// Written by hand so an empty export still has a header; serde names the
/// same fields in the same order when rows are serialized.
pub fn write_responses<W: Write>(output: W, responses: &[ResponseDetail]) -> Result<(), AppError> {
    let mut writer = ::csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);
    writer.write_record(RESPONSE_COLUMNS)?;
    for response in responses {
        writer.serialize(response)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_query_result<W: Write>(output: W, result: &QueryResult) -> Result<(), AppError> {
    let mut writer = ::csv::Writer::from_writer(output);
    writer.write_record(&result.columns)?;
    for row in &result.rows {
        writer.write_record(row.iter().map(cell_text))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn responses_csv(responses: &[ResponseDetail]) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    write_responses(&mut buf, responses)?;
    Ok(buf)
}

pub fn query_csv(result: &QueryResult) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    write_query_result(&mut buf, result)?;
    Ok(buf)
}

/// Responses as a table with the export column names, for Parquet output.
pub fn responses_table(responses: &[ResponseDetail]) -> Result<QueryResult, AppError> {
    let rows = responses
        .iter()
        .map(|response| {
            let Value::Object(mut fields) = serde_json::to_value(response)? else {
                return Err(AppError::InvalidInput("response is not a record".to_string()));
            };
            Ok(RESPONSE_COLUMNS
                .iter()
                .map(|column| fields.remove(*column).unwrap_or(Value::Null))
                .collect::<Vec<Value>>())
        })
        .collect::<Result<_, AppError>>()?;

    Ok(QueryResult {
        columns: RESPONSE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    })
}

pub fn responses_bytes(responses: &[ResponseDetail], format: FileFormat) -> Result<Vec<u8>, AppError> {
    match format {
        FileFormat::Csv => responses_csv(responses),
        FileFormat::Parquet => columnar::parquet_bytes(&responses_table(responses)?),
    }
}

pub fn query_bytes(result: &QueryResult, format: FileFormat) -> Result<Vec<u8>, AppError> {
    match format {
        FileFormat::Csv => query_csv(result),
        FileFormat::Parquet => columnar::parquet_bytes(result),
    }
}

/// Every table as `<table>.csv` or `<table>.parquet` inside one ZIP archive.
pub async fn export_bundle(pool: &SqlitePool, format: FileFormat) -> Result<Vec<u8>, AppError> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);

    for table in EXPORT_TABLES {
        let result = db::run_readonly_query(pool, &format!("SELECT * FROM {}", table)).await?;
        zip.start_file(format!("{}.{}", table, format.extension()), options)?;
        zip.write_all(&query_bytes(&result, format)?)?;
    }

    Ok(zip.finish()?.into_inner())
}
