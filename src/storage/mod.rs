pub mod columnar;
pub mod transfer;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::AppError;

/// File format for imports and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Csv,
    Parquet,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            FileFormat::Csv => "text/csv; charset=utf-8",
            FileFormat::Parquet => "application/vnd.apache.parquet",
        }
    }

    /// `.parquet` files are Parquet, everything else is read as CSV.
    pub fn from_file_name(name: &str) -> Self {
        match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => FileFormat::Parquet,
            _ => FileFormat::Csv,
        }
    }
}

/// Import data as CSV bytes; Parquet input is converted first.
pub fn import_csv(data: Vec<u8>, format: FileFormat) -> Result<Vec<u8>, AppError> {
    match format {
        FileFormat::Csv => Ok(data),
        FileFormat::Parquet => columnar::parquet_to_csv(axum::body::Bytes::from(data)),
    }
}

/// Local file behind a `sqlite:` url, or `None` for in-memory databases.
pub fn database_file(database_url: &str) -> Option<PathBuf> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Creates the directory holding the database file so the first run can create it.
pub fn ensure_dirs(database_url: &str) -> std::io::Result<()> {
    if let Some(parent) = database_file(database_url)
        .as_deref()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_\-]+").expect("valid regex"))
}

/// `Jane Q. Doe` becomes `jane_q_doe_reviewer_responses.csv`.
pub fn reviewer_export_name(reviewer_name: &str) -> String {
    let snake = reviewer_name.trim().to_lowercase().replace(' ', "_");
    let cleaned = unsafe_chars().replace_all(&snake, "");
    if cleaned.is_empty() {
        "reviewer_responses.csv".to_string()
    } else {
        format!("{}_reviewer_responses.csv", cleaned)
    }
}

pub fn bundle_export_name(format: FileFormat) -> String {
    format!(
        "screening_export_{}_{}.zip",
        format.extension(),
        Utc::now().format("%Y%m%d")
    )
}
