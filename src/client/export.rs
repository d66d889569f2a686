use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::{Grant, Publication, ScholarRecord};

const CSV_HEADERS: [&str; 10] = [
    "Name",
    "Title",
    "Department",
    "Position",
    "Email",
    "Relevance Score",
    "Good Match",
    "Active Grants",
    "Publications",
    "Possible Requirements",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Scholar as written to exports and prompts: `requirements` is presented as
/// `possible_requirements`, every other field keeps its stored name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedScholar {
    pub id: String,
    pub name: String,
    pub title: String,
    pub email: String,
    pub department: String,
    pub position: String,
    pub should_email: String,
    pub relevance_score: i32,
    pub active_grants_count: i32,
    pub tags: Vec<String>,
    pub reasoning: Vec<String>,
    pub possible_requirements: Vec<String>,
    pub active_grants: Vec<Grant>,
    pub expired_grants: Vec<Grant>,
    pub publications: Vec<Publication>,
}

impl From<&ScholarRecord> for ExportedScholar {
    fn from(record: &ScholarRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            title: record.title.clone(),
            email: record.email.clone(),
            department: record.department.clone(),
            position: record.position.clone(),
            should_email: record.should_email.clone(),
            relevance_score: record.relevance_score,
            active_grants_count: record.active_grants_count,
            tags: record.tags.clone(),
            reasoning: record.reasoning.clone(),
            possible_requirements: record.requirements.clone(),
            active_grants: record.active_grants.clone(),
            expired_grants: record.expired_grants.clone(),
            publications: record.publications.clone(),
        }
    }
}

/// Every field is quoted; embedded quotes are doubled.
pub fn to_csv(records: &[ScholarRecord]) -> AppResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .double_quote(true)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADERS)?;
    for record in records {
        writer.write_record(&[
            record.name.clone(),
            record.title.clone(),
            record.department.clone(),
            record.position.clone(),
            record.email.clone(),
            record.relevance_score.to_string(),
            record.should_email.clone(),
            record.active_grants_count.to_string(),
            record.publications.len().to_string(),
            record.requirements.join("; "),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(csv::IntoInnerError::into_error)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn to_json(records: &[ScholarRecord]) -> AppResult<String> {
    let exported: Vec<ExportedScholar> = records.iter().map(ExportedScholar::from).collect();
    Ok(serde_json::to_string_pretty(&exported)?)
}

pub fn file_name(format: ExportFormat, date: NaiveDate) -> String {
    format!("saved_scholars_{}.{}", date.format("%Y-%m-%d"), format.extension())
}

pub fn write_export(
    dir: &Path,
    format: ExportFormat,
    records: &[ScholarRecord],
    date: NaiveDate,
) -> AppResult<PathBuf> {
    let body = match format {
        ExportFormat::Csv => to_csv(records)?,
        ExportFormat::Json => to_json(records)?,
    };

    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name(format, date));
    std::fs::write(&path, body)?;
    Ok(path)
}
