use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Applicant text is shown on one line: `;` becomes `,` and newlines become `. `.
pub fn tidy(text: &str) -> String {
    text.replace("\r\n", "\n").replace(';', ",").replace('\n', ". ")
}

fn tidy_opt(text: &Option<String>) -> String {
    text.as_deref().map(tidy).unwrap_or_default()
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reviewer {
    pub reviewer_id: i64,
    pub reviewer_name: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Source {
    pub document_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub institution: Option<String>,
    pub authors: Option<String>,
    pub title: Option<String>,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub biosketch: Option<String>,
    pub leverage_plan: Option<String>,
    pub early_career: Option<String>,
    pub student: Option<String>,
    pub registration_waiver: Option<String>,
    pub travel_award: Option<String>,
    pub poster_competition: Option<String>,
    pub breakout_sessions: Option<String>,
}

impl Source {
    pub fn lead_author(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn display(&self) -> SourceDisplay {
        SourceDisplay {
            document_id: self.document_id,
            authors: tidy(&self.lead_author()),
            affiliation: tidy_opt(&self.institution),
            coauthors: tidy_opt(&self.authors),
            title: tidy_opt(&self.title),
            abstract_text: tidy_opt(&self.abstract_text),
            biosketch: tidy_opt(&self.biosketch),
            leverage_plan: tidy_opt(&self.leverage_plan),
            early_career: tidy_opt(&self.early_career),
            student: tidy_opt(&self.student),
        }
    }
}

/// What a reviewer sees of the document they are scoring.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDisplay {
    pub document_id: i64,
    pub authors: String,
    pub affiliation: String,
    pub coauthors: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub biosketch: String,
    pub leverage_plan: String,
    pub early_career: String,
    pub student: String,
}

/// A document offered during conflict-of-interest screening.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConflictCandidate {
    pub document_id: i64,
    pub author: String,
    pub affiliation: String,
    pub coauthors: String,
}

impl ConflictCandidate {
    pub fn tidied(self) -> Self {
        Self {
            document_id: self.document_id,
            author: tidy(&self.author),
            affiliation: tidy(&self.affiliation),
            coauthors: tidy(&self.coauthors),
        }
    }
}

/// Answer recorded in the conflict log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conflict {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
}

impl Conflict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conflict::Yes => "YES",
            Conflict::No => "NO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "YES" => Some(Conflict::Yes),
            "NO" => Some(Conflict::No),
            _ => None,
        }
    }
}

/// A criterion score on the 1 to 4 rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<u8>() {
            Ok(v) if (Self::MIN..=Self::MAX).contains(&v) => Some(Score(v)),
            _ => None,
        }
    }

    pub fn value(&self) -> i64 {
        i64::from(self.0)
    }
}

#[derive(Debug, Clone)]
pub struct NewResponse {
    pub reviewer_id: i64,
    pub document_id: i64,
    pub alignment: Score,
    pub science: Score,
    pub benefits: Score,
    pub comments: String,
}

/// A stored response joined with the source fields shown in the panels.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ResponseDetail {
    pub reviewer_id: i64,
    pub reviewer_name: String,
    pub document_id: i64,
    pub title: Option<String>,
    pub affiliation: Option<String>,
    pub coauthors: Option<String>,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub biosketch: Option<String>,
    pub leverage_plan: Option<String>,
    pub student: Option<String>,
    pub early_career: Option<String>,
    pub workshop_alignment: i64,
    pub advancing_science: i64,
    pub benefits: i64,
    pub comments: String,
    pub screening_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReviewerProgress {
    pub reviewer_id: i64,
    pub reviewer_name: String,
    pub completed: i64,
    #[sqlx(skip)]
    pub fraction_complete: f64,
    #[sqlx(skip)]
    pub percent: i64,
}

impl ReviewerProgress {
    pub fn with_fraction(mut self, per_reviewer: i64) -> Self {
        self.fraction_complete = fraction_complete(self.completed, per_reviewer);
        self.percent = ((self.fraction_complete * 100.0).round() as i64).clamp(0, 100);
        self
    }
}

/// `completed / cap` rounded to two decimals.
pub fn fraction_complete(completed: i64, cap: i64) -> f64 {
    if cap <= 0 {
        return 0.0;
    }
    ((completed as f64 / cap as f64) * 100.0).round() / 100.0
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DocumentCoverage {
    pub document_id: i64,
    pub title: Option<String>,
    pub review_count: i64,
}
