use chrono::Utc;
use sqlx::{FromRow, Sqlite, SqlitePool};
use std::fmt;

use super::models::*;
use crate::config::ReviewLimits;

pub async fn list_reviewers(pool: &SqlitePool) -> Result<Vec<Reviewer>, sqlx::Error> {
    sqlx::query_as::<_, Reviewer>(
        "SELECT reviewer_id, reviewer_name FROM tbl_reviewer ORDER BY reviewer_name",
    )
    .fetch_all(pool)
    .await
}

pub async fn get_reviewer(pool: &SqlitePool, reviewer_id: i64) -> Result<Option<Reviewer>, sqlx::Error> {
    sqlx::query_as::<_, Reviewer>(
        "SELECT reviewer_id, reviewer_name FROM tbl_reviewer WHERE reviewer_id = ? LIMIT 1",
    )
    .bind(reviewer_id)
    .fetch_optional(pool)
    .await
}

pub async fn count_sources(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(DISTINCT document_id) FROM tbl_source")
        .fetch_one(pool)
        .await
}

pub async fn get_source(pool: &SqlitePool, document_id: i64) -> Result<Option<Source>, sqlx::Error> {
    sqlx::query_as::<_, Source>("SELECT * FROM tbl_source WHERE document_id = ? LIMIT 1")
        .bind(document_id)
        .fetch_optional(pool)
        .await
}

pub async fn insert_source<'e, E>(executor: E, source: &Source) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO tbl_source (
            document_id, first_name, last_name, email, institution, authors, title,
            abstract, biosketch, leverage_plan, early_career, student,
            registration_waiver, travel_award, poster_competition, breakout_sessions
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(source.document_id)
    .bind(&source.first_name)
    .bind(&source.last_name)
    .bind(&source.email)
    .bind(&source.institution)
    .bind(&source.authors)
    .bind(&source.title)
    .bind(&source.abstract_text)
    .bind(&source.biosketch)
    .bind(&source.leverage_plan)
    .bind(&source.early_career)
    .bind(&source.student)
    .bind(&source.registration_waiver)
    .bind(&source.travel_award)
    .bind(&source.poster_competition)
    .bind(&source.breakout_sessions)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn insert_reviewer<'e, E>(executor: E, reviewer: &Reviewer) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO tbl_reviewer (reviewer_id, reviewer_name) VALUES (?, ?)")
        .bind(reviewer.reviewer_id)
        .bind(&reviewer.reviewer_name)
        .execute(executor)
        .await?;
    Ok(())
}

/// Number of distinct documents this reviewer has answered in conflict screening.
pub async fn count_screened(pool: &SqlitePool, reviewer_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(DISTINCT document_id) FROM tbl_log WHERE reviewer_id = ?")
        .bind(reviewer_id)
        .fetch_one(pool)
        .await
}

pub async fn next_conflict_candidate(
    pool: &SqlitePool,
    reviewer_id: i64,
) -> Result<Option<ConflictCandidate>, sqlx::Error> {
    let candidate = sqlx::query_as::<_, ConflictCandidate>(
        r#"
        SELECT
            document_id,
            first_name || ' ' || last_name AS author,
            COALESCE(institution, '') AS affiliation,
            COALESCE(authors, 'NA') AS coauthors
        FROM tbl_source
        WHERE document_id NOT IN (
            SELECT document_id FROM tbl_log WHERE reviewer_id = ?1
        )
        ORDER BY RANDOM()
        LIMIT 1
        "#,
    )
    .bind(reviewer_id)
    .fetch_optional(pool)
    .await?;

    Ok(candidate.map(ConflictCandidate::tidied))
}

pub async fn is_screened(pool: &SqlitePool, reviewer_id: i64, document_id: i64) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tbl_log WHERE reviewer_id = ? AND document_id = ?",
    )
    .bind(reviewer_id)
    .bind(document_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn record_conflict(
    pool: &SqlitePool,
    reviewer_id: i64,
    document_id: i64,
    conflict: Conflict,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tbl_log (reviewer_id, document_id, conflict, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(reviewer_id)
    .bind(document_id)
    .bind(conflict.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_responses(pool: &SqlitePool, reviewer_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM tbl_response WHERE reviewer_id = ?")
        .bind(reviewer_id)
        .fetch_one(pool)
        .await
}

/// Picks a random document the reviewer may still score, honouring both caps
/// and the reviewer's declared conflicts.
pub async fn next_assignment(
    pool: &SqlitePool,
    reviewer_id: i64,
    limits: ReviewLimits,
) -> Result<Option<Source>, sqlx::Error> {
    sqlx::query_as::<_, Source>(
        r#"
        SELECT *
        FROM tbl_source
        WHERE document_id NOT IN (
            SELECT document_id FROM tbl_log WHERE reviewer_id = ?1 AND conflict = 'YES'
        )
        AND document_id NOT IN (
            SELECT document_id FROM tbl_response WHERE reviewer_id = ?1
        )
        AND document_id NOT IN (
            SELECT document_id
            FROM tbl_response
            GROUP BY document_id
            HAVING COUNT(document_id) >= ?2
        )
        AND (
            SELECT COUNT(*) FROM tbl_response WHERE reviewer_id = ?1
        ) < ?3
        ORDER BY RANDOM()
        LIMIT 1
        "#,
    )
    .bind(reviewer_id)
    .bind(limits.per_document)
    .bind(limits.per_reviewer)
    .fetch_optional(pool)
    .await
}

/// Why a reviewer may not score a given document right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    UnknownDocument,
    ReviewerFull,
    Conflicted,
    AlreadyReviewed,
    DocumentFull,
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Ineligible::UnknownDocument => "This document does not exist.",
            Ineligible::ReviewerFull => "You have already completed your maximum number of reviews.",
            Ineligible::Conflicted => "You declared a conflict of interest for this document.",
            Ineligible::AlreadyReviewed => "You have already reviewed this document.",
            Ineligible::DocumentFull => "This document already has enough reviews.",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct EligibilityFacts {
    pub known: i64,
    pub conflicted: i64,
    pub reviewed: i64,
    pub document_reviews: i64,
    pub reviewer_reviews: i64,
}

impl EligibilityFacts {
    pub fn evaluate(&self, limits: ReviewLimits) -> Result<(), Ineligible> {
        if self.known == 0 {
            Err(Ineligible::UnknownDocument)
        } else if self.reviewer_reviews >= limits.per_reviewer {
            Err(Ineligible::ReviewerFull)
        } else if self.conflicted > 0 {
            Err(Ineligible::Conflicted)
        } else if self.reviewed > 0 {
            Err(Ineligible::AlreadyReviewed)
        } else if self.document_reviews >= limits.per_document {
            Err(Ineligible::DocumentFull)
        } else {
            Ok(())
        }
    }
}

pub async fn check_eligibility(
    pool: &SqlitePool,
    reviewer_id: i64,
    document_id: i64,
    limits: ReviewLimits,
) -> Result<Result<(), Ineligible>, sqlx::Error> {
    let facts = sqlx::query_as::<_, EligibilityFacts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM tbl_source WHERE document_id = ?2) AS known,
            (SELECT COUNT(*) FROM tbl_log
                WHERE reviewer_id = ?1 AND document_id = ?2 AND conflict = 'YES') AS conflicted,
            (SELECT COUNT(*) FROM tbl_response
                WHERE reviewer_id = ?1 AND document_id = ?2) AS reviewed,
            (SELECT COUNT(*) FROM tbl_response WHERE document_id = ?2) AS document_reviews,
            (SELECT COUNT(*) FROM tbl_response WHERE reviewer_id = ?1) AS reviewer_reviews
        "#,
    )
    .bind(reviewer_id)
    .bind(document_id)
    .fetch_one(pool)
    .await?;

    Ok(facts.evaluate(limits))
}

/// Stores a response and returns its screening order, or `None` when the
/// reviewer id is unknown.
pub async fn insert_response(pool: &SqlitePool, response: &NewResponse) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO tbl_response (
            reviewer_id, reviewer_name, document_id, alignment, science, benefits,
            comments, screening_order, created_at
        )
        SELECT
            ?1, r.reviewer_name, ?2, ?3, ?4, ?5, ?6,
            (SELECT COALESCE(MAX(screening_order), 0) + 1 FROM tbl_response WHERE reviewer_id = ?1),
            ?7
        FROM tbl_reviewer r
        WHERE r.reviewer_id = ?1
        LIMIT 1
        RETURNING screening_order
        "#,
    )
    .bind(response.reviewer_id)
    .bind(response.document_id)
    .bind(response.alignment.value())
    .bind(response.science.value())
    .bind(response.benefits.value())
    .bind(&response.comments)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
}

const RESPONSE_DETAIL_SELECT: &str = r#"
    SELECT
        a.reviewer_id,
        a.reviewer_name,
        a.document_id,
        b.title,
        b.institution AS affiliation,
        b.authors AS coauthors,
        b.abstract,
        b.biosketch,
        b.leverage_plan,
        b.student,
        b.early_career,
        a.alignment AS workshop_alignment,
        a.science AS advancing_science,
        a.benefits,
        a.comments,
        a.screening_order,
        a.created_at
    FROM tbl_response AS a
    INNER JOIN tbl_source AS b ON a.document_id = b.document_id
"#;

pub async fn reviewer_responses(
    pool: &SqlitePool,
    reviewer_id: i64,
) -> Result<Vec<ResponseDetail>, sqlx::Error> {
    let sql = format!(
        "{} WHERE a.reviewer_id = ? ORDER BY a.screening_order",
        RESPONSE_DETAIL_SELECT
    );
    sqlx::query_as::<_, ResponseDetail>(&sql)
        .bind(reviewer_id)
        .fetch_all(pool)
        .await
}

pub async fn all_responses(pool: &SqlitePool) -> Result<Vec<ResponseDetail>, sqlx::Error> {
    let sql = format!(
        "{} ORDER BY a.reviewer_name, a.screening_order",
        RESPONSE_DETAIL_SELECT
    );
    sqlx::query_as::<_, ResponseDetail>(&sql).fetch_all(pool).await
}

/// Completion per reviewer, including reviewers who have not started.
pub async fn reviewer_progress(
    pool: &SqlitePool,
    limits: ReviewLimits,
) -> Result<Vec<ReviewerProgress>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ReviewerProgress>(
        r#"
        SELECT
            r.reviewer_id,
            r.reviewer_name,
            COUNT(a.document_id) AS completed
        FROM tbl_reviewer AS r
        LEFT JOIN tbl_response AS a ON a.reviewer_id = r.reviewer_id
        GROUP BY r.reviewer_id, r.reviewer_name
        ORDER BY completed DESC, r.reviewer_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.with_fraction(limits.per_reviewer))
        .collect())
}

pub async fn document_coverage(pool: &SqlitePool) -> Result<Vec<DocumentCoverage>, sqlx::Error> {
    sqlx::query_as::<_, DocumentCoverage>(
        r#"
        SELECT
            s.document_id,
            s.title,
            COUNT(a.reviewer_id) AS review_count
        FROM tbl_source AS s
        LEFT JOIN tbl_response AS a ON a.document_id = s.document_id
        GROUP BY s.document_id, s.title
        ORDER BY review_count ASC, s.document_id
        "#,
    )
    .fetch_all(pool)
    .await
}
