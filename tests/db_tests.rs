//! Query-level tests for assignment, caps, conflict screening and exports.

mod common;

use std::collections::HashSet;

use common::{seeded_pool, test_pool};
use workshop_screening::config::ReviewLimits;
use workshop_screening::db::{self, Conflict, Ineligible, NewResponse, Score};
use workshop_screening::storage::{self, transfer, FileFormat};

fn response(reviewer_id: i64, document_id: i64) -> NewResponse {
    NewResponse {
        reviewer_id,
        document_id,
        alignment: Score::parse("3").unwrap(),
        science: Score::parse("2").unwrap(),
        benefits: Score::parse("4").unwrap(),
        comments: "hydrology".to_string(),
    }
}

#[tokio::test]
async fn import_counts_documents_and_reviewers() {
    let pool = seeded_pool().await;

    assert_eq!(db::count_sources(pool.as_ref()).await.unwrap(), 3);

    let reviewers = db::list_reviewers(pool.as_ref()).await.unwrap();
    let names: Vec<_> = reviewers.iter().map(|r| r.reviewer_name.as_str()).collect();
    assert_eq!(names, vec!["Barbara McClintock", "Katherine Johnson", "Rosalind Franklin"]);

    let source = db::get_source(pool.as_ref(), 2).await.unwrap().unwrap();
    assert_eq!(source.lead_author(), "Grace Hopper");
    assert_eq!(source.authors, None);
}

#[tokio::test]
async fn failed_import_leaves_tables_untouched() {
    let pool = test_pool().await;
    let bad = "reviewer_id,reviewer_name\n1,Ada\nnot-a-number,Grace\n";

    assert!(transfer::import_reviewers(pool.as_ref(), bad.as_bytes()).await.is_err());
    assert!(db::list_reviewers(pool.as_ref()).await.unwrap().is_empty());
}

#[tokio::test]
async fn conflict_candidates_cover_each_document_once() {
    let pool = seeded_pool().await;
    let mut seen = HashSet::new();

    while let Some(candidate) = db::next_conflict_candidate(pool.as_ref(), 10).await.unwrap() {
        assert!(seen.insert(candidate.document_id), "document offered twice");
        db::record_conflict(pool.as_ref(), 10, candidate.document_id, Conflict::No)
            .await
            .unwrap();
    }

    assert_eq!(seen.len(), 3);
    assert_eq!(db::count_screened(pool.as_ref(), 10).await.unwrap(), 3);
    // Another reviewer's screening is independent.
    assert_eq!(db::count_screened(pool.as_ref(), 20).await.unwrap(), 0);
}

#[tokio::test]
async fn conflict_candidate_tidies_text_and_fills_missing_coauthors() {
    let pool = seeded_pool().await;
    for id in [1, 3] {
        db::record_conflict(pool.as_ref(), 10, id, Conflict::No).await.unwrap();
    }

    let candidate = db::next_conflict_candidate(pool.as_ref(), 10).await.unwrap().unwrap();
    assert_eq!(candidate.document_id, 2);
    assert_eq!(candidate.author, "Grace Hopper");
    assert_eq!(candidate.coauthors, "NA");
}

#[tokio::test]
async fn assignment_skips_declared_conflicts() {
    let pool = seeded_pool().await;
    let limits = ReviewLimits::default();

    db::record_conflict(pool.as_ref(), 10, 1, Conflict::Yes).await.unwrap();
    db::record_conflict(pool.as_ref(), 10, 2, Conflict::Yes).await.unwrap();
    db::record_conflict(pool.as_ref(), 10, 3, Conflict::No).await.unwrap();

    for _ in 0..10 {
        let source = db::next_assignment(pool.as_ref(), 10, limits).await.unwrap().unwrap();
        assert_eq!(source.document_id, 3);
    }

    assert_eq!(
        db::check_eligibility(pool.as_ref(), 10, 1, limits).await.unwrap(),
        Err(Ineligible::Conflicted)
    );
}

#[tokio::test]
async fn assignment_never_repeats_a_document_for_a_reviewer() {
    let pool = seeded_pool().await;
    let limits = ReviewLimits::default();
    let mut reviewed = HashSet::new();

    while let Some(source) = db::next_assignment(pool.as_ref(), 20, limits).await.unwrap() {
        assert!(reviewed.insert(source.document_id));
        db::insert_response(pool.as_ref(), &response(20, source.document_id))
            .await
            .unwrap()
            .unwrap();
    }

    assert_eq!(reviewed.len(), 3);
    assert_eq!(
        db::check_eligibility(pool.as_ref(), 20, 1, limits).await.unwrap(),
        Err(Ineligible::AlreadyReviewed)
    );
}

#[tokio::test]
async fn per_document_cap_removes_full_documents() {
    let pool = seeded_pool().await;
    let limits = ReviewLimits { per_document: 2, per_reviewer: 15 };

    db::insert_response(pool.as_ref(), &response(10, 1)).await.unwrap();
    db::insert_response(pool.as_ref(), &response(20, 1)).await.unwrap();

    for _ in 0..10 {
        let source = db::next_assignment(pool.as_ref(), 30, limits).await.unwrap().unwrap();
        assert_ne!(source.document_id, 1);
    }
    assert_eq!(
        db::check_eligibility(pool.as_ref(), 30, 1, limits).await.unwrap(),
        Err(Ineligible::DocumentFull)
    );
    assert_eq!(db::check_eligibility(pool.as_ref(), 30, 2, limits).await.unwrap(), Ok(()));
}

#[tokio::test]
async fn per_reviewer_cap_ends_the_queue() {
    let pool = seeded_pool().await;
    let limits = ReviewLimits { per_document: 3, per_reviewer: 1 };

    db::insert_response(pool.as_ref(), &response(10, 2)).await.unwrap();

    assert!(db::next_assignment(pool.as_ref(), 10, limits).await.unwrap().is_none());
    assert_eq!(
        db::check_eligibility(pool.as_ref(), 10, 3, limits).await.unwrap(),
        Err(Ineligible::ReviewerFull)
    );
}

#[tokio::test]
async fn unknown_document_is_not_eligible() {
    let pool = seeded_pool().await;
    assert_eq!(
        db::check_eligibility(pool.as_ref(), 10, 999, ReviewLimits::default())
            .await
            .unwrap(),
        Err(Ineligible::UnknownDocument)
    );
}

#[tokio::test]
async fn screening_order_counts_up_per_reviewer() {
    let pool = seeded_pool().await;

    assert_eq!(db::insert_response(pool.as_ref(), &response(10, 3)).await.unwrap(), Some(1));
    assert_eq!(db::insert_response(pool.as_ref(), &response(10, 1)).await.unwrap(), Some(2));
    assert_eq!(db::insert_response(pool.as_ref(), &response(20, 1)).await.unwrap(), Some(1));

    let responses = db::reviewer_responses(pool.as_ref(), 10).await.unwrap();
    let order: Vec<_> = responses.iter().map(|r| (r.screening_order, r.document_id)).collect();
    assert_eq!(order, vec![(1, 3), (2, 1)]);
    assert_eq!(responses[0].reviewer_name, "Rosalind Franklin");
    assert_eq!(responses[0].title.as_deref(), Some("Computability"));
    assert_eq!(responses[0].workshop_alignment, 3);
}

#[tokio::test]
async fn response_for_unknown_reviewer_is_not_stored() {
    let pool = seeded_pool().await;
    assert_eq!(db::insert_response(pool.as_ref(), &response(77, 1)).await.unwrap(), None);
    assert!(db::all_responses(pool.as_ref()).await.unwrap().is_empty());
}

#[tokio::test]
async fn progress_includes_idle_reviewers() {
    let pool = seeded_pool().await;
    let limits = ReviewLimits { per_document: 3, per_reviewer: 3 };

    db::insert_response(pool.as_ref(), &response(20, 1)).await.unwrap();
    db::insert_response(pool.as_ref(), &response(20, 2)).await.unwrap();
    db::insert_response(pool.as_ref(), &response(10, 1)).await.unwrap();

    let progress = db::reviewer_progress(pool.as_ref(), limits).await.unwrap();
    let summary: Vec<_> = progress
        .iter()
        .map(|p| (p.reviewer_name.as_str(), p.completed, p.fraction_complete))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Barbara McClintock", 2, 0.67),
            ("Rosalind Franklin", 1, 0.33),
            ("Katherine Johnson", 0, 0.0),
        ]
    );

    let coverage = db::document_coverage(pool.as_ref()).await.unwrap();
    let counts: Vec<_> = coverage.iter().map(|c| (c.document_id, c.review_count)).collect();
    assert_eq!(counts, vec![(3, 0), (2, 1), (1, 2)]);
}

#[tokio::test]
async fn readonly_query_returns_rows_and_discards_writes() {
    let pool = seeded_pool().await;

    let result = db::run_readonly_query(
        pool.as_ref(),
        "SELECT document_id, title, NULL AS missing FROM tbl_source ORDER BY document_id",
    )
    .await
    .unwrap();
    assert_eq!(result.columns, vec!["document_id", "title", "missing"]);
    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.rows[0][0], serde_json::json!(1));
    assert_eq!(result.rows[0][1], serde_json::json!("Engines"));
    assert_eq!(result.rows[0][2], serde_json::Value::Null);

    assert!(db::run_readonly_query(pool.as_ref(), "DELETE FROM tbl_source")
        .await
        .is_err());
    assert_eq!(db::count_sources(pool.as_ref()).await.unwrap(), 3);

    assert!(db::run_readonly_query(pool.as_ref(), "SELECT * FROM no_such_table")
        .await
        .is_err());
}

#[tokio::test]
async fn readonly_query_survives_an_embedded_commit() {
    let pool = seeded_pool().await;

    let outcome = db::run_readonly_query(
        pool.as_ref(),
        "COMMIT; DELETE FROM tbl_source; SELECT 1",
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(db::count_sources(pool.as_ref()).await.unwrap(), 3);

    let outcome = db::run_readonly_query(
        pool.as_ref(),
        "PRAGMA query_only = OFF; DELETE FROM tbl_source",
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(db::count_sources(pool.as_ref()).await.unwrap(), 3);
}

#[tokio::test]
async fn readonly_query_leaves_the_connection_writable() {
    let pool = seeded_pool().await;

    db::run_readonly_query(pool.as_ref(), "BEGIN; SELECT 1")
        .await
        .ok();
    db::run_readonly_query(pool.as_ref(), "SELECT 1").await.unwrap();

    db::record_conflict(pool.as_ref(), 10, 1, Conflict::No).await.unwrap();
    assert_eq!(db::count_screened(pool.as_ref(), 10).await.unwrap(), 1);
}

#[tokio::test]
async fn readonly_query_names_columns_without_rows() {
    let pool = seeded_pool().await;

    let result = db::run_readonly_query(
        pool.as_ref(),
        "SELECT reviewer_id, document_id FROM tbl_response",
    )
    .await
    .unwrap();
    assert!(result.rows.is_empty());
    assert_eq!(result.columns, vec!["reviewer_id", "document_id"]);

    let csv = String::from_utf8(transfer::query_csv(&result).unwrap()).unwrap();
    assert_eq!(csv, "reviewer_id,document_id\n");
}

#[tokio::test]
async fn readonly_query_shows_blobs_as_hex() {
    let pool = seeded_pool().await;

    let result = db::run_readonly_query(pool.as_ref(), "SELECT x'cafe' AS data, 2.5 AS ratio")
        .await
        .unwrap();
    assert_eq!(result.rows[0][0], serde_json::json!("x'cafe'"));
    assert_eq!(result.rows[0][1], serde_json::json!(2.5));
}

#[tokio::test]
async fn export_bundle_holds_every_table() {
    let pool = seeded_pool().await;
    db::insert_response(pool.as_ref(), &response(10, 1)).await.unwrap();

    let bytes = transfer::export_bundle(pool.as_ref(), FileFormat::Csv).await.unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();

    let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["tbl_log.csv", "tbl_response.csv", "tbl_reviewer.csv", "tbl_source.csv"]
    );

    // The empty conflict log still exports its header.
    let mut log = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("tbl_log.csv").unwrap(), &mut log).unwrap();
    assert_eq!(log.trim(), "reviewer_id,document_id,conflict,created_at");
}

#[tokio::test]
async fn parquet_bundle_holds_every_table() {
    let pool = seeded_pool().await;
    db::insert_response(pool.as_ref(), &response(10, 1)).await.unwrap();

    let bytes = transfer::export_bundle(pool.as_ref(), FileFormat::Parquet).await.unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();

    let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "tbl_log.parquet",
            "tbl_response.parquet",
            "tbl_reviewer.parquet",
            "tbl_source.parquet"
        ]
    );

    // Reviewers read back as CSV through the Parquet import path.
    let mut data = Vec::new();
    std::io::Read::read_to_end(&mut archive.by_name("tbl_reviewer.parquet").unwrap(), &mut data).unwrap();
    let csv = String::from_utf8(storage::import_csv(data, FileFormat::Parquet).unwrap()).unwrap();
    assert_eq!(csv.lines().next(), Some("reviewer_id,reviewer_name"));
    assert_eq!(csv.lines().count(), 4);
}

#[tokio::test]
async fn parquet_reviewers_import_into_a_fresh_database() {
    let source = seeded_pool().await;
    let result = db::run_readonly_query(source.as_ref(), "SELECT * FROM tbl_reviewer")
        .await
        .unwrap();
    let parquet = storage::columnar::parquet_bytes(&result).unwrap();

    let pool = test_pool().await;
    let csv = storage::import_csv(parquet, FileFormat::Parquet).unwrap();
    let count = transfer::import_reviewers(pool.as_ref(), csv.as_slice()).await.unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        db::get_reviewer(pool.as_ref(), 20).await.unwrap().unwrap().reviewer_name,
        "Barbara McClintock"
    );
}

#[tokio::test]
async fn sources_without_names_are_not_imported() {
    let pool = test_pool().await;

    let outcome = transfer::import_sources(pool.as_ref(), "document_id,first_name,last_name\n1,,\n".as_bytes()).await;
    match outcome {
        Err(workshop_screening::error::AppError::InvalidInput(msg)) => {
            assert_eq!(msg, "row 2: first_name is required")
        }
        other => panic!("expected invalid input, got {:?}", other),
    }
    assert_eq!(db::count_sources(pool.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn import_from_file_path() {
    use std::io::Write;

    let pool = test_pool().await;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(common::REVIEWERS_CSV.as_bytes()).unwrap();

    let reader = std::fs::File::open(file.path()).unwrap();
    let count = transfer::import_reviewers(pool.as_ref(), reader).await.unwrap();
    assert_eq!(count, 3);
}
