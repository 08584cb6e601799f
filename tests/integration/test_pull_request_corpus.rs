//! Pull-request records from file to retrieval.

use std::sync::Arc;

use crate::common::TestStore;
use ragindex::completion::body_message_prompt;
use ragindex::config::{CorpusConfig, CorpusKind, PlaceholderConfig};
use ragindex::corpus::{load_corpus, load_pull_requests};
use ragindex::vector::{HashingEmbeddingGenerator, VectorDimension};
use ragindex::{IndexBuilder, IndexError, RetrievalEngine};

const RECORDS: &str = concat!(
    r#"{"title": "Fix NPE in parser", "commit_message": "guard null tokens", "#,
    r#""body_message": "Adds a null check before reading tokens", "#,
    r#""diff": "+public class TokenReader {\n+    public void readNext() {", "#,
    r#""issue": {"issue_number": 12, "title": "Parser crashes on empty input", "#,
    r#""closed_at": "2023-01-02", "comments": ["Reproduced on main", ""]}, "#,
    r#""created_at": "2023-01-01"}"#,
    "\n",
    r#"{"title": "Bump jackson", "commit_message": "N/A", "body_message": "dependency update"}"#,
    "\n",
    r#"{"title": "Add retry to HTTP client", "commit_message": "retry idempotent requests", "#,
    r#""body_message": "Retries GET requests up to three times", "diff": "", "issue": null}"#,
    "\n",
);

fn embedder() -> Arc<HashingEmbeddingGenerator> {
    Arc::new(HashingEmbeddingGenerator::new(VectorDimension::new(256).unwrap()))
}

#[test]
fn test_pull_request_pipeline() {
    let project = TestStore::new();
    let source = project.add_file("prs.jsonl", RECORDS);
    let placeholders = PlaceholderConfig::default();

    let config = CorpusConfig {
        kind: CorpusKind::PullRequests,
        source: source.clone(),
        placeholders: placeholders.clone(),
    };
    let units = load_corpus(&config).unwrap();
    // The record with an "N/A" commit message is skipped.
    assert_eq!(units.len(), 2);
    let first = &units[0].text;
    assert!(first.starts_with("Title: Fix NPE in parser Commit Message: guard null tokens "));
    assert!(first.contains(" Diff Summary: classes=[TokenReader]"));
    assert!(first.ends_with("Issue: Parser crashes on empty input Comments: Reproduced on main"));
    assert!(units[1].text.contains(&format!("Diff Summary: {}", placeholders.diff)));
    assert!(units[1].text.contains(&format!("Issue: {}", placeholders.issue)));

    let report = IndexBuilder::new(project.store.clone(), embedder())
        .build(units)
        .unwrap();
    assert_eq!(report.manifest.vector_count, 2);

    let engine = RetrievalEngine::load(&project.store, embedder()).unwrap();
    let query = load_pull_requests(&source).unwrap()[0].query_text(&placeholders);
    let hits = engine.retrieve(&query, 5).unwrap();
    assert_eq!(hits.len(), 2);

    let top = &hits[0].document;
    assert_eq!(top.field("title"), Some("Fix NPE in parser"));
    assert_eq!(top.field("issue_title"), Some("Parser crashes on empty input"));
    assert_eq!(top.field("created_at"), Some("2023-01-01"));
    assert_eq!(hits[1].document.field("issue_title"), None);
}

#[test]
fn test_body_prompt_folds_retrieved_records() {
    let project = TestStore::new();
    let source = project.add_file("prs.jsonl", RECORDS);
    let placeholders = PlaceholderConfig::default();
    let records = load_pull_requests(&source).unwrap();

    IndexBuilder::new(project.store.clone(), embedder())
        .build(ragindex::corpus::pull_request_units(&records, &placeholders))
        .unwrap();
    let engine = RetrievalEngine::load(&project.store, embedder()).unwrap();

    let target = &records[2];
    let context = engine
        .retrieve_documents(&target.query_text(&placeholders), 1)
        .unwrap();
    let prompt = body_message_prompt(target, &context, &placeholders);

    assert!(prompt.contains("Title: Add retry to HTTP client"));
    assert!(prompt.contains("Body Message: Retries GET requests up to three times"));
}

#[test]
fn test_corpus_with_only_incomplete_records_is_empty() {
    let project = TestStore::new();
    let source = project.add_file(
        "prs.json",
        r#"[{"title": "only a title"}, {"commit_message": "only a commit"}]"#,
    );
    let config = CorpusConfig {
        kind: CorpusKind::PullRequests,
        source,
        placeholders: PlaceholderConfig::default(),
    };

    let units = load_corpus(&config).unwrap();
    assert!(units.is_empty());
    let err = IndexBuilder::new(project.store.clone(), embedder())
        .build(units)
        .unwrap_err();
    assert_eq!(err.status_code(), "EMPTY_CORPUS");
    assert!(matches!(err, IndexError::Vector(_)));
}
