//! End-to-end context gathering over an in-memory corpus.

use crate::embeddings::TrigramProvider;
use crate::{
    gather_context, project_scope, source_specs, InMemoryIndex, RetrievalConfig,
    RetrievalOverrides, SearchFilters,
};
use velosight_core::config::AssemblyMode;

const PROJECT: &str = "6f1c2a52-3f7e-4c1b-9a55-0d9b8f7e2c11";
const OTHER_PROJECT: &str = "0b7d4c0e-9a1f-4e5b-8c3d-2f6a7b8c9d0e";

fn corpus() -> String {
    [
        format!(
            r#"{{"source":"project","id":"p1","content":"Milestone slippage on the payments platform delivery plan","metadata":{{"project_id":"{}","title":"Delivery plan"}}}}"#,
            PROJECT
        ),
        format!(
            r#"{{"source":"project","id":"p2","content":"Payments platform budget overrun and delivery risk","metadata":{{"project_id":"{}"}}}}"#,
            PROJECT
        ),
        format!(
            r#"{{"source":"project","id":"x1","content":"Payments platform delivery slippage in another programme","metadata":{{"project_id":"{}"}}}}"#,
            OTHER_PROJECT
        ),
        format!(
            r#"{{"source":"sentiment","id":"s1","content":"Team sentiment about delivery is anxious","metadata":{{"project_id":"{}"}}}}"#,
            PROJECT
        ),
        r#"{"source":"framework","id":"f1","content":"Gateway review guidance on delivery confidence","metadata":{"name":"Gateway guide"}}"#.to_string(),
        r#"{"source":"framework","id":"f2","content":"Assurance framework for delivery risk ratings","metadata":{}}"#.to_string(),
    ]
    .join("\n")
}

async fn index(embedder: &TrigramProvider) -> InMemoryIndex {
    InMemoryIndex::from_jsonl_str(&corpus(), embedder).await.unwrap()
}

#[test]
fn test_project_scope_requires_uuid() {
    assert!(project_scope(Some(PROJECT)).is_some());
    assert!(project_scope(Some(" not-a-uuid ")).is_none());
    assert!(project_scope(Some("")).is_none());
    assert!(project_scope(None).is_none());
}

#[test]
fn test_framework_spec_is_never_scoped() {
    let config = RetrievalConfig::default();
    let specs = source_specs(&config, project_scope(Some(PROJECT)));

    let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["project", "context", "sentiment", "framework"]);

    assert_eq!(
        specs[0].filters.get("project_id").and_then(|v| v.as_str()),
        Some(PROJECT)
    );
    assert!(specs[3].filters.is_empty());
}

#[test]
fn test_unscoped_specs_carry_null_project() {
    let specs = source_specs(&RetrievalConfig::default(), None);
    assert_eq!(specs[0].filters, SearchFilters::new().with_project(None));
}

#[tokio::test]
async fn test_gather_scopes_project_sources() {
    let embedder = TrigramProvider::new(384);
    let index = index(&embedder).await;
    let config = RetrievalConfig::default();

    let gathered = gather_context(
        &embedder,
        &index,
        &config,
        384,
        "payments platform delivery slippage",
        Some(PROJECT),
    )
    .await
    .unwrap();

    let keys = gathered.pack.citation_keys(50);
    assert!(keys.contains(&"#project:p1".to_string()));
    assert!(!keys.contains(&"#project:x1".to_string()));
    assert!(keys.contains(&"#framework:f1".to_string()));
    assert!(gathered.pack.context_text.contains("[#sentiment:s1 | score="));
    assert!(gathered.retrieval.get("context").unwrap().succeeded());
}

#[tokio::test]
async fn test_gather_unscoped_sees_every_project() {
    let embedder = TrigramProvider::new(384);
    let index = index(&embedder).await;

    let gathered = gather_context(
        &embedder,
        &index,
        &RetrievalConfig::default(),
        384,
        "payments platform delivery slippage",
        Some("programme-alpha"),
    )
    .await
    .unwrap();

    assert_eq!(gathered.pack.used_from("project"), 3);
}

#[tokio::test]
async fn test_gather_ranks_relevant_chunk_first() {
    let embedder = TrigramProvider::new(384);
    let index = index(&embedder).await;
    let overrides = RetrievalOverrides::new().with_k("project", 1);
    let config = RetrievalConfig::default().with_overrides(&overrides).unwrap();

    let gathered = gather_context(
        &embedder,
        &index,
        &config,
        384,
        "budget overrun",
        Some(PROJECT),
    )
    .await
    .unwrap();

    assert_eq!(gathered.pack.used[0].citation_key(), "#project:p2");
}

#[tokio::test]
async fn test_gather_weighted_respects_budget() {
    let embedder = TrigramProvider::new(384);
    let index = index(&embedder).await;
    let overrides = RetrievalOverrides::new()
        .with_assembly(AssemblyMode::Weighted)
        .with_min_score(0.0)
        .with_max_context_chars(400);
    let config = RetrievalConfig::default().with_overrides(&overrides).unwrap();

    let gathered = gather_context(&embedder, &index, &config, 384, "delivery", None)
        .await
        .unwrap();

    assert!(gathered.pack.context_text.chars().count() <= 400);
    assert_eq!(gathered.pack.citations.len(), gathered.pack.used.len());
}

#[tokio::test]
async fn test_dimension_mismatch_aborts() {
    let embedder = TrigramProvider::new(384);
    let index = index(&embedder).await;

    let err = gather_context(
        &embedder,
        &index,
        &RetrievalConfig::default(),
        768,
        "delivery",
        None,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), "EmbeddingError");
}
