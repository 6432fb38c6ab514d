//! Source failures degrade the context, never the request.

use super::*;
use crate::AnalysisRequest;
use futures::future::join_all;

const PROJECT: &str = "6f1c2a52-3f7e-4c1b-9a55-0d9b8f7e2c11";

fn four_sources(sentiment: Answer) -> FakeBackend {
    FakeBackend::new()
        .answer("project", Answer::Chunks(ranked("project", &[0.9, 0.7], 80)))
        .answer("context", Answer::Chunks(ranked("context", &[0.8], 80)))
        .answer("sentiment", sentiment)
        .answer("framework", Answer::Chunks(ranked("framework", &[0.95, 0.6], 80)))
}

#[tokio::test]
async fn test_failed_source_is_isolated() {
    let backend = Arc::new(four_sources(Answer::Fail("connection reset".into())));
    let llm = Arc::new(ScriptedLlm::new(&[]));
    let pipeline = pipeline_with(&test_config(), backend.clone(), llm.clone());

    let result = pipeline
        .analyse(&AnalysisRequest::new("delivery risks"))
        .await
        .unwrap();

    let statuses: Vec<_> = result
        .meta
        .sources
        .iter()
        .map(|s| (s.name.as_str(), s.status.as_str()))
        .collect();
    assert_eq!(
        statuses,
        [
            ("project", "ok"),
            ("context", "ok"),
            ("sentiment", "failed"),
            ("framework", "ok")
        ]
    );
    assert_eq!(result.used_chunks.len(), 5);
    assert_eq!(backend.calls(), 4);

    let prompt = &llm.requests()[0].prompt;
    assert!(prompt.contains("[#project:p1 | score=0.900]"));
    assert!(prompt.contains("[#context:c1 | score=0.800]"));
    assert!(prompt.contains("[#framework:f1 | score=0.950]"));
    assert!(!prompt.contains("#sentiment:"));
}

#[tokio::test]
async fn test_all_sources_failing_still_generates() {
    let backend = Arc::new(
        FakeBackend::new()
            .answer("project", Answer::Fail("down".into()))
            .answer("context", Answer::Fail("down".into()))
            .answer("sentiment", Answer::Fail("down".into()))
            .answer("framework", Answer::Fail("down".into())),
    );
    let llm = Arc::new(ScriptedLlm::new(&[]));
    let pipeline = pipeline_with(&test_config(), backend, llm.clone());

    let result = pipeline
        .analyse(&AnalysisRequest::new("delivery risks"))
        .await
        .unwrap();

    assert!(result.used_chunks.is_empty());
    assert!(result.meta.sources.iter().all(|s| s.status == "failed"));
    assert!(llm.requests()[0]
        .prompt
        .contains("no evidence was retrieved"));
}

#[tokio::test]
async fn test_slow_source_is_abandoned_at_deadline() {
    let backend = Arc::new(four_sources(Answer::Hang));
    let llm = Arc::new(ScriptedLlm::new(&[]));
    let pipeline = pipeline_with(&test_config(), backend, llm);

    let result = pipeline
        .analyse(&AnalysisRequest::new("delivery risks"))
        .await
        .unwrap();

    let sentiment = result
        .meta
        .sources
        .iter()
        .find(|s| s.name == "sentiment")
        .unwrap();
    assert_eq!(sentiment.status, "timedOut");
    assert_eq!(sentiment.returned, 0);
    assert_eq!(result.used_chunks.len(), 5);
}

#[tokio::test]
async fn test_project_scope_reaches_scoped_sources_only() {
    let backend = Arc::new(four_sources(Answer::Chunks(Vec::new())));
    let llm = Arc::new(ScriptedLlm::new(&[]));
    let pipeline = pipeline_with(&test_config(), backend.clone(), llm);

    pipeline
        .analyse(&AnalysisRequest::new("delivery risks").with_source_identifier(PROJECT))
        .await
        .unwrap();

    let project = backend.filters_for("project").unwrap();
    assert_eq!(
        project.get("project_id").and_then(|v| v.as_str()),
        Some(PROJECT)
    );
    assert!(backend.filters_for("framework").unwrap().is_empty());
}

#[tokio::test]
async fn test_dimension_mismatch_is_fatal() {
    let mut config = test_config();
    config.embedding.dimensions = DIMS * 2;
    let backend = Arc::new(four_sources(Answer::Chunks(Vec::new())));
    let llm = Arc::new(ScriptedLlm::new(&[]));
    let pipeline = pipeline_with(&config, backend.clone(), llm.clone());

    let err = pipeline
        .analyse(&AnalysisRequest::new("delivery risks"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "EmbeddingError");
    assert_eq!(backend.calls(), 0);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_pipeline() {
    let backend = Arc::new(four_sources(Answer::Chunks(Vec::new())));
    let llm = Arc::new(ScriptedLlm::new(&[]));
    let pipeline = pipeline_with(&test_config(), backend.clone(), llm.clone());

    let requests: Vec<_> = (0..3)
        .map(|i| AnalysisRequest::new(format!("question {}", i)))
        .collect();
    let results = join_all(requests.iter().map(|r| pipeline.analyse(r))).await;

    let mut ids: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().meta.request_id)
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(backend.calls(), 12);
    assert_eq!(llm.calls(), 3);
}

#[test]
fn test_health_is_liveness_only() {
    let backend = Arc::new(FakeBackend::new());
    let llm = Arc::new(ScriptedLlm::new(&[]));
    let pipeline = pipeline_with(&test_config(), backend.clone(), llm);

    assert_eq!(pipeline.health().status, "ok");
    assert_eq!(backend.calls(), 0);
}
