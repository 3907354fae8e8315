use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use curata_service::models::Source;
use curata_service::pipeline::Submission;
use curata_service::repositories::LinkRepository;

mod common;

use common::{
    ACCEPT_RESPONSE, CountingModel, REJECT_RESPONSE, ScriptedModel, StaticFeedFetcher,
    build_harness, build_harness_with_model, permanent_error, transient_error,
};

fn submission(url: &str) -> Submission {
    Submission {
        url: url.to_string(),
        source: Source::User,
        source_meta: None,
    }
}

#[tokio::test]
async fn test_accepted_link_is_stored_and_audited() -> Result<()> {
    let harness = build_harness(
        ScriptedModel::new(vec![Ok(ACCEPT_RESPONSE.to_string())]),
        StaticFeedFetcher::empty(),
    );

    let outcome = harness
        .pipeline
        .process(submission("https://example.com/article"))
        .await?;

    assert!(!outcome.is_duplicate);
    assert!(outcome.entry.coherent);
    assert_eq!(outcome.entry.category, "Digital Democracy");
    assert_eq!(outcome.entry.title, "Model Title");
    assert_eq!(outcome.entry.normalized_url, "https://example.com/article");

    let rows = harness.audit_rows();
    assert_eq!(rows.len(), 1);
    // timestamp,source,url,title,image,coherent,category,...
    assert_eq!(&rows[0][1], "user");
    assert_eq!(&rows[0][2], "https://example.com/article");
    assert_eq!(&rows[0][6], "Digital Democracy");

    Ok(())
}

#[tokio::test]
async fn test_duplicate_submission_returns_existing_entry() -> Result<()> {
    let harness = build_harness(ScriptedModel::always(ACCEPT_RESPONSE), StaticFeedFetcher::empty());

    let first = harness
        .pipeline
        .process(submission("https://example.com/article"))
        .await?;

    // Tracking suffix and trailing slash collapse to the same key.
    let second = harness
        .pipeline
        .process(submission(
            "https://example.com/article/?utm_source=newsletter",
        ))
        .await?;

    assert!(!first.is_duplicate);
    assert!(second.is_duplicate);
    assert_eq!(first.entry.id, second.entry.id);

    // The duplicate is skipped before preview and evaluation, so the
    // ledger holds exactly one row.
    assert_eq!(harness.audit_rows().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_same_link_submissions_evaluate_once() -> Result<()> {
    let model = CountingModel::new(ACCEPT_RESPONSE, Duration::from_millis(100));
    let calls = model.calls.clone();
    let harness = build_harness_with_model(Arc::new(model), StaticFeedFetcher::empty());

    // Two tracking variants of the same page arriving at once serialize
    // on the per-key lock; the loser must hit the dedup short-circuit
    // instead of fetching and evaluating a second time.
    let (first, second) = tokio::join!(
        harness
            .pipeline
            .process(submission("https://example.com/raced")),
        harness
            .pipeline
            .process(submission("https://example.com/raced/?utm_source=x")),
    );
    let first = first?;
    let second = second?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.entry.id, second.entry.id);
    assert!(first.is_duplicate != second.is_duplicate);

    let entries = harness.links.list(None).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(harness.audit_rows().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_incoherent_link_is_stored_as_rejected() -> Result<()> {
    let harness = build_harness(
        ScriptedModel::new(vec![Ok(REJECT_RESPONSE.to_string())]),
        StaticFeedFetcher::empty(),
    );

    let outcome = harness
        .pipeline
        .process(submission("https://example.com/spam"))
        .await?;

    assert!(!outcome.entry.coherent);
    assert_eq!(outcome.entry.category, "Rejected");

    let rows = harness.audit_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][5], "false");
    assert_eq!(&rows[0][6], "Rejected");

    Ok(())
}

#[tokio::test]
async fn test_malformed_model_output_is_recorded_not_dropped() -> Result<()> {
    let harness = build_harness(
        ScriptedModel::new(vec![Ok("that page looks fine to me".to_string())]),
        StaticFeedFetcher::empty(),
    );

    let outcome = harness
        .pipeline
        .process(submission("https://example.com/odd"))
        .await?;

    assert!(!outcome.entry.coherent);
    assert_eq!(outcome.entry.category, "Rejected");
    assert_eq!(outcome.entry.reason, "Model response was not valid JSON.");

    // The verbatim model output lands in the ledger's raw column.
    let rows = harness.audit_rows();
    assert_eq!(&rows[0][9], "that page looks fine to me");

    Ok(())
}

#[tokio::test]
async fn test_transient_failure_retries_then_succeeds() -> Result<()> {
    let harness = build_harness(
        ScriptedModel::new(vec![
            Err(transient_error()),
            Err(transient_error()),
            Ok(ACCEPT_RESPONSE.to_string()),
        ]),
        StaticFeedFetcher::empty(),
    );

    let outcome = harness
        .pipeline
        .process(submission("https://example.com/flaky"))
        .await?;

    assert!(outcome.entry.coherent);
    assert_eq!(harness.audit_rows().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_leave_no_entry_and_no_audit_row() -> Result<()> {
    let harness = build_harness(
        ScriptedModel::new(vec![
            Err(transient_error()),
            Err(transient_error()),
            Err(transient_error()),
        ]),
        StaticFeedFetcher::empty(),
    );

    let result = harness
        .pipeline
        .process(submission("https://example.com/down"))
        .await;

    assert!(result.is_err());
    assert!(result.unwrap_err().is_transient());

    let entries = harness.links.list(None).await?;
    assert!(entries.is_empty());
    assert!(harness.audit_rows().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_permanent_failure_does_not_retry() -> Result<()> {
    // A single scripted response; a retry would exhaust the script and
    // panic inside the stub.
    let model = ScriptedModel::new(vec![Err(permanent_error())]);
    let harness = build_harness(model, StaticFeedFetcher::empty());

    let result = harness
        .pipeline
        .process(submission("https://example.com/bad"))
        .await;

    assert!(result.is_err());
    assert!(!result.unwrap_err().is_transient());
    assert!(harness.audit_rows().is_empty());

    Ok(())
}
