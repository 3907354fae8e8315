use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::audit::{AuditRecord, AuditSink};
use crate::errors::StoreError;
use crate::evaluator::{EvaluateLink, EvaluationInput, ModelError};
use crate::models::{LinkEntry, Source, SourceMeta, generate_id};
use crate::normalize::normalize_url;
use crate::preview::{FetchPreview, Preview};
use crate::repositories::LinkRepository;

#[derive(Debug, Clone)]
pub struct Submission {
    pub url: String,
    pub source: Source,
    pub source_meta: Option<SourceMeta>,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub entry: LinkEntry,
    pub is_duplicate: bool,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Evaluation(#[from] ModelError),
}

impl PipelineError {
    /// Transient failures are worth deferring to the retry queue rather
    /// than surfacing to the submitter.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Evaluation(err) if err.is_transient())
    }
}

/// Orchestrates normalize → dedup → preview → evaluate → persist →
/// audit for every submission, regardless of where it came from.
pub struct IngestPipeline {
    links: Arc<dyn LinkRepository>,
    audit: Arc<dyn AuditSink>,
    preview: Arc<dyn FetchPreview>,
    evaluator: Arc<dyn EvaluateLink>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IngestPipeline {
    pub fn new(
        links: Arc<dyn LinkRepository>,
        audit: Arc<dyn AuditSink>,
        preview: Arc<dyn FetchPreview>,
        evaluator: Arc<dyn EvaluateLink>,
    ) -> Self {
        Self {
            links,
            audit,
            preview,
            evaluator,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn process(&self, submission: Submission) -> Result<ProcessOutcome, PipelineError> {
        let key = normalize_url(&submission.url);

        // Concurrent submissions of the same link (a user and the bot
        // racing, or a poll overlapping a live submission) serialize on
        // a per-key lock; the loser lands on the dedup short-circuit.
        let slot = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.entry(key.clone()).or_default().clone()
        };
        let guard = slot.lock().await;

        let result = self.process_inner(&key, submission).await;

        drop(guard);
        let mut in_flight = self.in_flight.lock().await;
        if let Some(existing) = in_flight.get(&key) {
            // Map slot + our clone; nobody else is waiting on this key.
            if Arc::strong_count(existing) <= 2 {
                in_flight.remove(&key);
            }
        }

        result
    }

    async fn process_inner(
        &self,
        key: &str,
        submission: Submission,
    ) -> Result<ProcessOutcome, PipelineError> {
        if let Some(existing) = self.links.find_by_normalized(key).await? {
            info!(url = %submission.url, source = %submission.source, "Duplicate link skipped");
            return Ok(ProcessOutcome {
                entry: existing,
                is_duplicate: true,
            });
        }

        // The evaluator consumes the preview title, so these two stay
        // strictly sequential.
        let preview = self.preview.fetch_preview(&submission.url).await;
        let verdict = self
            .evaluator
            .evaluate(&EvaluationInput {
                url: submission.url.clone(),
                title: preview.title.clone(),
                source: submission.source,
            })
            .await?;

        let entry = LinkEntry {
            id: generate_id(),
            url: submission.url,
            normalized_url: key.to_string(),
            title: pick_title(&verdict.title, &preview),
            image: preview.image,
            coherent: verdict.coherent,
            category: verdict.category,
            reason: verdict.reason,
            category_reason: verdict.category_reason,
            source: submission.source,
            source_meta: submission.source_meta,
            created_at: Utc::now().naive_utc(),
        };
        // pick_title falls back to the raw URL last.
        let entry = if entry.title.is_empty() {
            LinkEntry {
                title: entry.url.clone(),
                ..entry
            }
        } else {
            entry
        };

        let outcome = self.links.insert(entry).await?;
        if outcome.is_duplicate {
            return Ok(ProcessOutcome {
                entry: outcome.entry,
                is_duplicate: true,
            });
        }

        let record = AuditRecord {
            timestamp: outcome.entry.created_at.and_utc().to_rfc3339(),
            source: outcome.entry.source.as_str().to_string(),
            url: outcome.entry.url.clone(),
            title: outcome.entry.title.clone(),
            image: outcome.entry.image.clone(),
            coherent: outcome.entry.coherent,
            category: outcome.entry.category.clone(),
            reason: outcome.entry.reason.clone(),
            category_reason: outcome.entry.category_reason.clone(),
            raw_ai: verdict.raw,
        };
        if let Err(err) = self.audit.append(&record).await {
            // Best-effort ledger; the stored entry stands.
            error!(url = %outcome.entry.url, error = %err, "Audit append failed");
        }

        info!(
            url = %outcome.entry.url,
            source = %outcome.entry.source,
            coherent = outcome.entry.coherent,
            "Processed link"
        );
        Ok(ProcessOutcome {
            entry: outcome.entry,
            is_duplicate: false,
        })
    }
}

fn pick_title(verdict_title: &str, preview: &Preview) -> String {
    if !verdict_title.is_empty() {
        return verdict_title.to_string();
    }
    preview.title.clone().unwrap_or_default()
}
