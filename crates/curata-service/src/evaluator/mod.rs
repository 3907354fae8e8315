use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::models::Source;

pub mod gemini;
pub mod prompt;
pub mod retry;

pub use gemini::{GeminiModel, GenerativeModel, ModelError};
pub use prompt::{FALLBACK_COHERENT_CATEGORY, PromptConfig, REJECTED_CATEGORY};
pub use retry::{RetryPolicy, retry_transient};

#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub url: String,
    pub title: Option<String>,
    pub source: Source,
}

/// Fields the model is asked to return. All default so a partially
/// shaped response still parses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParsedEvaluation {
    #[serde(default)]
    pub coherent: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub category_reason: String,
    #[serde(default)]
    pub title: String,
}

/// What came back from the model, before category containment is
/// applied. The unparsable arm always carries the raw text so it can
/// reach the audit ledger.
#[derive(Debug, Clone)]
pub enum EvaluationOutcome {
    Parsed { fields: ParsedEvaluation, raw: String },
    Unparsable { raw: String },
}

/// The final judgment handed to the pipeline. `category` is always a
/// member of the active category set, and is "Rejected" whenever
/// `coherent` is false.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub coherent: bool,
    pub category: String,
    pub reason: String,
    pub category_reason: String,
    pub title: String,
    pub raw: String,
}

impl EvaluationOutcome {
    pub fn parse(raw: String) -> Self {
        let candidate = extract_json(&raw);
        match serde_json::from_str::<ParsedEvaluation>(&candidate) {
            Ok(fields) => EvaluationOutcome::Parsed { fields, raw },
            Err(_) => EvaluationOutcome::Unparsable { raw },
        }
    }

    pub fn into_verdict(self, config: &PromptConfig) -> Verdict {
        match self {
            EvaluationOutcome::Parsed { mut fields, raw } => {
                if !fields.coherent {
                    fields.category = REJECTED_CATEGORY.to_string();
                } else if !config.contains(&fields.category) {
                    fields.category = FALLBACK_COHERENT_CATEGORY.to_string();
                }
                Verdict {
                    coherent: fields.coherent,
                    category: fields.category,
                    reason: fields.reason,
                    category_reason: fields.category_reason,
                    title: fields.title,
                    raw,
                }
            }
            EvaluationOutcome::Unparsable { raw } => Verdict {
                coherent: false,
                category: REJECTED_CATEGORY.to_string(),
                reason: "Model response was not valid JSON.".to_string(),
                category_reason: "No valid category selection.".to_string(),
                title: String::new(),
                raw,
            },
        }
    }
}

/// Best-effort recovery of a JSON object from free-form model output:
/// a complete object verbatim, then the contents of a fenced code
/// block, then the substring between the first `{` and the last `}`.
fn extract_json(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return trimmed.to_string();
    }

    let fence = Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("Invalid fence regex");
    let candidate = fence
        .captures(trimmed)
        .map(|cap| cap[1].trim().to_string())
        .unwrap_or_else(|| trimmed.to_string());

    if let (Some(first), Some(last)) = (candidate.find('{'), candidate.rfind('}')) {
        if last > first {
            return candidate[first..=last].to_string();
        }
    }
    candidate
}

/// Port the pipeline evaluates through.
#[async_trait]
pub trait EvaluateLink: Send + Sync {
    async fn evaluate(&self, input: &EvaluationInput) -> Result<Verdict, ModelError>;
}

pub struct LinkEvaluator {
    model: Arc<dyn GenerativeModel>,
    prompt_override: Option<PathBuf>,
    retry: RetryPolicy,
}

impl LinkEvaluator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        prompt_override: Option<PathBuf>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            prompt_override,
            retry,
        }
    }
}

#[async_trait]
impl EvaluateLink for LinkEvaluator {
    async fn evaluate(&self, input: &EvaluationInput) -> Result<Verdict, ModelError> {
        let config = PromptConfig::load(self.prompt_override.as_deref());
        let prompt = config.build_prompt(&input.url, input.title.as_deref(), input.source.as_str());

        let raw = retry_transient(self.retry, ModelError::is_transient, || {
            self.model.generate(&prompt)
        })
        .await?;

        Ok(EvaluationOutcome::parse(raw).into_verdict(&config))
    }
}
