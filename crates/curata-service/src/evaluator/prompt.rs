use std::path::Path;

use serde::Deserialize;
use tracing::warn;

pub const REJECTED_CATEGORY: &str = "Rejected";

/// Default category assigned when the model picks a label outside the
/// active set but still judges the link on-topic.
pub const FALLBACK_COHERENT_CATEGORY: &str = "Digital Democracy";

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Digital Democracy",
    "Participation",
    "Elections & Integrity",
    "Digital Participation",
    "Civic Tech",
    "GovTech",
    "Innovation in Governance",
    "Future of Politics",
    "Policy Innovation",
    "Public Sector AI",
    "Open Government & Transparency",
    "Public Procurement & Gov Ops",
    "Civic Data & Open Data",
    "Deliberation & Dialogue",
    "Disinformation & Media Literacy",
    "Digital Rights & Privacy",
    "AI Policy & Regulation",
    "Public Services & Welfare",
    "Smart Cities & Urban Gov",
    "Platform Governance",
    "International Institutions",
    "Local Government",
    "Research",
    "Funding",
    "Europe",
    "USA",
    "Rejected",
];

const DEFAULT_TEMPLATE: &str = "\
You are a strict curator for a platform about digital democracy, civic tech, gov tech, innovation in governance, public sector technology, and the future of politics.

Evaluate the link and respond ONLY with JSON.

Rules:
- If it is unrelated to the domain above, set coherent=false and category=\"Rejected\".
- If coherent=true, choose exactly one category from this list: {{categories}}.
- Always provide a concise reason.
- Provide a category_reason explaining why that category fits more than others.
- Provide a short title if possible.

Input:
URL: {{url}}
Title: {{title}}
Source: {{source}}

Return JSON with keys: coherent (boolean), category (string), reason (string), category_reason (string), title (string).";

/// Operator-overridable prompt configuration: a template with
/// `{{categories}}`, `{{url}}`, `{{title}}` and `{{source}}`
/// placeholders, plus an explicit category list.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
    pub template: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        PromptConfig {
            template: DEFAULT_TEMPLATE.to_string(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl PromptConfig {
    /// Load the override document when present and non-empty, otherwise
    /// the built-in default. Read at evaluation time so operators can
    /// change it without a restart.
    pub fn load(override_path: Option<&Path>) -> Self {
        let Some(path) = override_path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(raw) if !raw.trim().is_empty() => match toml::from_str::<PromptConfig>(&raw) {
                Ok(config) => config.with_required_categories(),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Invalid prompt config, using default");
                    Self::default()
                }
            },
            // Absent or blank override is the normal case.
            _ => Self::default(),
        }
    }

    fn with_required_categories(mut self) -> Self {
        if self.categories.is_empty() {
            self.categories = DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect();
        }
        if !self.categories.iter().any(|c| c == REJECTED_CATEGORY) {
            self.categories.push(REJECTED_CATEGORY.to_string());
        }
        self
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    pub fn build_prompt(&self, url: &str, title: Option<&str>, source: &str) -> String {
        let selectable = self
            .categories
            .iter()
            .filter(|c| c.as_str() != REJECTED_CATEGORY)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");

        self.template
            .replace("{{categories}}", &selectable)
            .replace("{{url}}", url)
            .replace("{{title}}", title.filter(|t| !t.is_empty()).unwrap_or("(unknown)"))
            .replace("{{source}}", source)
    }
}
