use std::fmt;

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Provenance channel of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    User,
    Telegram,
    Rss,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::User => "user",
            Source::Telegram => "telegram",
            Source::Rss => "rss",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Source::User),
            "telegram" => Some(Source::Telegram),
            "rss" => Some(Source::Rss),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured provenance attached to a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_chat_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_title: Option<String>,
}

impl SourceMeta {
    pub fn for_feed(title: &str) -> Option<Self> {
        if title.is_empty() {
            return None;
        }
        Some(SourceMeta {
            feed_title: Some(title.to_string()),
            ..SourceMeta::default()
        })
    }
}

/// The durable artifact of a processed URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkEntry {
    pub id: String,
    pub url: String,
    pub normalized_url: String,
    pub title: String,
    pub image: String,
    pub coherent: bool,
    pub category: String,
    pub reason: String,
    pub category_reason: String,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_meta: Option<SourceMeta>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::link_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LinkRow {
    pub id: String,
    pub url: String,
    pub normalized_url: String,
    pub title: String,
    pub image: String,
    pub coherent: bool,
    pub category: String,
    pub reason: String,
    pub category_reason: String,
    pub source: String,
    pub source_meta: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<&LinkEntry> for LinkRow {
    fn from(entry: &LinkEntry) -> Self {
        LinkRow {
            id: entry.id.clone(),
            url: entry.url.clone(),
            normalized_url: entry.normalized_url.clone(),
            title: entry.title.clone(),
            image: entry.image.clone(),
            coherent: entry.coherent,
            category: entry.category.clone(),
            reason: entry.reason.clone(),
            category_reason: entry.category_reason.clone(),
            source: entry.source.as_str().to_string(),
            source_meta: encode_meta(&entry.source_meta),
            created_at: entry.created_at,
        }
    }
}

impl From<LinkRow> for LinkEntry {
    fn from(row: LinkRow) -> Self {
        LinkEntry {
            id: row.id,
            url: row.url,
            normalized_url: row.normalized_url,
            title: row.title,
            image: row.image,
            coherent: row.coherent,
            category: row.category,
            reason: row.reason,
            category_reason: row.category_reason,
            // The column only ever holds values produced by Source::as_str.
            source: Source::parse(&row.source).unwrap_or(Source::User),
            source_meta: decode_meta(row.source_meta.as_deref()),
            created_at: row.created_at,
        }
    }
}

/// A submission held for later retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub url: String,
    pub normalized_url: String,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_meta: Option<SourceMeta>,
    pub attempts: i32,
    pub last_error: String,
    pub created_at: NaiveDateTime,
    pub last_attempt_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::queue_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QueueRow {
    pub id: String,
    pub url: String,
    pub normalized_url: String,
    pub source: String,
    pub source_meta: Option<String>,
    pub attempts: i32,
    pub last_error: String,
    pub created_at: NaiveDateTime,
    pub last_attempt_at: Option<NaiveDateTime>,
}

impl From<QueueRow> for QueueItem {
    fn from(row: QueueRow) -> Self {
        QueueItem {
            id: row.id,
            url: row.url,
            normalized_url: row.normalized_url,
            source: Source::parse(&row.source).unwrap_or(Source::User),
            source_meta: decode_meta(row.source_meta.as_deref()),
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            last_attempt_at: row.last_attempt_at,
        }
    }
}

/// Input for enqueueing a deferred submission.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub url: String,
    pub source: Source,
    pub source_meta: Option<SourceMeta>,
    pub last_error: String,
}

/// A feed the poller revisits on every cycle.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = crate::schema::feeds)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RegisteredFeed {
    pub url: String,
    pub title: String,
    pub added_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Opaque time-plus-random identifier for entries and queue items.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::random::<u32>() & 0x00ff_ffff;
    format!("{millis}-{suffix:06x}")
}

pub(crate) fn encode_meta(meta: &Option<SourceMeta>) -> Option<String> {
    meta.as_ref()
        .and_then(|m| serde_json::to_string(m).ok())
}

pub(crate) fn decode_meta(raw: Option<&str>) -> Option<SourceMeta> {
    raw.and_then(|text| serde_json::from_str(text).ok())
}
