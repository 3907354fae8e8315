use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// One write-once row in the durable ledger. Mirrors a link entry plus
/// the unmodified model response text.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub source: String,
    pub url: String,
    pub title: String,
    pub image: String,
    pub coherent: bool,
    pub category: String,
    pub reason: String,
    pub category_reason: String,
    pub raw_ai: String,
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Audit serialization error: {0}")]
    Csv(#[from] csv::Error),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Append-only CSV file, independent of the queryable link store so it
/// survives a store reset. New columns must be additive.
pub struct CsvAuditLedger {
    path: PathBuf,
}

impl CsvAuditLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSink for CsvAuditLedger {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }
}
