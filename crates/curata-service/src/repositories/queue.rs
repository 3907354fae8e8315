use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use super::traits::{EnqueueOutcome, QueueRepository};
use crate::errors::StoreError;
use crate::models::{NewQueueItem, QueueItem, QueueRow, encode_meta, generate_id};
use crate::normalize::normalize_url;
use crate::schema::queue_items;

#[derive(Clone)]
pub struct SqliteQueueRepository {
    db: Arc<Mutex<SqliteConnection>>,
}

impl SqliteQueueRepository {
    pub fn new(db: Arc<Mutex<SqliteConnection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn enqueue(&self, item: NewQueueItem) -> Result<EnqueueOutcome, StoreError> {
        let mut conn = self.db.lock().unwrap();
        let normalized = normalize_url(&item.url);

        let existing = queue_items::table
            .filter(queue_items::normalized_url.eq(&normalized))
            .first::<QueueRow>(&mut *conn)
            .optional()?;

        if let Some(row) = existing {
            return Ok(EnqueueOutcome {
                item: QueueItem::from(row),
                already_queued: true,
            });
        }

        let row = QueueRow {
            id: generate_id(),
            url: item.url,
            normalized_url: normalized,
            source: item.source.as_str().to_string(),
            source_meta: encode_meta(&item.source_meta),
            attempts: 0,
            last_error: item.last_error,
            created_at: Utc::now().naive_utc(),
            last_attempt_at: None,
        };

        diesel::insert_into(queue_items::table)
            .values(&row)
            .execute(&mut *conn)?;

        Ok(EnqueueOutcome {
            item: QueueItem::from(row),
            already_queued: false,
        })
    }

    async fn record_attempt(
        &self,
        id: &str,
        error: &str,
    ) -> Result<Option<QueueItem>, StoreError> {
        let mut conn = self.db.lock().unwrap();

        diesel::update(queue_items::table.find(id))
            .set((
                queue_items::attempts.eq(queue_items::attempts + 1),
                queue_items::last_error.eq(error),
                queue_items::last_attempt_at.eq(Some(Utc::now().naive_utc())),
            ))
            .execute(&mut *conn)?;

        let row = queue_items::table
            .find(id)
            .first::<QueueRow>(&mut *conn)
            .optional()?;
        Ok(row.map(QueueItem::from))
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.db.lock().unwrap();
        let deleted = diesel::delete(queue_items::table.find(id)).execute(&mut *conn)?;
        Ok(deleted > 0)
    }

    async fn list(&self) -> Result<Vec<QueueItem>, StoreError> {
        let mut conn = self.db.lock().unwrap();
        let rows = queue_items::table
            .order(queue_items::created_at.asc())
            .load::<QueueRow>(&mut *conn)?;
        Ok(rows.into_iter().map(QueueItem::from).collect())
    }
}
