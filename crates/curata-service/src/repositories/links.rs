use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use super::traits::{InsertOutcome, LinkRepository};
use crate::errors::StoreError;
use crate::models::{LinkEntry, LinkRow};
use crate::schema::link_entries;

#[derive(Clone)]
pub struct SqliteLinkRepository {
    db: Arc<Mutex<SqliteConnection>>,
}

impl SqliteLinkRepository {
    pub fn new(db: Arc<Mutex<SqliteConnection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LinkRepository for SqliteLinkRepository {
    async fn find_by_normalized(&self, key: &str) -> Result<Option<LinkEntry>, StoreError> {
        let mut conn = self.db.lock().unwrap();
        let row = link_entries::table
            .filter(link_entries::normalized_url.eq(key))
            .first::<LinkRow>(&mut *conn)
            .optional()?;
        Ok(row.map(LinkEntry::from))
    }

    async fn insert(&self, entry: LinkEntry) -> Result<InsertOutcome, StoreError> {
        let mut conn = self.db.lock().unwrap();

        // Re-check immediately before insertion; first write wins.
        let existing = link_entries::table
            .filter(link_entries::normalized_url.eq(&entry.normalized_url))
            .first::<LinkRow>(&mut *conn)
            .optional()?;

        if let Some(row) = existing {
            return Ok(InsertOutcome {
                entry: LinkEntry::from(row),
                is_duplicate: true,
            });
        }

        let row = LinkRow::from(&entry);
        diesel::insert_into(link_entries::table)
            .values(&row)
            .execute(&mut *conn)?;

        Ok(InsertOutcome {
            entry,
            is_duplicate: false,
        })
    }

    async fn list(&self, limit: Option<i64>) -> Result<Vec<LinkEntry>, StoreError> {
        let mut conn = self.db.lock().unwrap();
        let mut query = link_entries::table
            .order((
                link_entries::created_at.desc(),
                link_entries::id.desc(),
            ))
            .into_boxed();

        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let rows = query.load::<LinkRow>(&mut *conn)?;
        Ok(rows.into_iter().map(LinkEntry::from).collect())
    }
}
