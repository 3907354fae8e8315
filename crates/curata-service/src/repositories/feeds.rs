use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use super::traits::FeedRepository;
use crate::errors::StoreError;
use crate::models::RegisteredFeed;
use crate::schema::feeds;

#[derive(Clone)]
pub struct SqliteFeedRepository {
    db: Arc<Mutex<SqliteConnection>>,
}

impl SqliteFeedRepository {
    pub fn new(db: Arc<Mutex<SqliteConnection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeedRepository for SqliteFeedRepository {
    async fn upsert(&self, url: &str, title: &str) -> Result<RegisteredFeed, StoreError> {
        let mut conn = self.db.lock().unwrap();

        let existing = feeds::table
            .find(url)
            .first::<RegisteredFeed>(&mut *conn)
            .optional()?;

        if let Some(mut feed) = existing {
            if !title.is_empty() && feed.title != title {
                feed.title = title.to_string();
                feed.updated_at = Utc::now().naive_utc();
                diesel::update(feeds::table.find(url))
                    .set((
                        feeds::title.eq(&feed.title),
                        feeds::updated_at.eq(feed.updated_at),
                    ))
                    .execute(&mut *conn)?;
            }
            return Ok(feed);
        }

        let now = Utc::now().naive_utc();
        let feed = RegisteredFeed {
            url: url.to_string(),
            title: title.to_string(),
            added_at: now,
            updated_at: now,
        };
        diesel::insert_into(feeds::table)
            .values(&feed)
            .execute(&mut *conn)?;
        Ok(feed)
    }

    async fn list(&self) -> Result<Vec<RegisteredFeed>, StoreError> {
        let mut conn = self.db.lock().unwrap();
        let rows = feeds::table
            .order(feeds::added_at.asc())
            .load::<RegisteredFeed>(&mut *conn)?;
        Ok(rows)
    }
}
