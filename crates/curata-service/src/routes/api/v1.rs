use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::errors::ApiError;
use crate::models::{LinkEntry, NewQueueItem, QueueItem, RegisteredFeed, Source, SourceMeta};
use crate::pipeline::Submission;
use crate::{AppState, repositories::EnqueueOutcome};

#[derive(Debug, Deserialize)]
struct SubmitLinkRequest {
    url: String,
    source: Option<Source>,
    source_meta: Option<SourceMeta>,
}

#[derive(Debug, Serialize)]
struct LinkResponse {
    entry: LinkEntry,
    is_duplicate: bool,
}

#[derive(Debug, Serialize)]
struct FeedImportResponse {
    feed_title: String,
    imported: usize,
    duplicates: usize,
}

#[derive(Debug, Serialize)]
struct QueuedResponse {
    queued: bool,
    item: QueueItem,
}

#[derive(Debug, Deserialize)]
struct ListLinksQuery {
    limit: Option<i64>,
}

fn validate_submission_url(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("URL must not be empty".to_string()));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|_| ApiError::BadRequest("URL is not valid".to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ApiError::BadRequest(
            "URL must use http or https".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[instrument(skip_all, fields(url = %payload.url, source = ?payload.source))]
async fn submit_link<S: AppState>(
    State(state): State<S>,
    Json(payload): Json<SubmitLinkRequest>,
) -> Result<Response, ApiError> {
    let url = validate_submission_url(&payload.url)?;
    let source = payload.source.unwrap_or(Source::User);
    debug!("Processing link submission");

    // A submitted URL can be a feed rather than an article. Probe it
    // first; a successful parse registers the feed and imports its
    // current items in one shot.
    if let Some(ingest) = state.poller().ingest_feed(&url).await {
        let imported = ingest.outcomes.iter().filter(|o| !o.is_duplicate).count();
        let duplicates = ingest.outcomes.len() - imported;
        info!(
            feed_title = %ingest.feed_title,
            imported,
            duplicates,
            "Registered feed from submission"
        );
        return Ok(ResponseJson(FeedImportResponse {
            feed_title: ingest.feed_title,
            imported,
            duplicates,
        })
        .into_response());
    }

    let submission = Submission {
        url: url.clone(),
        source,
        source_meta: payload.source_meta.clone(),
    };

    match state.pipeline().process(submission).await {
        Ok(outcome) => {
            info!(
                id = %outcome.entry.id,
                is_duplicate = outcome.is_duplicate,
                "Link submission processed"
            );
            Ok(ResponseJson(LinkResponse {
                entry: outcome.entry,
                is_duplicate: outcome.is_duplicate,
            })
            .into_response())
        }
        Err(err) if err.is_transient() => {
            warn!(error = %err, "Transient failure, deferring to retry queue");
            let EnqueueOutcome {
                item,
                already_queued,
            } = state
                .queue()
                .enqueue(NewQueueItem {
                    url,
                    source,
                    source_meta: payload.source_meta,
                    last_error: err.to_string(),
                })
                .await?;
            if already_queued {
                debug!(id = %item.id, "Submission was already queued");
            }
            Ok((
                StatusCode::ACCEPTED,
                ResponseJson(QueuedResponse { queued: true, item }),
            )
                .into_response())
        }
        Err(err) => Err(err.into()),
    }
}

#[instrument(skip_all, fields(limit = ?query.limit))]
async fn list_links<S: AppState>(
    State(state): State<S>,
    Query(query): Query<ListLinksQuery>,
) -> Result<ResponseJson<Vec<LinkEntry>>, ApiError> {
    if let Some(limit) = query.limit
        && limit <= 0
    {
        return Err(ApiError::BadRequest(
            "limit must be a positive integer".to_string(),
        ));
    }

    let entries = state.links().list(query.limit).await?;
    debug!(count = entries.len(), "Listed link entries");
    Ok(ResponseJson(entries))
}

#[instrument(skip_all)]
async fn list_queue<S: AppState>(
    State(state): State<S>,
) -> Result<ResponseJson<Vec<QueueItem>>, ApiError> {
    let items = state.queue().list().await?;
    debug!(count = items.len(), "Listed queue items");
    Ok(ResponseJson(items))
}

#[instrument(skip_all, fields(id = %id))]
async fn delete_queue_item<S: AppState>(
    State(state): State<S>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state.queue().remove(&id).await?;
    if !removed {
        debug!("Queue item not found");
        return Err(ApiError::NotFound);
    }
    info!("Removed queue item");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
async fn list_feeds<S: AppState>(
    State(state): State<S>,
) -> Result<ResponseJson<Vec<RegisteredFeed>>, ApiError> {
    let feeds = state.feeds().list().await?;
    debug!(count = feeds.len(), "Listed registered feeds");
    Ok(ResponseJson(feeds))
}

pub fn create_api_v1_router<S: AppState>() -> Router<S> {
    Router::new()
        .route("/links", post(submit_link::<S>).get(list_links::<S>))
        .route("/queue", get(list_queue::<S>))
        .route("/queue/{id}", delete(delete_queue_item::<S>))
        .route("/feeds", get(list_feeds::<S>))
}
