use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use rss::{ChannelBuilder, GuidBuilder, ItemBuilder};
use tracing::{debug, instrument};

use crate::AppState;
use crate::errors::ApiError;
use crate::models::LinkEntry;

const CHANNEL_TITLE: &str = "Curata";
const CHANNEL_DESCRIPTION: &str = "Curated links that passed evaluation";
const EXPORT_LIMIT: i64 = 100;

fn build_channel(entries: &[LinkEntry]) -> rss::Channel {
    let items: Vec<rss::Item> = entries
        .iter()
        .map(|entry| {
            ItemBuilder::default()
                .title(entry.title.clone())
                .link(entry.url.clone())
                .description(entry.reason.clone())
                .guid(
                    GuidBuilder::default()
                        .value(entry.id.clone())
                        .permalink(false)
                        .build(),
                )
                .pub_date(entry.created_at.and_utc().to_rfc2822())
                .build()
        })
        .collect();

    ChannelBuilder::default()
        .title(CHANNEL_TITLE)
        .description(CHANNEL_DESCRIPTION)
        .link("")
        .last_build_date(Utc::now().to_rfc2822())
        .items(items)
        .build()
}

/// Syndication feed of accepted entries, newest first. Incoherent and
/// rejected links are ledger-only and never appear here.
#[instrument(skip_all)]
pub async fn feed_xml<S: AppState>(State(state): State<S>) -> Result<Response, ApiError> {
    let entries: Vec<LinkEntry> = state
        .links()
        .list(Some(EXPORT_LIMIT))
        .await?
        .into_iter()
        .filter(|entry| entry.coherent)
        .collect();

    debug!(count = entries.len(), "Exporting syndication feed");

    let channel = build_channel(&entries);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")],
        channel.to_string(),
    )
        .into_response())
}
