use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;

#[derive(Parser)]
#[command(name = "curata")]
#[command(about = "A CLI for the Curata link curation service")]
struct Cli {
    /// Base URL for the Curata service
    #[arg(long, default_value = "http://localhost:3100")]
    service_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a link (or a feed URL) for ingestion
    Add {
        /// URL to submit
        url: String,
    },
    /// List processed link entries, newest first
    List {
        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show submissions deferred for retry
    Queue,
    /// Drop a deferred submission by ID
    Unqueue {
        /// Queue item ID
        id: String,
    },
    /// List registered RSS feeds
    Feeds,
}

#[derive(Serialize)]
struct SubmitRequest {
    url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Add { url } => add_link(&client, &cli.service_url, url).await?,
        Commands::List { limit } => list_links(&client, &cli.service_url, limit).await?,
        Commands::Queue => list_queue(&client, &cli.service_url).await?,
        Commands::Unqueue { id } => unqueue(&client, &cli.service_url, id).await?,
        Commands::Feeds => list_feeds(&client, &cli.service_url).await?,
    }

    Ok(())
}

async fn add_link(client: &Client, service_url: &str, url: String) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/links");

    let response = client
        .post(&endpoint)
        .json(&SubmitRequest { url })
        .send()
        .await?;

    let status = response.status();
    let body: Value = response.json().await?;

    if !status.is_success() && status.as_u16() != 202 {
        eprintln!("Submission failed ({status}): {body}");
        return Ok(());
    }

    if body.get("feed_title").is_some() {
        println!(
            "Registered feed \"{}\": {} imported, {} duplicates",
            body["feed_title"].as_str().unwrap_or(""),
            body["imported"],
            body["duplicates"]
        );
    } else if body.get("queued").is_some() {
        println!(
            "Evaluation unavailable right now; queued for retry as {}",
            body["item"]["id"]
        );
    } else if body["is_duplicate"].as_bool().unwrap_or(false) {
        println!("Already collected as {}", body["entry"]["id"]);
    } else {
        println!(
            "Added {} [{}] as {}",
            body["entry"]["title"], body["entry"]["category"], body["entry"]["id"]
        );
    }

    Ok(())
}

async fn list_links(
    client: &Client,
    service_url: &str,
    limit: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let mut endpoint = format!("{service_url}/api/v1/links");
    if let Some(limit) = limit {
        endpoint.push_str(&format!("?limit={limit}"));
    }

    let response = client.get(&endpoint).send().await?;
    if !response.status().is_success() {
        eprintln!("Failed to list links: {}", response.status());
        return Ok(());
    }

    let entries: Vec<Value> = response.json().await?;
    for entry in entries {
        println!(
            "{}  [{}]  {}  {}",
            entry["created_at"].as_str().unwrap_or(""),
            entry["category"].as_str().unwrap_or(""),
            entry["title"].as_str().unwrap_or(""),
            entry["url"].as_str().unwrap_or("")
        );
    }

    Ok(())
}

async fn list_queue(client: &Client, service_url: &str) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/queue");

    let response = client.get(&endpoint).send().await?;
    if !response.status().is_success() {
        eprintln!("Failed to list queue: {}", response.status());
        return Ok(());
    }

    let items: Vec<Value> = response.json().await?;
    if items.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }
    for item in items {
        println!(
            "{}  attempts={}  {}  ({})",
            item["id"].as_str().unwrap_or(""),
            item["attempts"],
            item["url"].as_str().unwrap_or(""),
            item["last_error"].as_str().unwrap_or("")
        );
    }

    Ok(())
}

async fn unqueue(client: &Client, service_url: &str, id: String) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/queue/{id}");

    let response = client.delete(&endpoint).send().await?;
    if response.status().is_success() {
        println!("Removed {id} from the queue");
    } else {
        eprintln!("Failed to remove {id}: {}", response.status());
    }

    Ok(())
}

async fn list_feeds(client: &Client, service_url: &str) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/feeds");

    let response = client.get(&endpoint).send().await?;
    if !response.status().is_success() {
        eprintln!("Failed to list feeds: {}", response.status());
        return Ok(());
    }

    let feeds: Vec<Value> = response.json().await?;
    for feed in feeds {
        println!(
            "{}  {}",
            feed["url"].as_str().unwrap_or(""),
            feed["title"].as_str().unwrap_or("")
        );
    }

    Ok(())
}
