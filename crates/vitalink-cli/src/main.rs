use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vitalink")]
#[command(about = "A CLI for the Vitalink link preview service")]
struct Cli {
    /// Base URL for the Vitalink service
    #[arg(long, default_value = "http://localhost:3000")]
    service_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a product preview for an Amazon link
    Preview {
        /// Amazon product or short link
        url: String,
    },
    /// Fetch metadata and the formatted description of a YouTube video
    Video {
        /// YouTube watch, short or embed URL
        url: String,
        /// Print the formatted description HTML instead of the metadata
        #[arg(long)]
        html: bool,
    },
    /// Replace Amazon links in a document with preview blocks
    Rewrite {
        /// File to rewrite; reads stdin when omitted
        file: Option<PathBuf>,
        /// Write the rewritten content back to the file
        #[arg(short, long, requires = "file")]
        in_place: bool,
    },
    /// List the Amazon links found in a document
    Links {
        /// File to scan; reads stdin when omitted
        file: Option<PathBuf>,
    },
    /// Inspect the product catalog
    Products {
        #[command(subcommand)]
        command: ProductCommands,
    },
}

#[derive(Subcommand)]
enum ProductCommands {
    /// List cataloged products, newest first
    List {
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(short, long)]
        offset: Option<u32>,
    },
    /// Show a single product by ASIN
    Get { asin: String },
}

#[derive(Serialize)]
struct PreviewRequest {
    url: String,
}

#[derive(Serialize)]
struct ContentRequest {
    content: String,
}

#[derive(Deserialize)]
struct RewriteOutcome {
    content: String,
    detected: usize,
    replaced: usize,
    cataloged: Vec<String>,
}

#[derive(Deserialize)]
struct DetectedLink {
    url: String,
    context: String,
}

#[derive(Deserialize)]
struct DetectLinksResponse {
    links: Vec<DetectedLink>,
}

#[derive(Deserialize)]
struct ProductSummary {
    asin: String,
    title: String,
    price: String,
}

#[derive(Deserialize)]
struct ListProductsResponse {
    items: Vec<ProductSummary>,
    total: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let service_url = cli.service_url.trim_end_matches('/');

    match cli.command {
        Commands::Preview { url } => preview(&client, service_url, url).await?,
        Commands::Video { url, html } => video(&client, service_url, &url, html).await?,
        Commands::Rewrite { file, in_place } => {
            rewrite(&client, service_url, file, in_place).await?
        }
        Commands::Links { file } => links(&client, service_url, file).await?,
        Commands::Products { command } => match command {
            ProductCommands::List { limit, offset } => {
                list_products(&client, service_url, limit, offset).await?
            }
            ProductCommands::Get { asin } => get_product(&client, service_url, &asin).await?,
        },
    }

    Ok(())
}

fn read_input(file: Option<&PathBuf>) -> Result<String, Box<dyn Error>> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// Passes successful responses through; anything else is reported and
/// turned into an error so the process exits non-zero.
async fn check(response: Response, action: &str) -> Result<Response, Box<dyn Error>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await?;
    if !body.is_empty() {
        eprintln!("Response: {body}");
    }
    Err(format!("Failed to {action}: {status}").into())
}

async fn preview(client: &Client, service_url: &str, url: String) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/previews");
    let response = client
        .post(&endpoint)
        .json(&PreviewRequest { url })
        .send()
        .await?;

    let response = check(response, "resolve preview").await?;
    let preview: Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}

async fn video(
    client: &Client,
    service_url: &str,
    url: &str,
    html: bool,
) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/videos");
    let response = client.get(&endpoint).query(&[("url", url)]).send().await?;

    let response = check(response, "fetch video").await?;
    let mut metadata: Value = response.json().await?;
    if html {
        if let Some(description) = metadata.get("description_html").and_then(Value::as_str) {
            println!("{description}");
        }
    } else {
        if let Some(object) = metadata.as_object_mut() {
            object.remove("description_html");
        }
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    }
    Ok(())
}

async fn rewrite(
    client: &Client,
    service_url: &str,
    file: Option<PathBuf>,
    in_place: bool,
) -> Result<(), Box<dyn Error>> {
    let content = read_input(file.as_ref())?;
    let endpoint = format!("{service_url}/api/v1/content/rewrite");
    let response = client
        .post(&endpoint)
        .json(&ContentRequest { content })
        .send()
        .await?;

    let response = check(response, "rewrite content").await?;
    let outcome: RewriteOutcome = response.json().await?;

    match file.filter(|_| in_place) {
        Some(path) => std::fs::write(&path, &outcome.content)?,
        None => print!("{}", outcome.content),
    }

    eprintln!(
        "Detected {} Amazon link(s), replaced {}, cataloged {} new product(s)",
        outcome.detected,
        outcome.replaced,
        outcome.cataloged.len()
    );
    Ok(())
}

async fn links(
    client: &Client,
    service_url: &str,
    file: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let content = read_input(file.as_ref())?;
    let endpoint = format!("{service_url}/api/v1/content/links");
    let response = client
        .post(&endpoint)
        .json(&ContentRequest { content })
        .send()
        .await?;

    let response = check(response, "detect links").await?;
    let detected: DetectLinksResponse = response.json().await?;
    if detected.links.is_empty() {
        println!("No Amazon links found");
    }
    for link in detected.links {
        println!("{}\t{}", link.url, link.context.replace('\n', " "));
    }
    Ok(())
}

async fn list_products(
    client: &Client,
    service_url: &str,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/products");
    let mut query = Vec::new();
    if let Some(limit) = limit {
        query.push(("limit", limit));
    }
    if let Some(offset) = offset {
        query.push(("offset", offset));
    }
    let response = client.get(&endpoint).query(&query).send().await?;

    let response = check(response, "list products").await?;
    let listing: ListProductsResponse = response.json().await?;
    for product in &listing.items {
        println!("{}\t{}\t{}", product.asin, product.price, product.title);
    }
    println!("Showing {} of {} product(s)", listing.items.len(), listing.total);
    Ok(())
}

async fn get_product(client: &Client, service_url: &str, asin: &str) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/products/{asin}");
    let response = client.get(&endpoint).send().await?;

    let response = check(response, "get product").await?;
    let product: Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&product)?);
    Ok(())
}
