//! storefront-cli: terminal client for the Storefront HTTP API
//!
//! # Subcommands
//! - `search <query> [-n <limit>] [--json]`  ask the shopping assistant
//! - `products [filters] [--json]`            browse the catalog
//! - `product <id> [--json]`                  show one product
//! - `status`                                 show server health
//! - `sync`                                   reload the catalog from the feed

use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_LIMIT: i64 = 10;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "storefront-cli",
    version,
    about = "Storefront catalog browser and shopping-assistant search"
)]
struct Cli {
    /// Storefront HTTP server URL (overrides STOREFRONT_HTTP_URL env var)
    #[arg(long, env = "STOREFRONT_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ask the shopping assistant for products
    Search {
        /// What you are looking for
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: i64,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List catalog products
    Products {
        #[command(flatten)]
        filters: ProductFilters,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show a single product
    Product {
        id: i64,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show Storefront server status
    Status,

    /// Replace the catalog from the product feed
    Sync,
}

#[derive(Debug, Default, clap::Args)]
struct ProductFilters {
    /// Substring of title or description
    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    min_price: Option<f64>,

    #[arg(long)]
    max_price: Option<f64>,

    /// price_asc, price_desc or rating
    #[arg(long)]
    sort: Option<String>,

    #[arg(long)]
    page: Option<i64>,

    #[arg(long)]
    limit: Option<i64>,
}

impl ProductFilters {
    /// Query-string pairs for GET /api/products; unset filters are omitted.
    fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(v) = &self.search {
            params.push(("search", v.clone()));
        }
        if let Some(v) = &self.category {
            params.push(("category", v.clone()));
        }
        if let Some(v) = self.min_price {
            params.push(("min_price", v.to_string()));
        }
        if let Some(v) = self.max_price {
            params.push(("max_price", v.to_string()));
        }
        if let Some(v) = &self.sort {
            params.push(("sort", v.clone()));
        }
        if let Some(v) = self.page {
            params.push(("page", v.to_string()));
        }
        if let Some(v) = self.limit {
            params.push(("limit", v.to_string()));
        }
        params
    }
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    pub product_id: i64,
    pub title: String,
    pub price: f64,
    pub category: String,
    pub score: f32,
    pub summary: String,
}

/// Response of POST /api/ai/query
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub reply_text: String,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RatingView {
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProductView {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub rating: RatingView,
}

/// Response of GET /api/products
#[derive(Debug, Deserialize)]
pub struct ProductPageView {
    pub data: Vec<ProductView>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

// ============================================================================
// Output formatting
// ============================================================================

pub fn format_search(resp: &SearchResponse) -> String {
    let mut out = format!("{}\n", resp.reply_text);
    for (i, hit) in resp.results.iter().enumerate() {
        out.push_str(&format!(
            "\n{:>2}. {} (#{})\n    ${:.2} · {} · match {:.0}%\n",
            i + 1,
            hit.title,
            hit.product_id,
            hit.price,
            hit.category,
            hit.score * 100.0
        ));
    }
    out
}

pub fn format_product_line(p: &ProductView) -> String {
    let title: String = p.title.chars().take(60).collect();
    format!(
        "#{:<4} {:<60} {:>9} {:>4.1}★ ({})",
        p.id,
        title,
        format!("${:.2}", p.price),
        p.rating.rate,
        p.category
    )
}

pub fn format_product_page(page: &ProductPageView) -> String {
    if page.data.is_empty() {
        return "No products found".to_string();
    }
    let mut out: Vec<String> = page.data.iter().map(format_product_line).collect();
    out.push(format!(
        "Page {} of {} ({} products)",
        page.page, page.pages, page.total
    ));
    out.join("\n")
}

pub fn format_product_detail(p: &ProductView) -> String {
    format!(
        "{} (#{})\nCategory: {}\nPrice:    ${:.2}\nRating:   {:.1} ({} reviews)\n\n{}",
        p.title, p.id, p.category, p.price, p.rating.rate, p.rating.count, p.description
    )
}

pub fn format_status(body: &serde_json::Value) -> String {
    let embedding = match (
        body["embedding"]["available"].as_bool(),
        body["embedding"]["backend"].as_str(),
    ) {
        (Some(true), Some(backend)) => backend.to_string(),
        _ => "unavailable".to_string(),
    };
    [
        format!("Storefront server: {}", body["status"].as_str().unwrap_or("unknown")),
        format!("Version:           {}", body["version"].as_str().unwrap_or("?")),
        format!("Database:          {}", body["database"].as_str().unwrap_or("?")),
        format!("Embedding model:   {}", embedding),
        format!("Catalog version:   {}", body["catalog_version"]),
    ]
    .join("\n")
}

/// Pull the server's error message out of a non-2xx body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn read_json(resp: reqwest::blocking::Response, url: &str) -> anyhow::Result<serde_json::Value> {
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        bail!("server returned {} for {}: {}", status, url, error_message(&body));
    }
    serde_json::from_str(&body).with_context(|| format!("invalid JSON from {}", url))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn do_search(server: &str, query: &str, limit: i64, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/ai/query", server);
    let resp = client(30)?
        .post(&url)
        .json(&serde_json::json!({ "query": query, "limit": limit }))
        .send()
        .with_context(|| format!("connection failed to {}", url))?;
    let body = read_json(resp, &url)?;

    if json_output {
        return print_json(&body);
    }
    let parsed: SearchResponse = serde_json::from_value(body)?;
    print!("{}", format_search(&parsed));
    Ok(())
}

fn do_products(server: &str, filters: &ProductFilters, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/products", server);
    let resp = client(30)?
        .get(&url)
        .query(&filters.query_params())
        .send()
        .with_context(|| format!("connection failed to {}", url))?;
    let body = read_json(resp, &url)?;

    if json_output {
        return print_json(&body);
    }
    let page: ProductPageView = serde_json::from_value(body)?;
    println!("{}", format_product_page(&page));
    Ok(())
}

fn do_product(server: &str, id: i64, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/products/{}", server, id);
    let resp = client(30)?
        .get(&url)
        .send()
        .with_context(|| format!("connection failed to {}", url))?;
    let body = read_json(resp, &url)?;

    if json_output {
        return print_json(&body);
    }
    let product: ProductView = serde_json::from_value(body)?;
    println!("{}", format_product_detail(&product));
    Ok(())
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/health", server);
    let resp = client(10)?
        .get(&url)
        .send()
        .with_context(|| format!("cannot reach {}", url))?;
    let body = read_json(resp, &url)?;
    println!("{}", format_status(&body));
    Ok(())
}

fn do_sync(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/admin/sync-products", server);
    // The feed fetch can take a while on a cold server.
    let resp = client(120)?
        .post(&url)
        .send()
        .with_context(|| format!("connection failed to {}", url))?;
    let body = read_json(resp, &url)?;
    println!("{}", body["message"].as_str().unwrap_or("Sync complete"));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Search { query, limit, json } => do_search(&server, &query, limit, json),
        Commands::Products { filters, json } => do_products(&server, &filters, json),
        Commands::Product { id, json } => do_product(&server, id, json),
        Commands::Status => do_status(&server),
        Commands::Sync => do_sync(&server),
    };

    if let Err(e) = result {
        eprintln!("storefront-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
