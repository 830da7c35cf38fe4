//! # Search Tools
//!
//! Retrieval tools handed to the literature-search worker: a general web
//! search over SearXNG (science category) and PubMed via NCBI E-utilities.

use radkit::macros::tool;
use radkit::tools::ToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const USER_AGENT: &str = "evidence-loop/0.1";

/// Arguments for literature web search
#[derive(Deserialize, JsonSchema)]
pub struct SearchLiteratureArgs {
    /// Search query
    pub query: String,
    /// Maximum number of results (default: 8)
    pub max_results: Option<u32>,
}

/// Search the web for scientific literature
#[tool(
    description = "Search the web (science sources) for medical literature. Returns titles, URLs and snippets."
)]
pub async fn search_literature(args: SearchLiteratureArgs) -> ToolResult {
    let max_results = args.max_results.unwrap_or(8);

    match try_searxng(&args.query, max_results).await {
        Some(results) => ToolResult::success(json!({
            "query": args.query,
            "source": "searxng",
            "results": results
        })),
        None => ToolResult::success(json!({
            "query": args.query,
            "source": "none",
            "results": [],
            "message": "No web search backend reachable. Set SEARXNG_URL to a SearXNG instance."
        })),
    }
}

async fn try_searxng(query: &str, max_results: u32) -> Option<Vec<Value>> {
    let mut endpoints: Vec<String> = Vec::new();

    if let Ok(custom_url) = std::env::var("SEARXNG_URL") {
        endpoints.push(format!("{}/search", custom_url.trim_end_matches('/')));
    }
    endpoints.push("http://localhost:8888/search".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .ok()?;

    for endpoint in endpoints {
        let url = format!(
            "{}?q={}&format=json&categories=science",
            endpoint,
            urlencoding::encode(query)
        );

        let Ok(response) = client.get(&url).send().await else {
            tracing::debug!(%endpoint, "SearXNG endpoint unreachable");
            continue;
        };
        let Ok(body) = response.json::<Value>().await else {
            continue;
        };
        if let Some(results) = body.get("results").and_then(Value::as_array) {
            return Some(
                results
                    .iter()
                    .take(max_results as usize)
                    .map(|r| {
                        json!({
                            "title": r.get("title").and_then(Value::as_str).unwrap_or(""),
                            "url": r.get("url").and_then(Value::as_str).unwrap_or(""),
                            "snippet": r.get("content").and_then(Value::as_str).unwrap_or(""),
                            "published": r.get("publishedDate").and_then(Value::as_str),
                        })
                    })
                    .collect(),
            );
        }
    }

    None
}

/// Arguments for PubMed search
#[derive(Deserialize, JsonSchema)]
pub struct SearchPubmedArgs {
    /// PubMed query (supports field tags such as [tiab] and date ranges)
    pub query: String,
    /// Maximum number of records (default: 10)
    pub max_results: Option<u32>,
}

/// Search PubMed and return bibliographic summaries
#[tool(
    description = "Search PubMed. Returns title, authors, year, journal, PMID and DOI for each matching record."
)]
pub async fn search_pubmed(args: SearchPubmedArgs) -> ToolResult {
    let max_results = args.max_results.unwrap_or(10).min(50);

    let client = match reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(15))
        .build()
    {
        Ok(c) => c,
        Err(e) => return ToolResult::error(format!("Failed to create HTTP client: {}", e)),
    };

    let search_url = format!(
        "{}/esearch.fcgi?db=pubmed&retmode=json&sort=relevance&retmax={}&term={}",
        EUTILS_BASE,
        max_results,
        urlencoding::encode(&args.query)
    );

    let ids = match fetch_json(&client, &search_url).await {
        Ok(body) => body
            .pointer("/esearchresult/idlist")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
        Err(e) => return ToolResult::error(format!("PubMed search failed: {}", e)),
    };

    if ids.is_empty() {
        return ToolResult::success(json!({ "query": args.query, "papers": [] }));
    }

    let summary_url = format!(
        "{}/esummary.fcgi?db=pubmed&retmode=json&id={}",
        EUTILS_BASE,
        ids.join(",")
    );

    match fetch_json(&client, &summary_url).await {
        Ok(body) => {
            let papers: Vec<Value> = ids
                .iter()
                .filter_map(|id| body.pointer(&format!("/result/{}", id)))
                .map(summary_to_paper)
                .collect();
            ToolResult::success(json!({ "query": args.query, "papers": papers }))
        }
        Err(e) => ToolResult::error(format!("PubMed summary failed: {}", e)),
    }
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> anyhow::Result<Value> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json::<Value>().await?)
}

/// Map one esummary record to the paper shape the normalizer expects
fn summary_to_paper(record: &Value) -> Value {
    let text = |key: &str| record.get(key).and_then(Value::as_str).unwrap_or("");

    let authors: Vec<&str> = record
        .get("authors")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let doi = record
        .get("articleids")
        .and_then(Value::as_array)
        .and_then(|ids| {
            ids.iter().find(|id| id.get("idtype").and_then(Value::as_str) == Some("doi"))
        })
        .and_then(|id| id.get("value").and_then(Value::as_str))
        .unwrap_or("");

    let journal = match text("fulljournalname") {
        "" => text("source"),
        name => name,
    };

    json!({
        "title": text("title").trim_end_matches('.'),
        "authors": authors,
        "year": text("pubdate").get(..4).unwrap_or(""),
        "journal": journal,
        "pmid": text("uid"),
        "doi": doi,
        "type": record
            .get("pubtype")
            .and_then(Value::as_array)
            .and_then(|types| types.first())
            .and_then(Value::as_str),
    })
}
