use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::{info, warn};

use crate::settings::Settings;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const PAGE_TIMEOUT: Duration = Duration::from_secs(10);
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(600);
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

const NEWS_SYSTEM_PROMPT: &str = "You are an AI industry news analyst. Search the web for the latest \
     AI news and report it as a concise, accurate numbered list.";

pub struct Fetched {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub presence_penalty: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat request asking for the day's ten most recent AI news items.
pub fn news_request(model: &str, today: NaiveDate) -> ChatRequest {
    let date = today.format("%Y-%m-%d");
    let user = format!(
        "Search the web and compile the 10 most recent AI news items as of {date}. \
         Start the reply with the date {date}. Focus on OpenAI, Claude, Google and Grok. \
         Number each item and open it with a short bold headline. Keep items concise \
         and do not add any other explanation."
    );
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: NEWS_SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user,
            },
        ],
        max_tokens: 1200,
        temperature: 0.8,
        top_p: 1.0,
        presence_penalty: 1.0,
    }
}

pub fn client() -> Result<Client> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// GET the changelog page.
pub async fn fetch_page(client: &Client, url: &str) -> Result<Fetched> {
    send_with_retry(url, || client.get(url).timeout(PAGE_TIMEOUT)).await
}

/// POST the news request; the raw body is decoded by the caller.
pub async fn request_news(client: &Client, settings: &Settings, today: NaiveDate) -> Result<Fetched> {
    let api_key = settings
        .api_key
        .as_deref()
        .context("HARVEST_API_KEY environment variable must be set")?;
    let request = news_request(&settings.model, today);
    send_with_retry(&settings.api_url, || {
        client
            .post(&settings.api_url)
            .timeout(COMPLETION_TIMEOUT)
            .bearer_auth(api_key)
            .json(&request)
    })
    .await
}

fn should_retry(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

async fn send_with_retry<F>(label: &str, build: F) -> Result<Fetched>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let response = build()
            .send()
            .await
            .with_context(|| format!("request to {} failed", label))?;
        let status = response.status();

        if status.is_success() {
            let body = response
                .text()
                .await
                .with_context(|| format!("reading body from {}", label))?;
            info!(url = label, status = status.as_u16(), bytes = body.len(), "fetched");
            return Ok(Fetched {
                status: status.as_u16(),
                body,
            });
        }

        if !should_retry(status) || attempt == MAX_RETRIES {
            bail!("{} returned HTTP {}", label, status);
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "HTTP {} from {} (attempt {}/{}), backing off {:.1}s",
            status.as_u16(),
            label,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}
