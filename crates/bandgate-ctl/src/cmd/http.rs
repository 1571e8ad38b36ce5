//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result, bail};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str, token: Option<&str>) -> Result<T> {
    let request = authorize(reqwest::Client::new().get(url), token);
    parse(send(request, url).await?).await
}

pub async fn delete_json<T: for<'de> Deserialize<'de>>(
    url: &str,
    token: Option<&str>,
) -> Result<T> {
    let request = authorize(reqwest::Client::new().delete(url), token);
    parse(send(request, url).await?).await
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn send(request: RequestBuilder, url: &str) -> Result<Response> {
    let resp = request
        .send()
        .await
        .with_context(|| format!("failed to connect to bandgated at {}; is it running?", url))?;

    match resp.status() {
        StatusCode::FORBIDDEN => {
            bail!("bandgated refused the request: pass --token or set BANDGATE_ADMIN_TOKEN")
        }
        status if !status.is_success() => {
            let body = resp.text().await.unwrap_or_default();
            bail!("bandgated returned {}: {}", status, body)
        }
        _ => Ok(resp),
    }
}

async fn parse<T: for<'de> Deserialize<'de>>(resp: Response) -> Result<T> {
    resp.json::<T>().await.context("failed to parse response")
}
