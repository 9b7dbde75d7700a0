use super::html;
use super::text;
use crate::config::FetchConfig;
use crate::document::{ProcessDocument, Source};
use crate::error::{ProcflowError, Result};
use crate::types::SourceType;
use regex::Regex;
use reqwest::Url;
use std::sync::OnceLock;
use std::time::Duration;

static SCHEME_RE: OnceLock<Regex> = OnceLock::new();

fn scheme_re() -> &'static Regex {
    // Two or more characters so `C:\path` stays a file path.
    SCHEME_RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]+:").unwrap())
}

pub(super) fn has_scheme(input: &str) -> bool {
    scheme_re().is_match(input)
}

/// Accept only absolute `http`/`https` URLs with a host.
pub fn validate_url(input: &str) -> Result<Url> {
    let invalid = || ProcflowError::InvalidSource(input.trim().to_string());
    let url = Url::parse(input.trim()).map_err(|e| {
        tracing::debug!(input, error = %e, "unparseable url");
        invalid()
    })?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(url),
        other => {
            tracing::debug!(input, scheme = other, "rejected url");
            Err(invalid())
        }
    }
}

pub(super) fn parse_url(input: &str, cfg: &FetchConfig) -> Result<ProcessDocument> {
    let url = validate_url(input)?;
    let (body, is_html) = fetch(&url, cfg)?;

    let source = Source::new(SourceType::Url, url.as_str());
    if !is_html {
        return Ok(text::parse_text(&body, source, 1.0));
    }

    let page = html::strip_html(&body);
    let mut doc = text::parse_text(&page.text, source, 1.0);
    if doc.process_name.trim().is_empty() {
        if let Some(title) = page.title {
            doc.process_name = title;
        }
    }
    Ok(doc)
}

/// GET the page body; returns the body and whether it is markup.
fn fetch(url: &Url, cfg: &FetchConfig) -> Result<(String, bool)> {
    let network = |reason: String| ProcflowError::Network {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_seconds))
        .user_agent(cfg.user_agent.clone())
        .build()
        .map_err(|e| network(e.to_string()))?;

    tracing::debug!(url = %url, timeout = cfg.timeout_seconds, "fetching");
    let response = client
        .get(url.clone())
        .send()
        .map_err(|e| network(if e.is_timeout() {
            format!("timed out after {}s", cfg.timeout_seconds)
        } else {
            e.to_string()
        }))?;

    let status = response.status();
    if !status.is_success() {
        return Err(network(format!("HTTP {status}")));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    let body = response.text().map_err(|e| network(e.to_string()))?;
    let is_html = content_type.contains("html")
        || (content_type.is_empty() && body.trim_start().starts_with('<'));
    Ok((body, is_html))
}
