//! Gemini remark generator
//!
//! Calls the Gemini `generateContent` REST endpoint to write a short
//! performance remark from an attendance summary.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ports::{GeneratedRemark, RemarkGenerator};

const GEMINI_PRODUCTION_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable to override the API base URL (for testing)
pub const REMARK_BASE_URL_ENV: &str = "ROLLCALL_REMARK_BASE_URL";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const NO_API_KEY_REMARK: &str = "API Key not configured. Could not generate remark.";
pub const API_ERROR_REMARK: &str = "Could not generate remark due to an API error.";

const TEMPERATURE: f32 = 0.5;
const TOP_P: f32 = 0.95;
const TOP_K: u32 = 64;

/// Request timeout for remark generation
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Get the API base URL, checking environment variable first
pub fn get_base_url() -> String {
    std::env::var(REMARK_BASE_URL_ENV).unwrap_or_else(|_| GEMINI_PRODUCTION_URL.to_string())
}

// Request / response bodies

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

impl GenerateResponse {
    /// Text of the first candidate; empty when the model returned none
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Build the prompt sent to the model
pub fn build_prompt(group_name: &str, member_name: &str, summary: &str) -> String {
    format!(
        "As a manager for the '{}' group, write a concise and professional performance remark \
         (1-2 sentences) for a member named {}. Be encouraging but factual based on their \
         attendance. The summary is: \"{}\"",
        group_name, member_name, summary
    )
}

/// Remark generator backed by the Gemini REST API
#[derive(Debug)]
pub struct GeminiRemarkGenerator {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    group_name: String,
}

impl GeminiRemarkGenerator {
    pub fn new(api_key: Option<String>, model: &str, group_name: &str) -> Result<Self> {
        Self::new_with_base_url(api_key, model, group_name, &get_base_url())
    }

    pub fn new_with_base_url(
        api_key: Option<String>,
        model: &str,
        group_name: &str,
        base_url: &str,
    ) -> Result<Self> {
        Url::parse(base_url).with_context(|| format!("Invalid remark API URL: {}", base_url))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            group_name: group_name.to_string(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Request a remark, surfacing every failure
    pub fn request_remark(&self, api_key: &str, member_name: &str, summary: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(build_prompt(&self.group_name, member_name, summary)),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                top_p: TOP_P,
                top_k: TOP_K,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Remark API error: HTTP {}", status.as_u16());
        }

        let parsed: GenerateResponse = response
            .json()
            .context("Failed to parse remark response")?;
        Ok(parsed.text())
    }
}

impl RemarkGenerator for GeminiRemarkGenerator {
    fn generate(&self, member_name: &str, summary: &str) -> GeneratedRemark {
        let Some(api_key) = self.api_key.as_deref() else {
            return GeneratedRemark::fallback(NO_API_KEY_REMARK, "Remark API key not configured");
        };

        match self.request_remark(api_key, member_name, summary) {
            Ok(text) => GeneratedRemark::generated(text),
            Err(e) => GeneratedRemark::fallback(API_ERROR_REMARK, e.to_string()),
        }
    }
}

fn map_request_error(error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        anyhow::anyhow!("Remark request timed out after {} seconds", REQUEST_TIMEOUT_SECS)
    } else if error.is_connect() {
        anyhow::anyhow!("Unable to connect to the remark API")
    } else {
        anyhow::anyhow!("Remark request failed: {}", error)
    }
}
