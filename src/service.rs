//! HTTP client for the publishing service.
//!
//! Thin wrapper: one POST per call, bearer-authenticated per author, with
//! HTTP 409 recognized as the duplicate-content condition. All scheduling
//! and idempotency decisions live in `publish`.

use jiff::Timestamp;
use serde::Deserialize;

use crate::config::ServiceConfig;
use crate::model::Author;
use crate::publish::{PostingService, Receipt, ServiceError};

pub struct HttpService {
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct PostResponse {
    id: String,
    created_at: Option<String>,
}

impl HttpService {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl PostingService for HttpService {
    fn post(
        &self,
        author: &Author,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<Receipt, ServiceError> {
        let body = serde_json::json!({
            "text": text,
            "in_reply_to": reply_to,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &author.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|e| ServiceError::Failed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(ServiceError::Duplicate);
        }
        if !response.status().is_success() {
            return Err(ServiceError::Failed(format!("HTTP {}", response.status())));
        }

        let parsed: PostResponse = response
            .json()
            .map_err(|e| ServiceError::Failed(e.to_string()))?;
        let created_at = parsed
            .created_at
            .and_then(|s| s.parse::<Timestamp>().ok())
            .unwrap_or_else(Timestamp::now);

        Ok(Receipt {
            external_id: parsed.id,
            created_at,
        })
    }
}
