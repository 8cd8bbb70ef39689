use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{Level, event, instrument};

/// Non-success response, kept typed so callers can react to specific
/// statuses (a 409 on message post means the thread closed under us).
#[derive(Debug, Error)]
#[error("request failed with status {status}")]
pub struct StatusError {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// `base_url` is the service root, e.g. `http://localhost:5000/api`.
    pub fn new(base_url: &str, api_token: Option<&str>) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(token) = api_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        Client {
            http: reqwest::Client::builder()
                .default_headers(headers)
                .build()
                .expect("Failed to build http client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get<T>(&self, path: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(StatusError { status, body: text }.into());
        }
        event!(Level::DEBUG, response = %text);
        Ok(serde_json::from_str::<T>(&text)?)
    }

    #[instrument(level = "debug", skip(self, request))]
    pub async fn post<S, T>(&self, path: &str, request: &S) -> anyhow::Result<T>
    where
        S: Serialize + Sized,
        T: DeserializeOwned,
    {
        let response = self.http.post(self.url(path)).json(request).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(StatusError { status, body: text }.into());
        }
        event!(Level::DEBUG, response = %text);
        Ok(serde_json::from_str::<T>(&text)?)
    }

    /// GET returning the raw body, for binary payloads (reply speech audio).
    #[instrument(level = "debug", skip(self))]
    pub async fn get_bytes(&self, path: &str) -> anyhow::Result<Bytes> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StatusError { status, body }.into());
        }
        Ok(response.bytes().await?)
    }
}
