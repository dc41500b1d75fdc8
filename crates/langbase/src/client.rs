use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("langbase api key is not configured")]
    MissingApiKey,
    #[error("could not build http client: {0}")]
    Client(String),
}

/// Failure of one HTTP exchange, before it is mapped into a capability error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum HttpFailure {
    Timeout,
    Transport(String),
    Status { status: u16, message: String },
    Decode(String),
}

impl HttpFailure {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Authenticated JSON client for the Langbase REST API.
#[derive(Clone)]
pub struct LangbaseClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    timeout: Duration,
}

impl LangbaseClient {
    pub fn new(base_url: &str, api_key: SecretString, timeout: Duration) -> Result<Self, LangbaseError> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(LangbaseError::MissingApiKey);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LangbaseError::Client(error.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), api_key, timeout })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, HttpFailure>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(HttpFailure::from_reqwest)?;
        read_json(response).await
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, HttpFailure> {
    let response = ensure_success(response).await?;
    response.json::<T>().await.map_err(|error| HttpFailure::Decode(error.to_string()))
}

pub(crate) async fn ensure_success(response: Response) -> Result<Response, HttpFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HttpFailure::Status { status: status.as_u16(), message: error_message(&body) })
}

pub(crate) fn send_error(error: reqwest::Error) -> HttpFailure {
    HttpFailure::from_reqwest(error)
}

/// Pulls a readable message out of `{"error": {"message": ...}}`, `{"message": ...}` or raw text.
pub(crate) fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match message {
        Some(message) => message,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().chars().take(300).collect(),
    }
}
