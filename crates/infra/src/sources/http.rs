use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::FetchSettings;
use crate::retry::{RetryPolicy, retry};

use super::{FetchError, ParseError};

/// How a source authenticates its requests.
#[derive(Debug, Clone)]
pub enum SourceAuth {
    Bearer(String),
    ApiKey { header: &'static str, key: String },
}

impl SourceAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            SourceAuth::Bearer(token) => request.bearer_auth(token),
            SourceAuth::ApiKey { header, key } => request.header(*header, key),
        }
    }
}

/// GET-with-retry client shared by the HTTP sources.
///
/// Every call carries the configured timeout and runs under the retry policy;
/// only 5xx, timeouts and transport failures are retried.
#[derive(Debug, Clone)]
pub struct SourceHttpClient {
    client: Client,
    auth: SourceAuth,
    retry: RetryPolicy,
}

impl SourceHttpClient {
    pub fn new(settings: &FetchSettings, auth: SourceAuth) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            auth,
            retry: settings.retry.clone(),
        })
    }

    /// GET `url` with `query` and decode the JSON body as `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<T, FetchError> {
        retry(&self.retry, cancel, url, |attempt| self.get_once(url, query, attempt)).await
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        attempt: u32,
    ) -> Result<T, FetchError> {
        debug!(url = %url, attempt, "sending source request");

        let request = self.auth.apply(self.client.get(url).query(query));
        let response = request.send().await.map_err(|e| classify_send_error(url, e))?;

        let status = response.status();
        debug!(url = %url, status = %status, attempt, "received source response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(url, status, body));
        }

        let bytes = response.bytes().await.map_err(|e| classify_send_error(url, e))?;
        serde_json::from_slice::<T>(&bytes)
            .map_err(|e| FetchError::Parse(ParseError::new(url, e.to_string())))
    }
}

fn classify_send_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else if err.is_builder() {
        FetchError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

fn classify_status(url: &str, status: StatusCode, body: String) -> FetchError {
    let url = url.to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth {
            url,
            status: status.as_u16(),
        },
        s if s.is_server_error() => FetchError::Server {
            url,
            status: s.as_u16(),
        },
        s => FetchError::Client {
            url,
            status: s.as_u16(),
            body: truncate(body, 512),
        },
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
