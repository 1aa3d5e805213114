use std::time::Duration;

use crate::ports::http_client::{HttpClient, HttpClientError, JsonFuture, PostFuture};

const DEFAULT_POST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ReqwestHttpClient {
    client: reqwest::Client,
    post_timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("Falling back to default HTTP client: {}", err);
                reqwest::Client::new()
            });

        tracing::info!("Created outbound HTTP client");
        Self {
            client,
            post_timeout: DEFAULT_POST_TIMEOUT,
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn map_error(err: reqwest::Error, timeout: Duration) -> HttpClientError {
    if err.is_timeout() {
        HttpClientError::TimeoutError(timeout)
    } else if err.is_decode() {
        HttpClientError::DecodeError(err.to_string())
    } else {
        HttpClientError::ConnectionError(err.to_string())
    }
}

impl HttpClient for ReqwestHttpClient {
    fn get_json<'a>(&'a self, url: &'a str, timeout: Duration) -> JsonFuture<'a> {
        Box::pin(async move {
            tracing::debug!("GET {}", url);

            let response = self
                .client
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| map_error(e, timeout))?;

            let status = response.status();
            if !status.is_success() {
                return Err(HttpClientError::StatusError {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| map_error(e, timeout))
        })
    }

    fn post_json<'a>(&'a self, url: &'a str, body: &'a serde_json::Value) -> PostFuture<'a> {
        Box::pin(async move {
            tracing::debug!("POST {}", url);

            let response = self
                .client
                .post(url)
                .timeout(self.post_timeout)
                .json(body)
                .send()
                .await
                .map_err(|e| map_error(e, self.post_timeout))?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(HttpClientError::StatusError {
                    url: url.to_string(),
                    status: status.as_u16(),
                })
            }
        })
    }
}
