//! HTTP GET probe with fixed-interval retries.

use super::poll::{poll, PollSchedule};
use super::{truncate_body, VerificationError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Per-request timeout. Kept well under typical poll intervals.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Status and whitespace-trimmed body of one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl fmt::Display for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status {}, body {:?}",
            self.status,
            truncate_body(&self.body)
        )
    }
}

/// Outcome of one attempt that did not satisfy the expectation.
#[derive(Debug)]
enum Miss {
    Unexpected(HttpResponse),
    Request(reqwest::Error),
}

impl fmt::Display for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Miss::Unexpected(response) => write!(f, "{}", response),
            Miss::Request(e) => write!(f, "request error: {}", e),
        }
    }
}

/// Client for probing HTTP endpoints exposed by provisioned resources.
pub struct HttpProbe {
    http_client: Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, VerificationError> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http_client })
    }

    /// Use an existing client (custom TLS, proxies, timeouts).
    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }

    /// Get the HTTP client for custom requests.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Single GET. The body is trimmed of surrounding whitespace.
    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, VerificationError> {
        let headers = header_map(headers)?;
        Ok(self.get_with_headers(url, &headers).await?)
    }

    /// GET `url` until it returns exactly `expected_status` and
    /// `expected_body`, at most `schedule.max_attempts` times.
    pub async fn get_with_retry(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        expected_status: u16,
        expected_body: &str,
        schedule: PollSchedule,
    ) -> Result<(), VerificationError> {
        self.get_with_custom_validation(url, headers, schedule, |status, body| {
            status == expected_status && body == expected_body
        })
        .await
    }

    /// GET `url` until `validate(status, body)` returns true, at most
    /// `schedule.max_attempts` times.
    pub async fn get_with_custom_validation<V>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        schedule: PollSchedule,
        validate: V,
    ) -> Result<(), VerificationError>
    where
        V: Fn(u16, &str) -> bool,
    {
        let headers = header_map(headers)?;

        info!(
            target: "infra_tests.probe",
            url = %url,
            max_attempts = schedule.max_attempts,
            interval_ms = schedule.interval.as_millis() as u64,
            "Probing HTTP endpoint"
        );

        let result = poll(schedule, |_| {
            let headers = &headers;
            let validate = &validate;
            async move {
                match self.get_with_headers(url, headers).await {
                    Ok(response) if validate(response.status, &response.body) => Ok(response),
                    Ok(response) => Err(Miss::Unexpected(response)),
                    Err(e) => Err(Miss::Request(e)),
                }
            }
        })
        .await;

        match result {
            Ok(response) => {
                info!(
                    target: "infra_tests.probe",
                    url = %url,
                    status = response.status,
                    "HTTP endpoint verified"
                );
                Ok(())
            }
            Err(exhausted) => Err(VerificationError::Timeout {
                target: url.to_string(),
                attempts: exhausted.attempts,
                last: exhausted
                    .last_error
                    .map(|miss| miss.to_string())
                    .unwrap_or_else(|| "no attempts made".to_string()),
            }),
        }
    }

    async fn get_with_headers(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<HttpResponse, reqwest::Error> {
        let response = self
            .http_client
            .get(url)
            .headers(headers.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            body: body.trim().to_string(),
        })
    }
}

fn header_map(headers: &[(&str, &str)]) -> Result<HeaderMap, VerificationError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            VerificationError::InvalidHeader {
                name: (*name).to_string(),
                message: e.to_string(),
            }
        })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|e| VerificationError::InvalidHeader {
                name: (*name).to_string(),
                message: e.to_string(),
            })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
