//! Interceptor chain.
//!
//! Every request passes through an ordered list of [`Interceptor`]s before it
//! reaches the [`Transport`]. Each interceptor receives the request together
//! with the remaining [`Chain`] and decides whether and how to call
//! [`Chain::proceed`]. This allows rewriting the request on the way out and
//! the response on the way back.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::error::HttpError;
use crate::message::{HttpRequest, HttpResponse, REQUEST_ID_HEADER};

/// Terminal link of a chain: actually performs the exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes `request` and returns the final response.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// A hook around request execution.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Handles `request`, usually by calling `chain.proceed(..)`.
    async fn intercept(
        &self,
        request: HttpRequest,
        chain: Chain<'_>,
    ) -> Result<HttpResponse, HttpError>;
}

/// The remaining interceptors and the transport.
pub struct Chain<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Chain<'a> {
    /// Creates a chain over `interceptors` ending in `transport`.
    #[must_use]
    pub fn new(interceptors: &'a [Arc<dyn Interceptor>], transport: &'a dyn Transport) -> Self {
        Self {
            interceptors,
            transport,
        }
    }

    /// Passes `request` to the next interceptor, or to the transport at the end.
    pub async fn proceed(self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        match self.interceptors.split_first() {
            Some((next, rest)) => {
                next.intercept(request, Chain::new(rest, self.transport))
                    .await
            }
            None => self.transport.execute(request).await,
        }
    }
}

// =============================================================================
// Additional headers
// =============================================================================

/// Adds a fixed set of headers to every request.
///
/// Existing headers with the same name are overwritten.
#[derive(Debug, Clone, Default)]
pub struct AdditionalHeaderInterceptor {
    headers: HeaderMap,
}

impl AdditionalHeaderInterceptor {
    /// Creates the interceptor from name/value pairs.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidRequest` for invalid header names or values.
    pub fn new<I, K, V>(headers: I) -> Result<Self, HttpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes())
                .map_err(|e| HttpError::invalid_request(format!("header name: {e}")))?;
            let value = HeaderValue::from_str(value.as_ref())
                .map_err(|e| HttpError::invalid_request(format!("header value: {e}")))?;
            map.insert(name, value);
        }
        Ok(Self { headers: map })
    }

    /// Returns `true` if no headers are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[async_trait]
impl Interceptor for AdditionalHeaderInterceptor {
    async fn intercept(
        &self,
        mut request: HttpRequest,
        chain: Chain<'_>,
    ) -> Result<HttpResponse, HttpError> {
        for (name, value) in &self.headers {
            request.headers.insert(name.clone(), value.clone());
        }
        chain.proceed(request).await
    }
}

// =============================================================================
// Logging
// =============================================================================

/// How much of each exchange the [`LoggingInterceptor`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogDetail {
    /// Method, URL, status and duration.
    #[default]
    Basic,
    /// Additionally the headers, with `Authorization` redacted.
    Headers,
    /// Additionally the bodies (at `trace` level).
    Body,
}

/// Emits tracing events for every request and response.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor {
    detail: LogDetail,
}

impl LoggingInterceptor {
    /// Creates a logging interceptor with the given detail level.
    #[must_use]
    pub fn new(detail: LogDetail) -> Self {
        Self { detail }
    }
}

fn redacted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if name == AUTHORIZATION {
                "<redacted>".to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.to_string(), value)
        })
        .collect()
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        request: HttpRequest,
        chain: Chain<'_>,
    ) -> Result<HttpResponse, HttpError> {
        let request_id = request.header(REQUEST_ID_HEADER).unwrap_or("-").to_string();
        let method = request.method.clone();
        let url = request.url.clone();

        tracing::debug!(%request_id, %method, %url, "HTTP request");
        if self.detail != LogDetail::Basic {
            tracing::debug!(%request_id, headers = ?redacted_headers(&request.headers), "request headers");
        }
        if self.detail == LogDetail::Body
            && let Some(body) = &request.body
        {
            tracing::trace!(%request_id, body = %String::from_utf8_lossy(body), "request body");
        }

        let started = Instant::now();
        let result = chain.proceed(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                tracing::debug!(
                    %request_id,
                    %method,
                    %url,
                    status = response.status.as_u16(),
                    elapsed_ms,
                    "HTTP response"
                );
                if self.detail != LogDetail::Basic {
                    tracing::debug!(%request_id, headers = ?redacted_headers(&response.headers), "response headers");
                }
                if self.detail == LogDetail::Body {
                    tracing::trace!(%request_id, body = %String::from_utf8_lossy(&response.body), "response body");
                }
            }
            Err(err) => {
                tracing::warn!(%request_id, %method, %url, elapsed_ms, error = %err, "HTTP request failed");
            }
        }

        result
    }
}
