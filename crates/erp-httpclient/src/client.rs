//! The transport contract and its reqwest implementation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use uuid::Uuid;

use crate::config::HttpClientConfig;
use crate::error::HttpError;
use crate::interceptor::{AdditionalHeaderInterceptor, Chain, Interceptor, Transport};
use crate::message::{HttpRequest, HttpResponse, REQUEST_ID_HEADER};
use crate::redirect::{RedirectDecision, RedirectHandler, follow_up_request};

/// Sends HTTP requests.
///
/// `interceptors` run after the client's own interceptors. When
/// `redirect` is `None` redirects are followed up to the configured limit.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `request` and returns the final response.
    async fn send(
        &self,
        request: HttpRequest,
        interceptors: &[Arc<dyn Interceptor>],
        redirect: Option<&dyn RedirectHandler>,
    ) -> Result<HttpResponse, HttpError>;
}

/// reqwest backed [`HttpClient`].
///
/// Every request is tagged with a fresh `X-RID` header before entering the
/// interceptor chain. TLS 1.2 is the minimum protocol version.
#[derive(Clone)]
pub struct DefaultHttpClient {
    client: reqwest::Client,
    interceptors: Vec<Arc<dyn Interceptor>>,
    max_redirects: usize,
}

impl std::fmt::Debug for DefaultHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultHttpClient")
            .field("interceptors", &self.interceptors.len())
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

impl DefaultHttpClient {
    /// Builds a client from `config`.
    ///
    /// Configured additional headers are installed as the first interceptor.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidRequest` if the reqwest client cannot be
    /// built or an additional header is invalid.
    pub fn new(config: &HttpClientConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .map_err(|e| HttpError::invalid_request(format!("failed to build client: {e}")))?;

        let mut interceptors: Vec<Arc<dyn Interceptor>> = Vec::new();
        let additional = AdditionalHeaderInterceptor::new(&config.additional_headers)?;
        if !additional.is_empty() {
            interceptors.push(Arc::new(additional));
        }

        Ok(Self {
            client,
            interceptors,
            max_redirects: config.max_redirects,
        })
    }

    /// Appends a client-level interceptor.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Returns the number of client-level interceptors.
    #[must_use]
    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }
}

#[async_trait]
impl HttpClient for DefaultHttpClient {
    async fn send(
        &self,
        mut request: HttpRequest,
        interceptors: &[Arc<dyn Interceptor>],
        redirect: Option<&dyn RedirectHandler>,
    ) -> Result<HttpResponse, HttpError> {
        let request_id = Uuid::new_v4().to_string();
        let value = HeaderValue::from_str(&request_id)
            .map_err(|e| HttpError::invalid_request(e.to_string()))?;
        request.headers.insert(REQUEST_ID_HEADER, value);

        let all: Vec<Arc<dyn Interceptor>> = self
            .interceptors
            .iter()
            .chain(interceptors.iter())
            .cloned()
            .collect();

        let transport = RedirectingTransport {
            client: &self.client,
            handler: redirect,
            max_redirects: self.max_redirects,
        };

        Chain::new(&all, &transport).proceed(request).await
    }
}

/// Executes one logical request, resolving redirects by hand.
struct RedirectingTransport<'a> {
    client: &'a reqwest::Client,
    handler: Option<&'a dyn RedirectHandler>,
    max_redirects: usize,
}

impl RedirectingTransport<'_> {
    async fn execute_once(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

#[async_trait]
impl Transport for RedirectingTransport<'_> {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut current = request;
        let mut hops = 0usize;

        loop {
            let response = self.execute_once(current.clone()).await?;
            if !response.is_redirect() {
                return Ok(response);
            }
            let Some(target) = response.location()? else {
                return Ok(response);
            };

            let proposed = follow_up_request(&current, &response, target);
            let decision = match self.handler {
                Some(handler) => handler.on_redirect(&response, proposed),
                None => RedirectDecision::Follow(proposed),
            };

            match decision {
                RedirectDecision::Stop => {
                    tracing::debug!(status = response.status.as_u16(), "redirect not followed");
                    return Ok(response);
                }
                RedirectDecision::Follow(next) => {
                    hops += 1;
                    if hops > self.max_redirects {
                        return Err(HttpError::TooManyRedirects {
                            limit: self.max_redirects,
                        });
                    }
                    tracing::debug!(from = %current.url, to = %next.url, "following redirect");
                    current = next;
                }
            }
        }
    }
}
