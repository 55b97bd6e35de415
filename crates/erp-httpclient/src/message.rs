//! Request and response values passed through the interceptor chain.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::HttpError;

/// Header carrying the per-request correlation id (`X-RID`).
pub const REQUEST_ID_HEADER: &str = "x-rid";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// An outgoing HTTP request.
///
/// Interceptors receive the request by value and may rewrite any field
/// before handing it to the next link of the chain.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a `DELETE` request.
    #[must_use]
    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Creates a `POST` request with an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn post_form<K, V>(url: Url, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .finish();
        let mut request = Self::new(Method::POST, url);
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        request.body = Some(body.into_bytes());
        request
    }

    /// Sets a header, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidRequest` if name or value are not valid header text.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, HttpError> {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes())
            .map_err(|e| HttpError::invalid_request(format!("header name: {e}")))?;
        let value = HeaderValue::from_str(value.as_ref())
            .map_err(|e| HttpError::invalid_request(format!("header value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets an `Authorization: Bearer` header.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidRequest` if the token contains invalid header characters.
    pub fn with_bearer(self, token: &str) -> Result<Self, HttpError> {
        self.with_header(AUTHORIZATION.as_str(), format!("Bearer {token}"))
    }

    /// Serializes `body` as JSON and sets the content type.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidRequest` if serialization fails.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, HttpError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| HttpError::invalid_request(format!("json body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        self.body = Some(bytes);
        Ok(self)
    }

    /// Returns a header value if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the first query parameter with the given name.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Decodes a form encoded body into key/value pairs.
    ///
    /// Returns an empty list when there is no body.
    #[must_use]
    pub fn form_params(&self) -> Vec<(String, String)> {
        self.body
            .as_deref()
            .map(|body| {
                url::form_urlencoded::parse(body)
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the first form parameter with the given name.
    #[must_use]
    pub fn form_param(&self, name: &str) -> Option<String> {
        self.form_params()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// A received HTTP response with a fully buffered body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
    /// URL the response was received from.
    pub url: Url,
}

impl HttpResponse {
    /// Creates an empty response.
    #[must_use]
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
            url,
        }
    }

    /// Sets a header, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidRequest` if name or value are not valid header text.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, HttpError> {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes())
            .map_err(|e| HttpError::invalid_request(format!("header name: {e}")))?;
        let value = HeaderValue::from_str(value.as_ref())
            .map_err(|e| HttpError::invalid_request(format!("header value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets a plain body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and content type.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Decoding` if serialization fails.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, HttpError> {
        self.body = serde_json::to_vec(body)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        Ok(self)
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns `true` for 3xx statuses.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }

    /// Returns a header value if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Decoding` if the body is not valid UTF-8.
    pub fn text(&self) -> Result<String, HttpError> {
        String::from_utf8(self.body.clone()).map_err(|e| HttpError::decoding(e.to_string()))
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Decoding` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Resolves the `Location` header against the response URL.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Decoding` if the header is present but not a valid URL.
    pub fn location(&self) -> Result<Option<Url>, HttpError> {
        let Some(value) = self.headers.get(LOCATION) else {
            return Ok(None);
        };
        let value = value
            .to_str()
            .map_err(|e| HttpError::decoding(format!("location header: {e}")))?;
        self.url
            .join(value)
            .map(Some)
            .map_err(|e| HttpError::decoding(format!("location header {value}: {e}")))
    }
}
