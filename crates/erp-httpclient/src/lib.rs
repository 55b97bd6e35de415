//! HTTP transport for the eRx IDP client.
//!
//! This crate provides the transport contract the IDP session talks through:
//!
//! - [`HttpClient`] - `send(request, interceptors, redirect_handler)`
//! - [`DefaultHttpClient`] - reqwest implementation with manual redirect control
//! - [`Interceptor`] / [`Chain`] - request/response rewriting hooks
//! - [`RedirectHandler`] - per-request redirect decisions
//!
//! # Example
//!
//! ```ignore
//! use erp_httpclient::{DefaultHttpClient, HttpClient, HttpClientConfig, HttpRequest, NoFollow};
//!
//! let client = DefaultHttpClient::new(&HttpClientConfig::default())?;
//! let request = HttpRequest::post_form(url, &[("signed_challenge", jwt.as_str())]);
//! let response = client.send(request, &[], Some(&NoFollow)).await?;
//! let code_redirect = response.location()?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod message;
pub mod redirect;

pub use client::{DefaultHttpClient, HttpClient};
pub use config::HttpClientConfig;
pub use error::HttpError;
pub use interceptor::{
    AdditionalHeaderInterceptor, Chain, Interceptor, LogDetail, LoggingInterceptor, Transport,
};
pub use message::{HttpRequest, HttpResponse, REQUEST_ID_HEADER};
pub use redirect::{FollowAll, NoFollow, RedirectDecision, RedirectHandler, follow_up_request};

pub use reqwest::header;
pub use reqwest::{Method, StatusCode};
