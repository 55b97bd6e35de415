//! Redirect control.
//!
//! The underlying reqwest client never follows redirects on its own. For
//! every 3xx response carrying a `Location` header the client builds the
//! request it would send next and asks the [`RedirectHandler`] whether to
//! send it. Returning [`RedirectDecision::Stop`] hands the 3xx response back
//! to the caller, which is how authorization code redirects are captured.

use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::message::{HttpRequest, HttpResponse};

/// Outcome of a redirect callback.
#[derive(Debug, Clone)]
pub enum RedirectDecision {
    /// Send the given request (usually the proposed one, possibly rewritten).
    Follow(HttpRequest),
    /// Stop and return the redirect response itself.
    Stop,
}

/// Callback consulted for every redirect hop.
pub trait RedirectHandler: Send + Sync {
    /// Decides what to do with a redirect `response`.
    fn on_redirect(&self, response: &HttpResponse, proposed: HttpRequest) -> RedirectDecision;
}

/// Never follows redirects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFollow;

impl RedirectHandler for NoFollow {
    fn on_redirect(&self, _response: &HttpResponse, _proposed: HttpRequest) -> RedirectDecision {
        RedirectDecision::Stop
    }
}

/// Follows every redirect unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowAll;

impl RedirectHandler for FollowAll {
    fn on_redirect(&self, _response: &HttpResponse, proposed: HttpRequest) -> RedirectDecision {
        RedirectDecision::Follow(proposed)
    }
}

/// Builds the request a browser would send after `response` redirected `previous` to `target`.
///
/// 301, 302 and 303 downgrade non-`GET`/`HEAD` requests to a bodiless `GET`;
/// 307 and 308 replay method and body. Credentials are dropped when the
/// redirect leaves the original origin.
#[must_use]
pub fn follow_up_request(previous: &HttpRequest, response: &HttpResponse, target: Url) -> HttpRequest {
    let mut next = previous.clone();

    let downgrade = matches!(
        response.status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
    ) && previous.method != Method::GET
        && previous.method != Method::HEAD;

    if downgrade {
        next.method = Method::GET;
        next.body = None;
        next.headers.remove(CONTENT_TYPE);
        next.headers.remove(CONTENT_LENGTH);
    }

    if previous.url.origin() != target.origin() {
        next.headers.remove(AUTHORIZATION);
    }

    next.url = target;
    next
}
