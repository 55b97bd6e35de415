//! Response handling shared by the flow steps.

use erp_httpclient::HttpResponse;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{IdpErrorKind, IdpErrorResponse};
use crate::protocol::ExchangeToken;

/// Turns a non-2xx response into `ServerError`.
pub(crate) fn ensure_success(response: HttpResponse) -> Result<HttpResponse, IdpErrorKind> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(server_error(&response))
    }
}

pub(crate) fn server_error(response: &HttpResponse) -> IdpErrorKind {
    IdpErrorKind::ServerError {
        status: response.status.as_u16(),
        error: serde_json::from_slice(&response.body).ok(),
    }
}

pub(crate) fn decode_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, IdpErrorKind> {
    serde_json::from_slice(&response.body).map_err(|e| IdpErrorKind::decoding(e.to_string()))
}

pub(crate) fn body_text(response: &HttpResponse) -> Result<String, IdpErrorKind> {
    response
        .text()
        .map(|text| text.trim().to_string())
        .map_err(|e| IdpErrorKind::decoding(e.to_string()))
}

/// The `Location` of a redirect response.
pub(crate) fn redirect_location(response: &HttpResponse) -> Result<Url, IdpErrorKind> {
    if !response.is_redirect() {
        return Err(if response.is_success() {
            IdpErrorKind::unexpected_response(format!(
                "expected a redirect, got HTTP {}",
                response.status
            ))
        } else {
            server_error(response)
        });
    }
    response
        .location()
        .map_err(|e| IdpErrorKind::decoding(e.to_string()))?
        .ok_or_else(|| IdpErrorKind::unexpected_response("redirect without location"))
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Reads the authorization code from a code redirect.
///
/// An `error` parameter in the redirect is reported as `ServerError` with
/// the redirect's status; a `state` other than `expected_state` is
/// `StateMismatch`.
pub(crate) fn parse_code_redirect(
    response: &HttpResponse,
    expected_state: &str,
) -> Result<ExchangeToken, IdpErrorKind> {
    let location = redirect_location(response)?;

    if let Some(error) = query_param(&location, "error") {
        return Err(IdpErrorKind::ServerError {
            status: response.status.as_u16(),
            error: Some(IdpErrorResponse {
                error,
                error_description: query_param(&location, "error_description"),
                gematik_code: query_param(&location, "gematik_code"),
                gematik_error_text: query_param(&location, "gematik_error_text"),
            }),
        });
    }

    let state = query_param(&location, "state")
        .ok_or_else(|| IdpErrorKind::unexpected_response("code redirect without state"))?;
    if state != expected_state {
        return Err(IdpErrorKind::StateMismatch);
    }
    let code = query_param(&location, "code")
        .ok_or_else(|| IdpErrorKind::unexpected_response("code redirect without code"))?;
    let sso_token = query_param(&location, "ssotoken");

    Ok(ExchangeToken {
        code,
        sso_token,
        state,
        redirect: location,
    })
}

/// Reads a required query parameter of a callback URL.
pub(crate) fn required_param(url: &Url, name: &str) -> Option<String> {
    query_param(url, name).filter(|value| !value.is_empty())
}
