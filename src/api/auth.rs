use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

pub const TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// The server has no shared secret, so nobody can be let in.
    #[error("RUN_TOKEN is not configured on the server")]
    NotConfigured,
    #[error("Invalid or missing {0}")]
    Invalid(&'static str),
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Invalid(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({"detail": self.to_string()}))
    }
}

/// Compare the presented token with the configured one.  `what` names the
/// place the token was expected in, e.g. `X-Auth-Token` or `token`.
pub fn check_token(
    configured: Option<&str>,
    presented: Option<&str>,
    what: &'static str,
) -> Result<(), AuthError> {
    let expected = match configured {
        Some(token) if !token.is_empty() => token,
        _ => {
            error!("RUN_TOKEN is not set; all authenticated endpoints will reject requests.");
            return Err(AuthError::NotConfigured);
        }
    };
    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(AuthError::Invalid(what)),
    }
}

/// Value of the `X-Auth-Token` header, if it is there and readable.
pub fn header_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
}
