use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Body sent back when a request carries no Pantry ID and the rewriter rejects it.
pub const MISSING_ID_BODY: &str = "Pantry ID not found";

/// Construction-time failures. A rewriter is never built from an invalid config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("keyHeader cannot be empty")]
    EmptyKeyHeader,

    #[error("basketRegex cannot be empty")]
    EmptyBasketRegex,

    #[error("invalid header name {name:?}")]
    InvalidHeaderName { name: String },

    #[error("error compiling regex {pattern:?}: {source}")]
    InvalidBasketRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("regex {pattern:?} has no capture group for the basket name")]
    MissingCaptureGroup { pattern: String },
}

/// Why a rebuilt path could not be percent-decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathDecodeError {
    #[error("invalid URL escape {0:?}")]
    InvalidEscape(String),
}

/// Request-time failures. Each one ends only the request that produced it.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("pantry id not found")]
    MissingIdentifier,

    #[error("unable to decode rewritten path {path:?}: {source}")]
    PathDecode {
        path: String,
        #[source]
        source: PathDecodeError,
    },

    /// The escaped target was refused by `http::Uri`. Targets built by the
    /// rewriter are fully percent-escaped, so this points at a bug.
    #[error("rewritten path {path:?} is not a valid request target")]
    InvalidUri {
        path: String,
        #[source]
        source: axum::http::Error,
    },
}

impl IntoResponse for RewriteError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            RewriteError::MissingIdentifier => (StatusCode::BAD_REQUEST, MISSING_ID_BODY.to_string()),
            RewriteError::PathDecode { source, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, source.to_string())
            }
            RewriteError::InvalidUri { source, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, source.to_string())
            }
        };

        let mut response = (status, msg).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
