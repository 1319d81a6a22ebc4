//! Tower integration for [`PathRewriter`].
//!
//! ```rust,ignore
//! use pantry_path::config::PantryPathConfig;
//! use pantry_path::middleware::PantryPathLayer;
//!
//! let app = axum::Router::new()
//!     .fallback(forward_to_pantry)
//!     .layer(PantryPathLayer::new(PantryPathConfig::default())?);
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures::future::{self, Either, Ready};
use tower::{Layer, Service};

use super::rewrite::PathRewriter;
use crate::config::PantryPathConfig;
use crate::errors::ConfigError;

/// Layer that puts a [`PantryPathService`] in front of the next handler.
#[derive(Debug, Clone)]
pub struct PantryPathLayer {
    rewriter: Arc<PathRewriter>,
}

impl PantryPathLayer {
    pub fn new(config: PantryPathConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_rewriter(Arc::new(PathRewriter::new(config)?)))
    }

    pub fn from_rewriter(rewriter: Arc<PathRewriter>) -> Self {
        Self { rewriter }
    }
}

impl<S> Layer<S> for PantryPathLayer {
    type Service = PantryPathService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PantryPathService {
            inner,
            rewriter: Arc::clone(&self.rewriter),
        }
    }
}

/// Rewrites each request and hands it to `inner`, or answers directly when
/// the rewrite fails.
#[derive(Debug, Clone)]
pub struct PantryPathService<S> {
    inner: S,
    rewriter: Arc<PathRewriter>,
}

impl<S> PantryPathService<S> {
    pub fn new(inner: S, config: PantryPathConfig) -> Result<Self, ConfigError> {
        Ok(PantryPathLayer::new(config)?.layer(inner))
    }

    pub fn rewriter(&self) -> &PathRewriter {
        &self.rewriter
    }
}

impl<S, B> Service<Request<B>> for PantryPathService<S>
where
    S: Service<Request<B>, Response = Response>,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Either<Ready<Result<Response, S::Error>>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        match self.rewriter.rewrite(&mut req) {
            Ok(()) => Either::Right(self.inner.call(req)),
            Err(err) => Either::Left(future::ready(Ok(err.into_response()))),
        }
    }
}
