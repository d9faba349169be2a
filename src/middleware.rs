//! Tower middleware wrapping the verification pipeline.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::{Request, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_layer::Layer;
use tower_service::Service;

use crate::config::MapClaims;
use crate::context::HttpRequestContext;
use crate::verify::Authenticator;

/// Decoded claims stored in request extensions after verification.
///
/// `key` is the configured context key; `claims` is the decoded token
/// body.
#[derive(Debug, Clone)]
pub struct Verified {
    /// The configured context key.
    pub key: String,
    /// The decoded claims.
    pub claims: serde_json::Value,
}

/// Tower layer applying JWT authentication in front of an inner service.
pub struct JwtAuthLayer<C = MapClaims> {
    authenticator: Arc<Authenticator<C>>,
}

impl<C> JwtAuthLayer<C> {
    /// Layer around a built authenticator.
    pub fn new(authenticator: Arc<Authenticator<C>>) -> Self {
        Self { authenticator }
    }
}

impl<C> Clone for JwtAuthLayer<C> {
    fn clone(&self) -> Self {
        Self {
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

impl<S, C> Layer<S> for JwtAuthLayer<C> {
    type Service = JwtAuthService<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        JwtAuthService {
            inner,
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

/// Service produced by [`JwtAuthLayer`].
///
/// Requests passing verification reach the inner service with a
/// [`Verified`] extension; failures short-circuit with the error
/// handler's response and never reach the inner service.
pub struct JwtAuthService<S, C = MapClaims> {
    inner: S,
    authenticator: Arc<Authenticator<C>>,
}

impl<S: Clone, C> Clone for JwtAuthService<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

impl<S, C, B, ResBody> Service<Request<B>> for JwtAuthService<S, C>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: From<String>,
    C: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let authenticator = Arc::clone(&self.authenticator);
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let mut ctx = HttpRequestContext::new(&parts);

            if authenticator.should_skip(&ctx) {
                return inner.call(Request::from_parts(parts, body)).await;
            }

            match authenticator.authenticate(&mut ctx).await {
                Ok(_) => {
                    for (key, claims) in ctx.into_slots() {
                        parts.extensions.insert(Verified { key, claims });
                    }
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(err) => {
                    let (status, message) = authenticator.respond_error(&err);
                    let response = Response::builder()
                        .status(status)
                        .body(ResBody::from(message))
                        .expect("static response parts are valid");
                    Ok(response)
                }
            }
        })
    }
}
