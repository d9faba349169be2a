//! The verification pipeline: extract, resolve the key, check the
//! algorithm, verify the signature, publish the claims.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use jsonwebtoken::{decode, decode_header, Header, TokenData, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::{ErrorHandlerFn, FilterFn, MapClaims, SigningKey};
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::extract::{extract_token, TokenSource};
use crate::jwks::{alg_name, KeySetManager};

/// Caller-supplied key lookup, overriding every built-in source.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Produce the verification key for the parsed JWT header.
    async fn resolve(&self, header: &Header) -> Result<SigningKey, AuthError>;
}

/// Where verification keys come from, in configuration precedence order.
pub(crate) enum KeySource {
    Resolver(Arc<dyn KeyResolver>),
    Jwks(Arc<KeySetManager>),
    Keyed(HashMap<String, SigningKey>),
    Single(SigningKey),
}

/// Verifies bearer tokens against the configured key source.
///
/// Built by [`Config::build`](crate::Config::build); usable directly via
/// [`verify_token`](Self::verify_token) or wrapped by the middleware
/// layer.
pub struct Authenticator<C = MapClaims> {
    sources: Vec<TokenSource>,
    key_source: KeySource,
    context_key: String,
    filter: Option<FilterFn>,
    error_handler: Option<ErrorHandlerFn>,
    claims: PhantomData<fn() -> C>,
}

impl<C> Authenticator<C> {
    pub(crate) fn new(
        sources: Vec<TokenSource>,
        key_source: KeySource,
        context_key: String,
        filter: Option<FilterFn>,
        error_handler: Option<ErrorHandlerFn>,
    ) -> Self {
        Self {
            sources,
            key_source,
            context_key,
            filter,
            error_handler,
            claims: PhantomData,
        }
    }

    /// Context slot the decoded claims are published under.
    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    /// The JWKS manager backing this authenticator, when one is
    /// configured. Use it to observe snapshots or stop the refresh
    /// controller at shutdown.
    pub fn key_set(&self) -> Option<&Arc<KeySetManager>> {
        match &self.key_source {
            KeySource::Jwks(manager) => Some(manager),
            _ => None,
        }
    }

    /// Should this request bypass authentication entirely?
    pub fn should_skip(&self, ctx: &dyn RequestContext) -> bool {
        self.filter.as_ref().is_some_and(|filter| filter(ctx))
    }

    /// Map a classified error to a response status and body.
    ///
    /// The default mapping is 400 `Missing or malformed JWT` when no token
    /// was extracted and 401 `Invalid or expired JWT` for every
    /// verification failure.
    pub fn respond_error(&self, err: &AuthError) -> (StatusCode, String) {
        match &self.error_handler {
            Some(handler) => handler(err),
            None => default_error_response(err),
        }
    }

    #[cfg(test)]
    pub(crate) fn token_sources(&self) -> &[TokenSource] {
        &self.sources
    }
}

impl<C> Authenticator<C>
where
    C: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    /// Authenticate one request: extract the token, verify it, and
    /// publish the decoded claims under the configured context key.
    pub async fn authenticate(
        &self,
        ctx: &mut dyn RequestContext,
    ) -> Result<TokenData<C>, AuthError> {
        let token = extract_token(&self.sources, ctx)?;
        let verified = self.verify_token(&token).await?;
        let published = serde_json::to_value(&verified.claims)
            .map_err(|_| AuthError::Configuration("claims type cannot be serialized"))?;
        ctx.set(&self.context_key, published);
        Ok(verified)
    }

    /// Verify a raw compact-serialized token.
    pub async fn verify_token(&self, token: &str) -> Result<TokenData<C>, AuthError> {
        let header = decode_header(token)?;
        let resolved = self.resolve_key(&header).await?;

        // Declared-algorithm gate: case-sensitive string equality, with an
        // empty declaration accepting any algorithm.
        let presented = alg_name(header.alg);
        if !resolved.algorithm.is_empty() && resolved.algorithm != presented {
            return Err(AuthError::AlgorithmMismatch {
                expected: resolved.algorithm,
                presented: presented.to_owned(),
            });
        }

        // `exp` and `nbf` are checked when the token carries them, but no
        // claim is required to be present.
        let mut validation = Validation::new(header.alg);
        validation.required_spec_claims.clear();
        validation.validate_nbf = true;
        validation.validate_aud = false;

        let data = decode::<C>(token, &resolved.key, &validation)?;
        debug!(
            alg = presented,
            kid = header.kid.as_deref().unwrap_or_default(),
            "verified JWT"
        );
        Ok(data)
    }

    async fn resolve_key(&self, header: &Header) -> Result<SigningKey, AuthError> {
        match &self.key_source {
            KeySource::Resolver(resolver) => resolver.resolve(header).await,
            KeySource::Single(key) => Ok(key.clone()),
            KeySource::Keyed(keys) => {
                let kid = header.kid.clone().unwrap_or_default();
                keys.get(&kid)
                    .cloned()
                    .ok_or(AuthError::UnknownKid { kid })
            }
            KeySource::Jwks(manager) => {
                let kid = header.kid.clone().unwrap_or_default();
                if kid.is_empty() {
                    return Err(AuthError::UnknownKid { kid });
                }
                let entry = manager.resolve(&kid).await?;

                // A JWK that declares its own algorithm must agree with
                // the token before any material is built.
                if let Some(declared) = entry.algorithm() {
                    if !declared.is_empty() && declared != alg_name(header.alg) {
                        return Err(AuthError::AlgorithmMismatch {
                            expected: declared.to_owned(),
                            presented: alg_name(header.alg).to_owned(),
                        });
                    }
                }

                let key = entry.verification_key(header.alg)?;
                Ok(SigningKey {
                    algorithm: String::new(),
                    key,
                })
            }
        }
    }
}

/// The stock 400/401 mapping used when no error handler is configured.
pub fn default_error_response(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::MissingOrMalformedToken => {
            (StatusCode::BAD_REQUEST, "Missing or malformed JWT".to_owned())
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            "Invalid or expired JWT".to_owned(),
        ),
    }
}
