//! Middleware configuration: key sources, token lookup, refresh policy.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::context::RequestContext;
use crate::error::AuthError;
use crate::extract::parse_token_lookup;
use crate::jwks::{JwksFetcher, KeySetManager, RefreshErrorHandler, RefreshSuccessHandler};
use crate::verify::{Authenticator, KeyResolver, KeySource};

pub(crate) const DEFAULT_TOKEN_LOOKUP: &str = "header:Authorization";
pub(crate) const DEFAULT_AUTH_SCHEME: &str = "Bearer";
pub(crate) const DEFAULT_CONTEXT_KEY: &str = "user";

/// Claims shape used when no typed claims are configured: a plain map of
/// claim name to value.
pub type MapClaims = Map<String, Value>;

/// Predicate deciding whether a request skips authentication entirely.
pub type FilterFn = Arc<dyn Fn(&dyn RequestContext) -> bool + Send + Sync>;

/// Maps a classified error to a response status and body.
pub type ErrorHandlerFn = Arc<dyn Fn(&AuthError) -> (http::StatusCode, String) + Send + Sync>;

/// A statically configured verification key.
#[derive(Clone)]
pub struct SigningKey {
    /// Declared JWT algorithm. Checked against the token header when
    /// non-empty; an empty string accepts any algorithm.
    pub algorithm: String,
    /// Key material handed to the crypto layer.
    pub key: DecodingKey,
}

impl SigningKey {
    /// Key with a declared algorithm.
    pub fn new(algorithm: impl Into<String>, key: DecodingKey) -> Self {
        Self {
            algorithm: algorithm.into(),
            key,
        }
    }

    /// Symmetric (`HS*`) key from a shared secret.
    pub fn from_secret(algorithm: impl Into<String>, secret: &[u8]) -> Self {
        Self::new(algorithm, DecodingKey::from_secret(secret))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Refresh cadence, rate limiting, and timeout policy for the JWKS
/// manager.
#[derive(Clone, Debug)]
pub struct RefreshPolicy {
    /// Periodic background refresh cadence. Disabled when `None`.
    pub interval: Option<Duration>,
    /// Minimum spacing between refreshes. Should not exceed `interval`
    /// when both are set.
    pub rate_limit: Option<Duration>,
    /// Per-request deadline for each JWKS HTTP GET.
    pub timeout: Duration,
    /// Let an unknown `kid` trigger, and wait for, at most one queued
    /// refresh.
    pub refresh_on_unknown_kid: bool,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: None,
            rate_limit: None,
            timeout: Duration::from_secs(60),
            refresh_on_unknown_kid: false,
        }
    }
}

impl RefreshPolicy {
    /// The policy most remote-identity-provider deployments want: hourly
    /// refresh, five-minute rate limit, ten-second fetch deadline, and
    /// refresh on unknown kid.
    pub fn recommended() -> Self {
        Self {
            interval: Some(Duration::from_secs(3600)),
            rate_limit: Some(Duration::from_secs(300)),
            timeout: Duration::from_secs(10),
            refresh_on_unknown_kid: true,
        }
    }
}

/// Builder for [`Authenticator`].
///
/// At least one key source is required: a caller resolver, JWKS URLs, a
/// `kid`-keyed map, or a single key. When several are supplied the
/// precedence is resolver, then JWKS URLs, then the key map, then the
/// single key.
pub struct Config<C = MapClaims> {
    filter: Option<FilterFn>,
    error_handler: Option<ErrorHandlerFn>,
    signing_key: Option<DecodingKey>,
    signing_method: String,
    signing_keys: HashMap<String, SigningKey>,
    jwks_urls: Vec<String>,
    key_resolver: Option<Arc<dyn KeyResolver>>,
    context_key: String,
    token_lookup: Option<String>,
    auth_scheme: Option<String>,
    refresh: RefreshPolicy,
    http_client: Option<reqwest::Client>,
    on_refresh_success: Option<RefreshSuccessHandler>,
    on_refresh_error: Option<RefreshErrorHandler>,
    claims: PhantomData<fn() -> C>,
}

impl<C> Default for Config<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Config<C> {
    /// Empty configuration with the documented defaults.
    pub fn new() -> Self {
        Self {
            filter: None,
            error_handler: None,
            signing_key: None,
            signing_method: String::new(),
            signing_keys: HashMap::new(),
            jwks_urls: Vec::new(),
            key_resolver: None,
            context_key: DEFAULT_CONTEXT_KEY.to_owned(),
            token_lookup: None,
            auth_scheme: None,
            refresh: RefreshPolicy::default(),
            http_client: None,
            on_refresh_success: None,
            on_refresh_error: None,
            claims: PhantomData,
        }
    }

    /// Skip authentication for requests matching the predicate.
    pub fn with_filter(
        mut self,
        filter: impl Fn(&dyn RequestContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Replace the default 400/401 error responses.
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&AuthError) -> (http::StatusCode, String) + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Verify every token with this single key.
    pub fn with_signing_key(mut self, key: DecodingKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Declared algorithm for the single-key source. Non-empty values are
    /// checked against the token header.
    pub fn with_signing_method(mut self, algorithm: impl Into<String>) -> Self {
        self.signing_method = algorithm.into();
        self
    }

    /// Verify tokens against a `kid`-keyed map of keys.
    pub fn with_signing_keys(mut self, keys: HashMap<String, SigningKey>) -> Self {
        self.signing_keys = keys;
        self
    }

    /// Verify tokens against keys downloaded from these JWKS URLs.
    pub fn with_jwks_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.jwks_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Override key lookup entirely with a caller-supplied resolver.
    pub fn with_key_resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.key_resolver = Some(resolver);
        self
    }

    /// Context slot the decoded claims are published under.
    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    /// Where to look for the token, as a comma-separated `source:name`
    /// list over `header`, `query`, `param`, and `cookie`.
    pub fn with_token_lookup(mut self, lookup: impl Into<String>) -> Self {
        self.token_lookup = Some(lookup.into());
        self
    }

    /// Auth scheme stripped from header extractions.
    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = Some(scheme.into());
        self
    }

    /// Refresh policy for the JWKS manager.
    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh = policy;
        self
    }

    /// HTTP client used for JWKS downloads instead of the built-in one.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Observe every successfully published snapshot.
    pub fn on_refresh_success(
        mut self,
        handler: impl Fn(&crate::jwks::Snapshot) + Send + Sync + 'static,
    ) -> Self {
        self.on_refresh_success = Some(Arc::new(handler));
        self
    }

    /// Observe background refresh failures. Without a handler they are
    /// logged at warn level.
    pub fn on_refresh_error(
        mut self,
        handler: impl Fn(&crate::error::FetchError) + Send + Sync + 'static,
    ) -> Self {
        self.on_refresh_error = Some(Arc::new(handler));
        self
    }
}

impl<C> Config<C>
where
    C: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    /// Validate the configuration and construct the authenticator.
    ///
    /// When JWKS URLs are configured this performs the initial download,
    /// so an unreachable endpoint fails construction rather than leaving
    /// every request unverifiable.
    pub async fn build(self) -> Result<Authenticator<C>, AuthError> {
        if self.signing_key.is_none()
            && self.signing_keys.is_empty()
            && self.jwks_urls.is_empty()
            && self.key_resolver.is_none()
        {
            return Err(AuthError::Configuration(
                "at least one of key_resolver, jwks_urls, signing_keys, or signing_key is required",
            ));
        }

        if let (Some(interval), Some(rate_limit)) = (self.refresh.interval, self.refresh.rate_limit)
        {
            if rate_limit > interval {
                warn!(
                    ?interval,
                    ?rate_limit,
                    "refresh rate limit exceeds the refresh interval; every periodic refresh will be deferred"
                );
            }
        }

        // The Bearer default only applies to the default token lookup; a
        // caller-supplied lookup gets an empty scheme unless one is set.
        let auth_scheme = match (&self.token_lookup, self.auth_scheme) {
            (_, Some(scheme)) => scheme,
            (None, None) => DEFAULT_AUTH_SCHEME.to_owned(),
            (Some(_), None) => String::new(),
        };
        let token_lookup = self
            .token_lookup
            .unwrap_or_else(|| DEFAULT_TOKEN_LOOKUP.to_owned());
        let sources = parse_token_lookup(&token_lookup, &auth_scheme);

        let key_source = if let Some(resolver) = self.key_resolver {
            KeySource::Resolver(resolver)
        } else if !self.jwks_urls.is_empty() {
            let client = match self.http_client {
                Some(client) => client,
                None => reqwest::Client::builder()
                    .connect_timeout(Duration::from_secs(10))
                    .build()
                    .map_err(|_| {
                        AuthError::Configuration("failed to build the JWKS HTTP client")
                    })?,
            };
            let fetcher = JwksFetcher::new(client, self.jwks_urls, self.refresh.timeout);
            let manager = KeySetManager::start(
                fetcher,
                self.refresh,
                self.on_refresh_success,
                self.on_refresh_error,
            )
            .await?;
            KeySource::Jwks(manager)
        } else if !self.signing_keys.is_empty() {
            KeySource::Keyed(self.signing_keys)
        } else {
            let key = self
                .signing_key
                .ok_or(AuthError::Configuration("signing key vanished during build"))?;
            KeySource::Single(SigningKey {
                algorithm: self.signing_method,
                key,
            })
        };

        Ok(Authenticator::new(
            sources,
            key_source,
            self.context_key,
            self.filter,
            self.error_handler,
        ))
    }
}
