//! # jwtgate
//!
//! JWT bearer authentication for HTTP services, with a concurrent,
//! self-refreshing JWKS key manager.
//!
//! Tokens are verified against one of four key sources: a single key, a
//! `kid`-keyed map, one or more JWKS URLs, or a caller-supplied resolver.
//! With JWKS URLs configured, keys are downloaded once at construction and
//! then kept fresh by a background controller under a refresh-interval and
//! rate-limit policy; an unknown `kid` can optionally ride one coalesced
//! refresh before being rejected.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use jwtgate::{Authenticator, Config, JwtAuthLayer, RefreshPolicy};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let auth: Authenticator = Config::new()
//!     .with_jwks_urls(["https://auth.example.com/.well-known/jwks.json"])
//!     .with_refresh_policy(RefreshPolicy::recommended())
//!     .build()
//!     .await?;
//!
//! // Wrap any tower service over http::Request.
//! let layer = JwtAuthLayer::new(Arc::new(auth));
//! # let _ = layer;
//! # Ok::<(), jwtgate::AuthError>(())
//! # });
//! ```
//!
//! Verified requests reach the inner service with a [`Verified`]
//! extension holding the decoded claims under the configured context key
//! (default `user`). Failed requests are answered directly: 400
//! `Missing or malformed JWT` when no token was found, 401
//! `Invalid or expired JWT` for everything else, both overridable via
//! [`Config::with_error_handler`].
//!
//! ## Modules
//!
//! - [`config`] - the configuration surface and [`RefreshPolicy`]
//! - [`context`] - the abstract [`RequestContext`] the verifier consumes
//! - [`error`] - the [`AuthError`] taxonomy
//! - [`jwks`] - the key-set manager: fetching, caching, refreshing
//! - [`middleware`] - the tower [`JwtAuthLayer`]/[`JwtAuthService`] pair
//! - [`verify`] - the [`Authenticator`] pipeline

pub mod config;
pub mod context;
pub mod error;
mod extract;
pub mod jwks;
pub mod middleware;
pub mod verify;

pub use config::{Config, ErrorHandlerFn, FilterFn, MapClaims, RefreshPolicy, SigningKey};
pub use context::{HttpRequestContext, RequestContext};
pub use error::{AuthError, FetchError};
pub use jwks::{KeyEntry, KeySetManager, Snapshot};
pub use middleware::{JwtAuthLayer, JwtAuthService, Verified};
pub use verify::{default_error_response, Authenticator, KeyResolver};
