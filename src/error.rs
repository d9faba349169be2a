//! Error taxonomy for token verification and the JWKS manager.

use reqwest::StatusCode;

/// Errors surfaced to callers by verification and key management.
///
/// The [`AuthError::MissingOrMalformedToken`] variant displays exactly
/// `Missing or malformed JWT`; error handlers that discriminate by message
/// keep working alongside handlers that match on the variant.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No extractor produced a token of plausible form.
    #[error("Missing or malformed JWT")]
    MissingOrMalformedToken,

    /// No verification key for the presented `kid`, after an optional
    /// refresh. An empty `kid` means the token header carried none.
    #[error("no verification key found for kid {kid:?}")]
    UnknownKid {
        /// The key ID taken from the JWT header.
        kid: String,
    },

    /// The token algorithm does not match the algorithm declared for the
    /// selected key.
    #[error("algorithm mismatch: key declares {expected:?}, token presented {presented:?}")]
    AlgorithmMismatch {
        /// Algorithm declared by the key entry or configuration.
        expected: String,
        /// Algorithm named in the JWT header.
        presented: String,
    },

    /// The token algorithm is not one the resolver understands, or does
    /// not fit the key type of the selected entry.
    #[error("unsupported key type for algorithm {alg:?}")]
    UnsupportedKeyType {
        /// Algorithm named in the JWT header.
        alg: String,
    },

    /// The JWK entry lacks required fields for its key type.
    #[error("required assets are missing to build a public key: {reason}")]
    MissingKeyAssets {
        /// Which field or decode step was missing or malformed.
        reason: String,
    },

    /// One or more configured JWKS URLs failed during a refresh.
    #[error("JWK Set fetch failed: {0}")]
    JwksFetch(#[from] FetchError),

    /// Signature or claim validation failure from the crypto layer,
    /// surfaced unchanged.
    #[error("invalid JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Fatal configuration problem detected at construction.
    #[error("configuration: {0}")]
    Configuration(&'static str),
}

/// A single failed JWKS download, tagged with the URL that failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request itself failed (connect, timeout, body read).
    #[error("GET {url} failed: {source}")]
    Http {
        /// The JWKS URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with a non-success status.
    #[error("GET {url} returned status {status}")]
    Status {
        /// The JWKS URL that failed.
        url: String,
        /// The status it returned.
        status: StatusCode,
    },

    /// The response body was not a valid JWKS document.
    #[error("JWK Set from {url} is not valid JSON: {source}")]
    Decode {
        /// The JWKS URL that served the body.
        url: String,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The refresh was abandoned because the manager is shutting down.
    #[error("refresh cancelled by shutdown")]
    Cancelled,
}
