//! Raw JWK parsing and per-entry key material.
//!
//! A JWKS document is decoded into [`RawJwk`] entries as downloaded; the
//! `jsonwebtoken` [`DecodingKey`] for an entry is only built when a token
//! actually selects it, then memoized for the lifetime of the snapshot.

use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;

use crate::error::AuthError;

/// Curves accepted for EC keys.
const SUPPORTED_CURVES: &[&str] = &["P-256", "P-384", "P-521"];

/// One key as it appears inside a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawJwk {
    #[serde(default)]
    pub kid: String,
    #[serde(default)]
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    // RSA parameters, base64url big-endian.
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    // EC parameters.
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawJwkSet {
    #[serde(default)]
    keys: Vec<RawJwk>,
}

/// One verification key from a JWKS document.
///
/// Raw fields are kept as downloaded; the decoding key for a family is
/// built on first use. Malformed material is reported when a token selects
/// the entry, not when the document is parsed.
pub struct KeyEntry {
    raw: RawJwk,
    rsa: OnceLock<DecodingKey>,
    ec: OnceLock<DecodingKey>,
}

impl std::fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyEntry")
            .field("kid", &self.raw.kid)
            .field("kty", &self.raw.kty)
            .field("alg", &self.raw.alg)
            .finish()
    }
}

impl KeyEntry {
    pub(crate) fn new(raw: RawJwk) -> Self {
        Self {
            raw,
            rsa: OnceLock::new(),
            ec: OnceLock::new(),
        }
    }

    /// Key ID this entry is looked up by.
    pub fn kid(&self) -> &str {
        &self.raw.kid
    }

    /// Algorithm the entry declares for itself, if any.
    pub fn algorithm(&self) -> Option<&str> {
        self.raw.alg.as_deref()
    }

    /// Select and build the verification key for the token's algorithm
    /// family.
    ///
    /// `ES*` selects EC material and `RS*`/`PS*` RSA material; anything
    /// else, or a family that does not fit the entry's `kty`, is
    /// [`AuthError::UnsupportedKeyType`].
    pub fn verification_key(&self, alg: Algorithm) -> Result<DecodingKey, AuthError> {
        let unsupported = || AuthError::UnsupportedKeyType {
            alg: alg_name(alg).to_owned(),
        };
        match alg {
            Algorithm::ES256 | Algorithm::ES384 => {
                if self.raw.kty != "EC" {
                    return Err(unsupported());
                }
                self.ec_key()
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => {
                if self.raw.kty != "RSA" {
                    return Err(unsupported());
                }
                self.rsa_key()
            }
            _ => Err(unsupported()),
        }
    }

    fn rsa_key(&self) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.rsa.get() {
            return Ok(key.clone());
        }
        let n = present(&self.raw.n, "RSA key has no modulus")?;
        let e = present(&self.raw.e, "RSA key has no exponent")?;
        check_base64url(n, "RSA modulus")?;
        check_base64url(e, "RSA exponent")?;
        let key = DecodingKey::from_rsa_components(n, e).map_err(|err| {
            AuthError::MissingKeyAssets {
                reason: format!("RSA components rejected: {err}"),
            }
        })?;
        let _ = self.rsa.set(key.clone());
        Ok(key)
    }

    fn ec_key(&self) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.ec.get() {
            return Ok(key.clone());
        }
        let crv = present(&self.raw.crv, "EC key has no curve")?;
        if !SUPPORTED_CURVES.contains(&crv) {
            return Err(AuthError::MissingKeyAssets {
                reason: format!("unsupported curve {crv:?}"),
            });
        }
        let x = present(&self.raw.x, "EC key has no x coordinate")?;
        let y = present(&self.raw.y, "EC key has no y coordinate")?;
        check_base64url(x, "EC x coordinate")?;
        check_base64url(y, "EC y coordinate")?;
        let key = DecodingKey::from_ec_components(x, y).map_err(|err| {
            AuthError::MissingKeyAssets {
                reason: format!("EC components rejected: {err}"),
            }
        })?;
        let _ = self.ec.set(key.clone());
        Ok(key)
    }
}

fn present<'a>(field: &'a Option<String>, reason: &str) -> Result<&'a str, AuthError> {
    match field.as_deref() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(AuthError::MissingKeyAssets {
            reason: reason.to_owned(),
        }),
    }
}

fn check_base64url(value: &str, what: &str) -> Result<(), AuthError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map(drop)
        .map_err(|err| AuthError::MissingKeyAssets {
            reason: format!("{what} is not valid base64url: {err}"),
        })
}

/// RFC 7518 name of a `jsonwebtoken` algorithm.
pub(crate) fn alg_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// Decode a JWKS document into key entries.
///
/// Entries without a `kid` are dropped since nothing can look them up.
/// Order is preserved so that duplicate kids within one document resolve
/// last-wins when merged into a snapshot.
pub(crate) fn parse_key_set(body: &str) -> Result<Vec<KeyEntry>, serde_json::Error> {
    let raw: RawJwkSet = serde_json::from_str(body)?;
    Ok(raw
        .keys
        .into_iter()
        .filter(|key| !key.kid.is_empty())
        .map(KeyEntry::new)
        .collect())
}
