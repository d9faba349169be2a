//! Shared test infrastructure: a wiremock-backed JWKS endpoint plus key
//! and token builders.

#![allow(dead_code)]

use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A stub JWKS endpoint.
pub struct MockJwksServer {
    pub server: MockServer,
    pub url: String,
}

impl MockJwksServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let url = format!("{}/jwks", server.uri());
        Self { server, url }
    }

    /// Serve the given keys for every subsequent GET.
    pub async fn serve_keys(&self, keys: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .mount(&self.server)
            .await;
    }

    /// Serve the given keys for the next `times` GETs only, falling
    /// through to later-mounted mocks afterwards.
    pub async fn serve_keys_up_to(&self, keys: Vec<Value>, times: u64) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Serve a bare status code for every subsequent GET.
    pub async fn serve_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Serve the given keys with a response delay.
    pub async fn serve_keys_with_delay(&self, keys: Vec<Value>, delay: std::time::Duration) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "keys": keys }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Number of GETs this endpoint has served so far.
    pub async fn hits(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }
}

pub struct RsaTestKey {
    pub pem: String,
    pub n: String,
    pub e: String,
}

/// Process-wide RSA test key; generation is expensive so it happens once.
pub fn rsa_test_key() -> &'static RsaTestKey {
    static KEY: OnceLock<RsaTestKey> = OnceLock::new();
    KEY.get_or_init(|| {
        use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;
        use rsa::{RsaPrivateKey, RsaPublicKey};

        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("generate RSA key");
        let public = RsaPublicKey::from(&private);
        RsaTestKey {
            pem: private
                .to_pkcs1_pem(LineEnding::LF)
                .expect("encode RSA key")
                .to_string(),
            n: URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        }
    })
}

pub struct EcTestKey {
    pub pem: String,
    pub x: String,
    pub y: String,
}

/// Process-wide P-256 test key.
pub fn ec_test_key() -> &'static EcTestKey {
    static KEY: OnceLock<EcTestKey> = OnceLock::new();
    KEY.get_or_init(|| {
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        use p256::pkcs8::{EncodePrivateKey, LineEnding};

        let secret = p256::SecretKey::random(&mut rand::thread_rng());
        let point = secret.public_key().to_encoded_point(false);
        EcTestKey {
            pem: secret
                .to_pkcs8_pem(LineEnding::LF)
                .expect("encode EC key")
                .to_string(),
            x: URL_SAFE_NO_PAD.encode(point.x().expect("x coordinate")),
            y: URL_SAFE_NO_PAD.encode(point.y().expect("y coordinate")),
        }
    })
}

/// Process-wide P-384 test key.
pub fn ec384_test_key() -> &'static EcTestKey {
    static KEY: OnceLock<EcTestKey> = OnceLock::new();
    KEY.get_or_init(|| {
        use p384::elliptic_curve::sec1::ToEncodedPoint;
        use p384::pkcs8::{EncodePrivateKey, LineEnding};

        let secret = p384::SecretKey::random(&mut rand::thread_rng());
        let point = secret.public_key().to_encoded_point(false);
        EcTestKey {
            pem: secret
                .to_pkcs8_pem(LineEnding::LF)
                .expect("encode EC key")
                .to_string(),
            x: URL_SAFE_NO_PAD.encode(point.x().expect("x coordinate")),
            y: URL_SAFE_NO_PAD.encode(point.y().expect("y coordinate")),
        }
    })
}

/// Sign a token with an arbitrary header `kid`.
pub fn sign_token(alg: Algorithm, kid: Option<&str>, claims: &Value, key: &EncodingKey) -> String {
    let mut header = Header::new(alg);
    header.kid = kid.map(str::to_owned);
    encode(&header, claims, key).expect("sign test token")
}

pub fn hs256_token(secret: &[u8], claims: &Value) -> String {
    sign_token(
        Algorithm::HS256,
        None,
        claims,
        &EncodingKey::from_secret(secret),
    )
}

pub fn hs384_token(secret: &[u8], claims: &Value) -> String {
    sign_token(
        Algorithm::HS384,
        None,
        claims,
        &EncodingKey::from_secret(secret),
    )
}

pub fn hs512_token(secret: &[u8], claims: &Value) -> String {
    sign_token(
        Algorithm::HS512,
        None,
        claims,
        &EncodingKey::from_secret(secret),
    )
}

pub fn rsa_token(alg: Algorithm, kid: &str, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(rsa_test_key().pem.as_bytes()).expect("RSA encoding key");
    sign_token(alg, Some(kid), claims, &key)
}

pub fn es256_token(kid: &str, claims: &Value) -> String {
    let key = EncodingKey::from_ec_pem(ec_test_key().pem.as_bytes()).expect("EC encoding key");
    sign_token(Algorithm::ES256, Some(kid), claims, &key)
}

pub fn es384_token(kid: &str, claims: &Value) -> String {
    let key = EncodingKey::from_ec_pem(ec384_test_key().pem.as_bytes()).expect("EC encoding key");
    sign_token(Algorithm::ES384, Some(kid), claims, &key)
}

/// JWKS entry for the process RSA key, with an optional declared `alg`.
pub fn rsa_jwk(kid: &str, alg: Option<&str>) -> Value {
    let key = rsa_test_key();
    let mut jwk = json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "n": key.n,
        "e": key.e,
    });
    if let Some(alg) = alg {
        jwk["alg"] = json!(alg);
    }
    jwk
}

/// JWKS entry for the process P-256 key.
pub fn ec_jwk(kid: &str) -> Value {
    let key = ec_test_key();
    json!({
        "kty": "EC",
        "kid": kid,
        "use": "sig",
        "crv": "P-256",
        "x": key.x,
        "y": key.y,
    })
}

/// JWKS entry for the process P-384 key.
pub fn ec384_jwk(kid: &str) -> Value {
    let key = ec384_test_key();
    json!({
        "kty": "EC",
        "kid": kid,
        "use": "sig",
        "crv": "P-384",
        "x": key.x,
        "y": key.y,
    })
}

/// The claims most tests sign.
pub fn subject_claims() -> Value {
    json!({ "sub": "1234567890", "name": "John Doe", "iat": 1516239022 })
}
