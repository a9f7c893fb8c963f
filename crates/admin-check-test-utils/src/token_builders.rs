//! Builder patterns for test data construction
//!
//! Provides a fluent API for signed directory-style access tokens.

use crate::crypto_fixtures::{TestRsaKey, TEST_RSA_KEY_1};
use crate::test_ids::{TEST_KEY_ID_1, TEST_SUBJECT, TEST_TENANT_ID};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for signed test access tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .with_groups(&["ADMINGROUP"])
///     .for_tenant("72f988bf-86f1-41af-91ab-2d7cd011db47")
///     .expires_in(3600)
///     .sign();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    tid: Option<String>,
    groups: Vec<String>,
    idtyp: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: i64,
    kid: Option<String>,
    key: TestRsaKey,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (valid for one hour, signed
    /// with `TEST_RSA_KEY_1` under `TEST_KEY_ID_1`).
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: TEST_SUBJECT.to_string(),
            tid: Some(TEST_TENANT_ID.to_string()),
            groups: Vec::new(),
            idtyp: None,
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            nbf: None,
            iat: now.timestamp(),
            kid: Some(TEST_KEY_ID_1.to_string()),
            key: TEST_RSA_KEY_1,
        }
    }

    /// Set the `groups` claim (order is preserved)
    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| (*g).to_string()).collect();
        self
    }

    /// Set the subject
    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the tenant id
    pub fn for_tenant(mut self, tenant_id: &str) -> Self {
        self.tid = Some(tenant_id.to_string());
        self
    }

    /// Drop the tenant id claim
    pub fn without_tenant(mut self) -> Self {
        self.tid = None;
        self
    }

    /// Mark as an application-only token (`idtyp: app`)
    pub fn app_only(mut self) -> Self {
        self.idtyp = Some("app".to_string());
        self
    }

    /// Mark as a user token (`idtyp: user`)
    pub fn user(mut self) -> Self {
        self.idtyp = Some("user".to_string());
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Drop the `exp` claim
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set the header key id
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Drop the header key id
    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    /// Sign with a different fixture key
    pub fn signed_with(mut self, key: TestRsaKey) -> Self {
        self.key = key;
        self
    }

    /// Build the claims as a JSON value
    pub fn build_claims(&self) -> Value {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("groups".to_string(), json!(self.groups));
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(tid) = &self.tid {
            claims.insert("tid".to_string(), json!(tid));
        }
        if let Some(idtyp) = &self.idtyp {
            claims.insert("idtyp".to_string(), json!(idtyp));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        Value::Object(claims)
    }

    fn header(&self, alg: Algorithm) -> Header {
        let mut header = Header::new(alg);
        header.kid = self.kid.clone();
        header
    }

    /// Sign as an RS256 token
    pub fn sign(self) -> String {
        encode(
            &self.header(Algorithm::RS256),
            &self.build_claims(),
            &self.key.encoding_key(),
        )
        .expect("test token signs")
    }

    /// Sign as an HS256 token with a shared secret (an unsupported algorithm)
    pub fn sign_hs256(self, secret: &[u8]) -> String {
        encode(
            &self.header(Algorithm::HS256),
            &self.build_claims(),
            &EncodingKey::from_secret(secret),
        )
        .expect("test token signs")
    }

    /// Produce an unsigned token with an arbitrary `alg` header value
    pub fn unsigned_with_alg(self, alg: &str) -> String {
        let mut header = json!({ "alg": alg, "typ": "JWT" });
        if let Some(kid) = &self.kid {
            header["kid"] = json!(kid);
        }
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.build_claims().to_string())
        )
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the payload segment of a signed token, keeping header and
/// signature (a tampered token).
pub fn tamper_payload(token: &str, claims: &Value) -> String {
    let mut parts = token.split('.');
    let header = parts.next().expect("token has a header");
    let _payload = parts.next().expect("token has a payload");
    let signature = parts.next().expect("token has a signature");
    format!(
        "{header}.{}.{signature}",
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}
