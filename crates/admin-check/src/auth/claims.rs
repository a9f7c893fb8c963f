//! Access token claims and the parsed token handed to the resolver.

use crate::errors::TokenError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Claims read from a directory-issued access token.
///
/// Only the claims used for admin resolution and validity are modelled;
/// unknown claims are ignored. The `sub` field is redacted in Debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject - redacted in Debug output.
    #[serde(default)]
    pub sub: String,

    /// Tenant the token was issued in.
    #[serde(default)]
    pub tid: String,

    /// Group object ids, in the order the issuer listed them.
    #[serde(default)]
    pub groups: Vec<String>,

    /// Identity type (`app` for application-only tokens, `user` otherwise).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idtyp: Option<String>,

    /// Expiration timestamp (Unix epoch seconds). A token without one does
    /// not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl fmt::Debug for AccessTokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenClaims")
            .field("sub", &"[REDACTED]")
            .field("tid", &self.tid)
            .field("groups", &self.groups)
            .field("idtyp", &self.idtyp)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .finish()
    }
}

/// Kind of principal a token was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalType {
    App,
    User,
    Unknown,
}

impl PrincipalType {
    fn from_claim(idtyp: Option<&str>) -> Self {
        match idtyp.map(str::to_ascii_lowercase).as_deref() {
            Some("app") => PrincipalType::App,
            Some("user") => PrincipalType::User,
            _ => PrincipalType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalType::App => "app",
            PrincipalType::User => "user",
            PrincipalType::Unknown => "unknown",
        }
    }
}

/// A verified token. Immutable once constructed.
#[derive(Clone)]
pub struct ParsedToken {
    raw_payload: Vec<u8>,
    group_ids: Vec<String>,
    tenant_id: String,
    subject_id: String,
    principal_type: PrincipalType,
}

impl ParsedToken {
    pub(crate) fn new(raw_payload: Vec<u8>, claims: AccessTokenClaims) -> Self {
        let principal_type = PrincipalType::from_claim(claims.idtyp.as_deref());
        Self {
            raw_payload,
            group_ids: claims.groups,
            tenant_id: claims.tid,
            subject_id: claims.sub,
            principal_type,
        }
    }

    /// Decoded payload JSON exactly as signed.
    pub fn raw_payload(&self) -> &[u8] {
        &self.raw_payload
    }

    /// Group ids in token claim order; possibly empty.
    pub fn group_ids(&self) -> &[String] {
        &self.group_ids
    }

    /// The first group id.
    ///
    /// # Errors
    ///
    /// `NoGroups` when the token lists no groups.
    pub fn first_group(&self) -> Result<&str, TokenError> {
        self.group_ids
            .first()
            .map(String::as_str)
            .ok_or(TokenError::NoGroups)
    }

    /// Tenant id; empty when the token carries none.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn principal_type(&self) -> PrincipalType {
        self.principal_type
    }
}

impl fmt::Debug for ParsedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedToken")
            .field("group_ids", &self.group_ids)
            .field("tenant_id", &self.tenant_id)
            .field("subject_id", &"[REDACTED]")
            .field("principal_type", &self.principal_type)
            .finish_non_exhaustive()
    }
}
