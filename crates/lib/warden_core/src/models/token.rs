//! Token payloads and persisted token records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminates access from refresh tokens (the `type` claim).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenType::Access),
            "refresh" => Ok(TokenType::Refresh),
            other => Err(format!("unknown token type '{other}'")),
        }
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenPayload {
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Token id, unique per issued token.
    pub id: Uuid,
    /// Subject account id.
    pub uuid: Uuid,
    /// Roles snapshot taken at issuance.
    pub roles: Vec<String>,
    /// Expiry (unix seconds).
    pub exp: i64,
    pub iss: String,
}

impl AccessTokenPayload {
    /// Identity used before any token is presented.
    pub fn anonymous() -> Self {
        Self {
            token_type: TokenType::Access,
            id: Uuid::nil(),
            uuid: Uuid::nil(),
            roles: Vec::new(),
            exp: 0,
            iss: String::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.uuid.is_nil()
    }
}

impl Default for AccessTokenPayload {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Claims carried by a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenPayload {
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub id: Uuid,
    pub uuid: Uuid,
    pub roles: Vec<String>,
    pub exp: i64,
    pub iss: String,
    /// Id of the paired access token.
    pub associated: Uuid,
}

/// A signed token together with its decoded payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedToken<P> {
    pub token: String,
    pub payload: P,
}

/// An access/refresh pair produced by one issuance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPackage {
    pub access_token: SignedToken<AccessTokenPayload>,
    pub refresh_token: SignedToken<RefreshTokenPayload>,
}

/// Subject the token pair is issued for.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub id: Uuid,
    pub roles: Vec<String>,
}

/// Per-issuance lifetime overrides, in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryOverrides {
    pub access_token_lifetime_secs: Option<i64>,
    pub refresh_token_lifetime_secs: Option<i64>,
}

/// Lightweight persisted record used for revocation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub id: Uuid,
    pub account: Uuid,
    pub token_type: TokenType,
    pub associated: Option<Uuid>,
    pub expired_at: DateTime<Utc>,
    pub device_info: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_payload_is_sentinel() {
        let p = AccessTokenPayload::anonymous();
        assert!(p.is_anonymous());
        assert!(p.roles.is_empty());
        assert_eq!(p.exp, 0);
        assert!(p.iss.is_empty());
    }

    #[test]
    fn payload_serializes_type_claim() {
        let p = AccessTokenPayload {
            token_type: TokenType::Access,
            id: Uuid::nil(),
            uuid: Uuid::nil(),
            roles: vec!["authorized".into()],
            exp: 10,
            iss: "warden".into(),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "access");
        assert_eq!(json["roles"][0], "authorized");
    }
}
