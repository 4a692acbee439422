//! JWT signing and verification with asymmetric keys.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::TokenError;
use crate::config::AuthConfig;

/// Signs and verifies token payloads with the configured key pair.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Load key material for the configured algorithm.
    ///
    /// Fails with [`TokenError::Signing`] on unreadable keys or a symmetric
    /// (`HS*`) algorithm.
    pub fn from_config(config: &AuthConfig) -> Result<Self, TokenError> {
        let private = config.private_key_pem.as_bytes();
        let public = config.public_key_pem.as_bytes();
        let bad_key = |which: &str, e: jsonwebtoken::errors::Error| {
            TokenError::Signing(format!("bad {which} key for {:?}: {e}", config.algorithm))
        };

        let (encoding_key, decoding_key) = match config.algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => (
                EncodingKey::from_rsa_pem(private).map_err(|e| bad_key("private", e))?,
                DecodingKey::from_rsa_pem(public).map_err(|e| bad_key("public", e))?,
            ),
            Algorithm::ES256 | Algorithm::ES384 => (
                EncodingKey::from_ec_pem(private).map_err(|e| bad_key("private", e))?,
                DecodingKey::from_ec_pem(public).map_err(|e| bad_key("public", e))?,
            ),
            Algorithm::EdDSA => (
                EncodingKey::from_ed_pem(private).map_err(|e| bad_key("private", e))?,
                DecodingKey::from_ed_pem(public).map_err(|e| bad_key("public", e))?,
            ),
            other => {
                return Err(TokenError::Signing(format!(
                    "{other:?} is not an asymmetric algorithm"
                )));
            }
        };

        Ok(Self {
            algorithm: config.algorithm,
            issuer: config.issuer.clone(),
            encoding_key,
            decoding_key,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serialize and sign a payload. The payload carries its own `exp` and
    /// `iss` claims.
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm), payload, &self.encoding_key)
            .map_err(|e| TokenError::Signing(format!("jwt encode: {e}")))
    }

    /// Verify signature, expiry (no leeway) and issuer, then decode the
    /// payload.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}
