//! Authentication: credential hashing, token codec and token lifecycle.

pub mod bearer;
pub mod jwt;
pub mod password;
pub mod queries;
pub mod sweeper;
pub mod tokens;

use thiserror::Error;

use crate::models::token::TokenType;
use crate::store::StoreError;

/// Token codec failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid token issuer")]
    InvalidIssuer,

    #[error("Expected a {expected} token")]
    WrongType { expected: TokenType },
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is forbidden")]
    AccountForbidden,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Server error: {0}")]
    Server(String),
}
