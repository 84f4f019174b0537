//! Bearer-token verification against the issuer's public key.
//!
//! The gateway never signs tokens. The issuing collaborator holds the
//! private key; this module loads the matching public key once at startup
//! and verifies signature and expiry on every request. Verification is a
//! pure function of token and key — no mutable state, safe to call from
//! arbitrarily many requests concurrently.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use taskwire_proto::error::ErrorKind;

/// Errors that can occur during credential verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No bearer token was supplied.
    #[error("missing bearer token")]
    MissingToken,
    /// The token is malformed, carries a bad signature, or lacks a
    /// required claim.
    #[error("token rejected: {0}")]
    InvalidToken(String),
    /// The token's expiry timestamp has passed.
    #[error("token expired")]
    Expired,
    /// The configured algorithm name is not recognized.
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The configured public key could not be parsed.
    #[error("invalid public key: {0}")]
    InvalidKey(String),
}

impl AuthError {
    /// The stable error kind surfaced to clients. Every verification
    /// failure is `UNAUTHENTICATED`; key and algorithm errors only occur
    /// at startup and never reach a client.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Unauthenticated
    }
}

/// The verified identity claim carried by a bearer token.
///
/// Constructed once per request or connection by [`TokenVerifier::verify`]
/// and attached to the request as a side channel; never trusted if
/// re-supplied by the client, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Role, e.g. `"member"` or `"admin"`.
    pub role: String,
    /// Team the user belongs to.
    pub team_id: String,
    /// Expiry (unix seconds).
    pub exp: u64,
}

impl Claims {
    /// Whether this identity may access topics outside its own team.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Parses an algorithm name like `"RS256"` or `"ES256"`.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] for unknown names.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, AuthError> {
    name.parse()
        .map_err(|_| AuthError::UnsupportedAlgorithm(name.to_string()))
}

/// Verifies bearer tokens against a single public key loaded at startup.
#[derive(Debug)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Builds a verifier from a PEM-encoded public key.
    ///
    /// The PEM flavor is chosen by the algorithm family: RSA for `RS*`/`PS*`,
    /// EC for `ES*`, Ed25519 for `EdDSA`. Expiry is validated with zero
    /// leeway, and tokens without an `exp` claim are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKey`] if the PEM cannot be parsed, or
    /// [`AuthError::UnsupportedAlgorithm`] for symmetric algorithms (the
    /// gateway only accepts asymmetric signatures).
    pub fn from_pem(pem: &[u8], algorithm: Algorithm) -> Result<Self, AuthError> {
        let key = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(AuthError::UnsupportedAlgorithm(format!("{algorithm:?}")));
            }
        }
        .map_err(|e| AuthError::InvalidKey(e.to_string()))?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self { key, validation })
    }

    /// Verifies a token and returns its decoded claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Expired`] when the expiry has passed, and
    /// [`AuthError::InvalidToken`] for every other rejection (malformed
    /// token, bad signature, missing claim).
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim)
}
