// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity verification at the login boundary.
//!
//! A login presents an identity-provider ID token, a client-supplied
//! profile payload, or both. The token wins when it verifies; otherwise the
//! profile is used if fallback is enabled. With neither, login fails and no
//! user is created.
//!
//! ## Verification Modes
//!
//! - **JWKS** (`IDP_JWKS_URL` set): RS/ES signatures checked against the
//!   provider key set
//! - **Shared secret** (`IDP_SHARED_SECRET` set): HS256 signatures
//! - **Insecure** (`dev` feature only, nothing configured): structure and
//!   expiry only, no signature check

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::email::{is_plausible_email, normalize_email};
use super::error::AuthError;
use super::jwks::JwksManager;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Where a verified identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Token,
    Fallback,
}

/// Identity accepted at the login boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Normalized email
    pub email: String,
    pub name: String,
    pub external_id: Option<String>,
    pub source: IdentitySource,
}

/// Client-supplied identity used when no token verifies.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FallbackProfile {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub external_id: Option<String>,
}

impl FallbackProfile {
    fn into_identity(self) -> Result<VerifiedIdentity, AuthError> {
        let email = normalize_email(&self.email);
        if !is_plausible_email(&email) {
            return Err(AuthError::InvalidIdentity("email is not valid".to_string()));
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AuthError::InvalidIdentity("name is required".to_string()));
        }
        Ok(VerifiedIdentity {
            email,
            name: name.to_string(),
            external_id: self.external_id.filter(|id| !id.trim().is_empty()),
            source: IdentitySource::Fallback,
        })
    }
}

/// Claims read from an identity-provider ID token.
#[derive(Debug, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Subject (provider user ID)
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Expiration timestamp
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience (validated by jsonwebtoken, not read directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
}

impl IdTokenClaims {
    fn into_identity(self) -> Result<VerifiedIdentity, AuthError> {
        let email = self
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| is_plausible_email(e))
            .ok_or(AuthError::MissingEmailClaim)?;

        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(VerifiedIdentity {
            email,
            name,
            external_id: Some(self.sub),
            source: IdentitySource::Token,
        })
    }
}

/// How ID tokens are verified.
#[derive(Clone)]
pub enum VerifierMode {
    Jwks(JwksManager),
    SharedSecret(DecodingKey),
    /// Decode without signature verification.
    #[cfg(feature = "dev")]
    Insecure,
    /// Tokens are always rejected; only the fallback profile can log in.
    Disabled,
}

/// Verifies login identities.
#[derive(Clone)]
pub struct IdentityVerifier {
    mode: VerifierMode,
    issuer: Option<String>,
    audience: Option<String>,
    allow_fallback: bool,
}

impl IdentityVerifier {
    pub fn new(mode: VerifierMode) -> Self {
        Self {
            mode,
            issuer: None,
            audience: None,
            allow_fallback: true,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = allow;
        self
    }

    /// JWKS manager, when running in JWKS mode.
    pub fn jwks(&self) -> Option<&JwksManager> {
        match &self.mode {
            VerifierMode::Jwks(jwks) => Some(jwks),
            _ => None,
        }
    }

    /// Accept a login: a verified token, else the fallback profile.
    pub async fn authenticate(
        &self,
        id_token: Option<&str>,
        profile: Option<FallbackProfile>,
    ) -> Result<VerifiedIdentity, AuthError> {
        let profile = profile.filter(|_| self.allow_fallback);

        let Some(token) = id_token.map(str::trim).filter(|t| !t.is_empty()) else {
            return match profile {
                Some(profile) => profile.into_identity(),
                None => Err(AuthError::MissingIdentity),
            };
        };

        match self.verify_token(token).await {
            Ok(identity) => Ok(identity),
            Err(err) => match profile {
                Some(profile) => {
                    tracing::warn!(
                        error_code = err.error_code(),
                        "Identity token rejected, using fallback profile"
                    );
                    profile.into_identity()
                }
                None => Err(err),
            },
        }
    }

    /// Verify an ID token and extract the identity it carries.
    pub async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let claims = match &self.mode {
            VerifierMode::Jwks(jwks) => {
                let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
                let (key, algorithm) = match &header.kid {
                    Some(kid) => jwks.get_decoding_key(kid).await?,
                    None => jwks.get_any_decoding_key().await?,
                };
                self.decode_verified(token, &key, algorithm)?
            }
            VerifierMode::SharedSecret(key) => self.decode_verified(token, key, Algorithm::HS256)?,
            #[cfg(feature = "dev")]
            VerifierMode::Insecure => decode_insecure(token)?,
            VerifierMode::Disabled => return Err(AuthError::ProviderNotConfigured),
        };
        claims.into_identity()
    }

    fn decode_verified(
        &self,
        token: &str,
        key: &DecodingKey,
        algorithm: Algorithm,
    ) -> Result<IdTokenClaims, AuthError> {
        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        decode::<IdTokenClaims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::InvalidAudience,
                jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken,
            })
    }
}

/// Development decode (no signature check).
#[cfg(feature = "dev")]
fn decode_insecure(token: &str) -> Result<IdTokenClaims, AuthError> {
    let data = jsonwebtoken::dangerous::insecure_decode::<IdTokenClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?;

    let now = chrono::Utc::now().timestamp();
    if data.claims.exp > 0 && data.claims.exp < now - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"test-shared-secret";

    fn verifier() -> IdentityVerifier {
        IdentityVerifier::new(VerifierMode::SharedSecret(DecodingKey::from_secret(SECRET)))
            .with_issuer("https://idp.example")
    }

    fn token(email: Option<&str>, exp_offset: i64, iss: &str) -> String {
        let claims = IdTokenClaims {
            sub: "idp-sub-42".into(),
            email: email.map(str::to_string),
            name: Some("Dana Reyes".into()),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iss: Some(iss.into()),
            aud: None,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn profile(email: &str) -> FallbackProfile {
        FallbackProfile {
            email: email.into(),
            name: "Fallback User".into(),
            external_id: None,
        }
    }

    #[tokio::test]
    async fn valid_token_yields_identity() {
        let identity = verifier()
            .verify_token(&token(Some("Dana@Uni.Example"), 3600, "https://idp.example"))
            .await
            .unwrap();
        assert_eq!(identity.email, "dana@uni.example");
        assert_eq!(identity.name, "Dana Reyes");
        assert_eq!(identity.external_id.as_deref(), Some("idp-sub-42"));
        assert_eq!(identity.source, IdentitySource::Token);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let err = verifier()
            .verify_token(&token(Some("dana@uni.example"), -3600, "https://idp.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn wrong_issuer_is_rejected() {
        let err = verifier()
            .verify_token(&token(Some("dana@uni.example"), 3600, "https://evil.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidIssuer));
    }

    #[tokio::test]
    async fn token_without_email_is_rejected() {
        let err = verifier()
            .verify_token(&token(None, 3600, "https://idp.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingEmailClaim));
    }

    #[tokio::test]
    async fn bad_token_falls_back_to_profile() {
        let identity = verifier()
            .authenticate(Some("garbage"), Some(profile("Walk.In@Uni.Example")))
            .await
            .unwrap();
        assert_eq!(identity.email, "walk.in@uni.example");
        assert_eq!(identity.source, IdentitySource::Fallback);
    }

    #[tokio::test]
    async fn bad_token_without_profile_fails() {
        let err = verifier().authenticate(Some("garbage"), None).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedToken));
    }

    #[tokio::test]
    async fn nothing_presented_fails() {
        let err = verifier().authenticate(None, None).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingIdentity));
    }

    #[tokio::test]
    async fn fallback_can_be_disabled() {
        let err = verifier()
            .with_fallback(false)
            .authenticate(None, Some(profile("walk.in@uni.example")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingIdentity));
    }

    #[tokio::test]
    async fn fallback_profile_is_validated() {
        let err = verifier()
            .authenticate(None, Some(profile("not-an-email")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidIdentity(_)));

        let mut nameless = profile("ok@uni.example");
        nameless.name = "   ".into();
        let err = verifier().authenticate(None, Some(nameless)).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidIdentity(_)));
    }

    #[tokio::test]
    async fn disabled_mode_rejects_tokens() {
        let err = IdentityVerifier::new(VerifierMode::Disabled)
            .verify_token("anything")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProviderNotConfigured));
    }
}
