//! Bearer token verification.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use taskhub_core::UserId;
use thiserror::Error;

/// Token verification failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token is malformed, forged, or names no user.
    #[error("invalid token: {0}")]
    Invalid(String),
    /// The token was valid but has expired.
    #[error("token expired")]
    Expired,
}

/// An authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// User the connection belongs to.
    pub user_id: UserId,
    /// Display name, if the token carries one.
    pub username: Option<String>,
    /// Email, if the token carries one.
    pub email: Option<String>,
}

impl Identity {
    /// Identity with only a user id.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            username: None,
            email: None,
        }
    }
}

/// Maps a bearer token to an identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Verify `token` and return who it belongs to.
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError>;
}

/// JWT claims accepted and issued by [`JwtIdentityResolver`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Registered subject claim, used when `user_id` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// HS256 JWT verification with a shared secret.
pub struct JwtIdentityResolver {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    /// Resolver for tokens signed with `secret`.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Sign a token for `identity` valid for `ttl`.
    pub fn issue(&self, identity: &Identity, ttl: Duration) -> Result<String, AuthError> {
        let exp = chrono::Utc::now().timestamp().unsigned_abs() + ttl.as_secs();
        self.issue_claims(&Claims {
            user_id: Some(identity.user_id.to_string()),
            sub: None,
            username: identity.username.clone(),
            email: identity.email.clone(),
            exp,
        })
    }

    /// Sign arbitrary claims.
    pub fn issue_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Invalid(e.to_string()))
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            })?;
        let claims = data.claims;
        let user_id = claims
            .user_id
            .filter(|id| !id.is_empty())
            .or(claims.sub.filter(|id| !id.is_empty()))
            .ok_or_else(|| AuthError::Invalid("token has no user id".into()))?;
        Ok(Identity {
            user_id: UserId::from(user_id),
            username: claims.username,
            email: claims.email,
        })
    }
}

/// Fixed token table for tests and local development.
#[derive(Debug, Default)]
pub struct StaticTokens {
    tokens: RwLock<HashMap<String, Identity>>,
}

impl StaticTokens {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(self, token: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        self.insert(token, Identity::new(user_id));
        self
    }

    /// Accept `token` as `identity`.
    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        let _ = self.tokens.write().insert(token.into(), identity);
    }

    /// Stop accepting `token`.
    pub fn revoke(&self, token: &str) {
        let _ = self.tokens.write().remove(token);
    }
}

#[async_trait]
impl IdentityResolver for StaticTokens {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::Invalid("unknown token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn resolver() -> JwtIdentityResolver {
        JwtIdentityResolver::new(b"test-secret")
    }

    #[tokio::test]
    async fn issued_token_resolves() {
        let jwt = resolver();
        let identity = Identity {
            user_id: UserId::from("u1"),
            username: Some("ada".into()),
            email: Some("ada@example.com".into()),
        };
        let token = jwt.issue(&identity, Duration::from_secs(60)).unwrap();
        assert_eq!(jwt.resolve(&token).await.unwrap(), identity);
    }

    #[tokio::test]
    async fn sub_claim_is_accepted() {
        #[derive(Serialize)]
        struct SubClaims {
            sub: String,
            exp: u64,
        }
        let exp = chrono::Utc::now().timestamp().unsigned_abs() + 60;
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &SubClaims { sub: "u2".into(), exp },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        let identity = resolver().resolve(&token).await.unwrap();
        assert_eq!(identity.user_id.as_str(), "u2");
    }

    #[tokio::test]
    async fn user_id_and_sub_together_are_accepted() {
        let jwt = resolver();
        let exp = chrono::Utc::now().timestamp().unsigned_abs() + 60;
        let token = jwt
            .issue_claims(&Claims {
                user_id: Some("u1".into()),
                sub: Some("subject-1".into()),
                username: Some("ada".into()),
                email: None,
                exp,
            })
            .unwrap();
        let identity = jwt.resolve(&token).await.unwrap();
        assert_eq!(identity.user_id.as_str(), "u1");
        assert_eq!(identity.username.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn empty_user_id_falls_back_to_sub() {
        let jwt = resolver();
        let exp = chrono::Utc::now().timestamp().unsigned_abs() + 60;
        let token = jwt
            .issue_claims(&Claims {
                user_id: Some(String::new()),
                sub: Some("u3".into()),
                username: None,
                email: None,
                exp,
            })
            .unwrap();
        assert_eq!(jwt.resolve(&token).await.unwrap().user_id.as_str(), "u3");
    }

    #[tokio::test]
    async fn token_without_any_user_claim_is_invalid() {
        let jwt = resolver();
        let exp = chrono::Utc::now().timestamp().unsigned_abs() + 60;
        let token = jwt
            .issue_claims(&Claims {
                user_id: None,
                sub: None,
                username: Some("ada".into()),
                email: None,
                exp,
            })
            .unwrap();
        assert_matches!(jwt.resolve(&token).await, Err(AuthError::Invalid(_)));
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let token = JwtIdentityResolver::new(b"other")
            .issue(&Identity::new("u1"), Duration::from_secs(60))
            .unwrap();
        assert_matches!(resolver().resolve(&token).await, Err(AuthError::Invalid(_)));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let jwt = resolver();
        let exp = chrono::Utc::now().timestamp().unsigned_abs() - 3600;
        let token = jwt
            .issue_claims(&Claims {
                user_id: Some("u1".into()),
                sub: None,
                username: None,
                email: None,
                exp,
            })
            .unwrap();
        assert_matches!(jwt.resolve(&token).await, Err(AuthError::Expired));
    }

    #[tokio::test]
    async fn empty_user_id_is_invalid() {
        let jwt = resolver();
        let token = jwt
            .issue(&Identity::new(""), Duration::from_secs(60))
            .unwrap();
        assert_matches!(jwt.resolve(&token).await, Err(AuthError::Invalid(_)));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        assert_matches!(
            resolver().resolve("not.a.jwt").await,
            Err(AuthError::Invalid(_))
        );
    }

    #[tokio::test]
    async fn static_tokens_resolve_and_revoke() {
        let tokens = StaticTokens::new().with("tok-a", "alice");
        assert_eq!(tokens.resolve("tok-a").await.unwrap().user_id.as_str(), "alice");
        tokens.revoke("tok-a");
        assert_matches!(tokens.resolve("tok-a").await, Err(AuthError::Invalid(_)));
    }
}
