//! Authentication Module
//!
//! JWT-based authentication for the Turn API. A token's claims identify
//! the calling tenant (`brand_id`/`instance_id`) and the acting user's
//! tier/authentication state, which feed directly into the Eligibility
//! Evaluator's `UserContext`.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    RequestPartsExt,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use brain_cognitive::UserContext;
use brain_types::{BrandId, InstanceId};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims embedded in a Turn API bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the end-user identifier, opaque to the Brain.
    pub sub: String,
    pub brand_id: String,
    pub instance_id: String,
    pub tier: String,
    pub exp: i64,
}

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::default(),
        }
    }

    pub fn issue(&self, sub: &str, brand_id: &BrandId, instance_id: &InstanceId, tier: &str, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: sub.to_string(),
            brand_id: brand_id.as_str().to_string(),
            instance_id: instance_id.as_str().to_string(),
            tier: tier.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }
}

/// A verified caller: the tenant they're scoped to plus the
/// `UserContext` the pipeline needs for eligibility checks.
pub struct AuthenticatedCaller {
    pub brand_id: BrandId,
    pub instance_id: InstanceId,
    pub user: UserContext,
}

impl<S> FromRequestParts<S> for AuthenticatedCaller
where
    S: Send + Sync,
    std::sync::Arc<AuthService>: axum::extract::FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| (StatusCode::UNAUTHORIZED, "missing bearer token".to_string()))?;

        let auth: std::sync::Arc<AuthService> = axum::extract::FromRef::from_ref(state);
        let claims = auth
            .verify(bearer.token())
            .map_err(|e| (StatusCode::UNAUTHORIZED, format!("invalid token: {e}")))?;

        Ok(AuthenticatedCaller {
            brand_id: BrandId::from(claims.brand_id.as_str()),
            instance_id: InstanceId::from(claims.instance_id.as_str()),
            user: UserContext {
                tier: claims.tier,
                authenticated: true,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_token() {
        let auth = AuthService::new(b"test-secret");
        let token = auth
            .issue("user-1", &BrandId::from("acme"), &InstanceId::from("web"), "gold", Duration::hours(1))
            .unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.brand_id, "acme");
        assert_eq!(claims.tier, "gold");
    }

    #[test]
    fn rejects_a_token_signed_with_a_different_secret() {
        let auth_a = AuthService::new(b"secret-a");
        let auth_b = AuthService::new(b"secret-b");
        let token = auth_a
            .issue("user-1", &BrandId::from("acme"), &InstanceId::from("web"), "gold", Duration::hours(1))
            .unwrap();
        assert!(auth_b.verify(&token).is_err());
    }
}
