//! Bearer token authentication
//!
//! Tokens are HS256 JWTs whose claims name the user (`sub`), the tenant
//! (`org`) and the role. A valid token becomes the [`TenantContext`] of the
//! request.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use core_kernel::{OrganizationId, Role, TenantContext, UserId};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Organization the user acts for
    pub org: Uuid,
    /// User's role within the organization
    pub role: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

impl Claims {
    /// Tenant identity carried by the token
    pub fn tenant_context(&self) -> Result<TenantContext, AuthError> {
        let role: Role = self.role.parse().map_err(|_| AuthError::UnknownRole(self.role.clone()))?;
        Ok(TenantContext::new(
            OrganizationId::from_uuid(self.org),
            UserId::from_uuid(self.sub),
            role,
        ))
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No token provided")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Unknown role '{0}'")]
    UnknownRole(String),
}

/// Creates a new JWT token
///
/// # Arguments
///
/// * `ctx` - Identity to encode
/// * `secret` - JWT secret key
/// * `expiration_secs` - Token validity in seconds
pub fn create_token(ctx: &TenantContext, secret: &str, expiration_secs: u64) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs.min(u64::from(u32::MAX)) as i64);

    let claims = Claims {
        sub: *ctx.user_id.as_uuid(),
        org: *ctx.organization_id.as_uuid(),
        role: ctx.role.as_str().to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Validates a JWT token
///
/// # Arguments
///
/// * `token` - The JWT token to validate
/// * `secret` - JWT secret key
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Extracts the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip() {
        let ctx = TenantContext::new(OrganizationId::new(), UserId::new(), Role::Processor);
        let token = create_token(&ctx, SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.tenant_context().unwrap(), ctx);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let ctx = TenantContext::new(OrganizationId::new(), UserId::new(), Role::Admin);
        let token = create_token(&ctx, SECRET, 60).unwrap();
        assert!(matches!(validate_token(&token, "other"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_token() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            org: Uuid::new_v4(),
            role: "admin".into(),
            exp: Utc::now().timestamp() - 3600,
            iat: Utc::now().timestamp() - 7200,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_unknown_role() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            org: Uuid::new_v4(),
            role: "auditor".into(),
            exp: 0,
            iat: 0,
        };
        assert!(matches!(claims.tenant_context(), Err(AuthError::UnknownRole(_))));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(matches!(bearer_token(Some("Basic abc")), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(Some("Bearer ")), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(None), Err(AuthError::MissingToken)));
    }
}
