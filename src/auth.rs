//! Access-token verification and role gating.
//!
//! Tokens are HS256 JWTs minted by the account service; this side only verifies
//! them. The `role` claim is authoritative.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "admin" => Ok(Self::Admin),
            other => Err(ApiError::Forbidden(format!("unknown role {:?}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: u64,
}

pub struct AuthKeys {
    decoding: DecodingKey,
    validation: Validation,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| ApiError::Unauthorized(format!("invalid token: {}", e)))
    }

    /// Verifies `token` and resolves the effective role. A requested role may
    /// narrow the token's role but never raise it.
    pub fn authenticate(
        &self,
        token: Option<&str>,
        requested_role: Option<&str>,
    ) -> Result<AuthUser, ApiError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("missing token".to_string()))?;
        let claims = self.verify(token)?;

        let granted: Role = claims
            .role
            .as_deref()
            .ok_or_else(|| ApiError::Forbidden("token carries no role".to_string()))?
            .parse()?;

        let role = match requested_role.filter(|r| !r.is_empty()) {
            Some(r) => {
                let requested: Role = r.parse()?;
                if requested > granted {
                    return Err(ApiError::Forbidden(format!(
                        "role {} exceeds granted role {}",
                        requested, granted
                    )));
                }
                requested
            }
            None => granted,
        };

        Ok(AuthUser {
            subject: claims.sub,
            role,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
    pub role: Role,
}

impl AuthUser {
    pub fn require(&self, min: Role) -> Result<(), ApiError> {
        if self.role >= min {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "{} role required, have {}",
                min, self.role
            )))
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state.auth.authenticate(bearer_token(&parts.headers), None)
    }
}

#[cfg(test)]
pub fn mint_token(secret: &str, sub: &str, role: Option<&str>, ttl_secs: i64) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};
    let claims = Claims {
        sub: sub.to_string(),
        role: role.map(str::to_string),
        exp: (chrono::Utc::now().timestamp() + ttl_secs).max(0) as u64,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    const SECRET: &str = "test-secret";

    #[test]
    fn roles_are_hierarchical() {
        assert!(Role::Viewer < Role::Editor);
        assert!(Role::Editor < Role::Admin);
        let editor = AuthUser {
            subject: "u".to_string(),
            role: Role::Editor,
        };
        assert!(editor.require(Role::Viewer).is_ok());
        assert!(editor.require(Role::Editor).is_ok());
        assert_eq!(
            editor.require(Role::Admin).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn valid_token_yields_claim_role() {
        let keys = AuthKeys::new(SECRET);
        let token = mint_token(SECRET, "alice", Some("editor"), 600);
        let user = keys.authenticate(Some(&token), None).unwrap();
        assert_eq!(user.subject, "alice");
        assert_eq!(user.role, Role::Editor);
    }

    #[test]
    fn missing_bad_and_expired_tokens_are_401() {
        let keys = AuthKeys::new(SECRET);
        let wrong_key = mint_token("other", "bob", Some("admin"), 600);
        let expired = mint_token(SECRET, "bob", Some("admin"), -3600);
        for token in [None, Some(""), Some("garbage"), Some(wrong_key.as_str()), Some(expired.as_str())] {
            let err = keys.authenticate(token, None).unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED, "{:?}", token);
        }
    }

    #[test]
    fn role_problems_are_403() {
        let keys = AuthKeys::new(SECRET);
        let no_role = mint_token(SECRET, "carol", None, 600);
        let odd_role = mint_token(SECRET, "carol", Some("superuser"), 600);
        let viewer = mint_token(SECRET, "carol", Some("viewer"), 600);
        for (token, requested) in [
            (no_role.as_str(), None),
            (odd_role.as_str(), None),
            (viewer.as_str(), Some("admin")),
        ] {
            let err = keys.authenticate(Some(token), requested).unwrap_err();
            assert_eq!(err.status(), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn requested_role_can_narrow() {
        let keys = AuthKeys::new(SECRET);
        let admin = mint_token(SECRET, "dave", Some("admin"), 600);
        let user = keys.authenticate(Some(&admin), Some("viewer")).unwrap();
        assert_eq!(user.role, Role::Viewer);
    }
}
