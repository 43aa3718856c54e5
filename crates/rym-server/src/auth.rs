//! Access-token verification and request extractors.
//!
//! Tokens are HS256 JWTs issued by the Steam login flow. REST requests carry
//! them as `Authorization: Bearer <token>`; the WebSocket upgrade carries them
//! as a `token` query parameter because browsers cannot set headers there.
//!
//! A token names a player by Steam ID. The database ID is looked up on every
//! request, and a player seen for the first time is stored on the spot (see
//! [`AppState::resolve_player`]).

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rym_core::UserId;
use rym_store::UserRow;
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::server::AppState;

/// Default token lifetime (7 days).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Token payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Database user ID at issue time. Informational; requests resolve the
    /// player by `steam_id`.
    #[serde(default)]
    pub uid: u64,
    /// Steam 64-bit ID.
    pub steam_id: String,
    /// Display name at issue time.
    pub name: String,
    /// Expiry, unix seconds.
    pub exp: u64,
}

impl Claims {
    /// Claims for `user` expiring `ttl_secs` from now.
    #[allow(clippy::cast_sign_loss)]
    pub fn new(user: UserId, steam_id: impl Into<String>, name: impl Into<String>, ttl_secs: u64) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Self {
            uid: user.get(),
            steam_id: steam_id.into(),
            name: name.into(),
            exp: now.saturating_add(ttl_secs),
        }
    }
}

/// HS256 signer and verifier sharing one secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenKeys {
    /// Keys derived from `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Sign `claims`.
    pub fn issue(&self, claims: &Claims) -> Result<String, ApiError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
    }

    /// Verify signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "invalid signature",
                    _ => "invalid token",
                };
                ApiError::Unauthorized(reason.into())
            })
    }
}

/// Strip the `Bearer ` prefix from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    /// Database user ID.
    pub id: UserId,
    /// Steam 64-bit ID.
    pub steam_id: String,
    /// Display name.
    pub name: String,
}

impl From<UserRow> for AuthUser {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            steam_id: row.steam_id,
            name: row.username,
        }
    }
}

impl AuthUser {
    /// Verify `token` and resolve the stored player behind it.
    pub async fn authenticate(state: &AppState, token: &str) -> Result<Self, ApiError> {
        let claims = state.tokens.verify(token)?;
        state.resolve_player(&claims).await.map(Self::from)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        Self::authenticate(state, token).await
    }
}

/// Authenticated caller listed in `auth.admin_steam_ids`.
#[derive(Clone, Debug)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if state.auth.is_admin(&user.steam_id) {
            Ok(Self(user))
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn issue_then_verify() {
        let keys = TokenKeys::new("secret");
        let claims = Claims::new(UserId::new(3), "7656", "alice", 60);
        let token = keys.issue(&claims).unwrap();
        assert_eq!(keys.verify(&token).unwrap(), claims);
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = TokenKeys::new("a")
            .issue(&Claims::new(UserId::new(1), "1", "x", 60))
            .unwrap();
        assert_matches!(
            TokenKeys::new("b").verify(&token),
            Err(ApiError::Unauthorized(reason)) if reason == "invalid signature"
        );
    }

    #[test]
    fn expired_rejected() {
        let keys = TokenKeys::new("secret");
        let claims = Claims {
            exp: 1_000,
            ..Claims::new(UserId::new(1), "1", "x", 0)
        };
        let token = keys.issue(&claims).unwrap();
        assert_matches!(
            keys.verify(&token),
            Err(ApiError::Unauthorized(reason)) if reason == "token expired"
        );
    }

    #[test]
    fn garbage_rejected() {
        assert_matches!(
            TokenKeys::new("secret").verify("not-a-jwt"),
            Err(ApiError::Unauthorized(_))
        );
    }

    #[test]
    fn bearer_prefix() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer  "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }

    #[test]
    fn claims_without_uid_decode() {
        let keys = TokenKeys::new("secret");
        let token = encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({ "steam_id": "7656", "name": "alice", "exp": u64::MAX / 2 }),
            &keys.encoding,
        )
        .unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.uid, 0);
        assert_eq!(claims.steam_id, "7656");
    }
}
