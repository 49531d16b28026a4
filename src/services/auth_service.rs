use axum::extract::Query;
use axum::http;
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use moka::sync::Cache;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::RealtimeError;

const DEFAULT_ROLE: &str = "member";
const ANNOUNCER_ROLES: [&str; 2] = ["admin", "owner"];

/// Who is behind a socket, as asserted by a verified token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub role: String,
    pub org_id: Option<String>,
    pub expires_at: Option<i64>,
}

impl Identity {
    pub fn can_announce(&self) -> bool {
        ANNOUNCER_ROLES.contains(&self.role.as_str())
    }
}

#[derive(Deserialize)]
struct UserClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    org: Option<String>,
    #[serde(rename = "type", default)]
    token_type: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| "Invalid Authorization header".to_string())?;
        return Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).to_string());
    }

    // 2. Try to get token from cookies
    if let Some(cookie_header) = req.headers().get(http::header::COOKIE) {
        let cookie_str = cookie_header
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;
        for c in cookie::Cookie::split_parse(cookie_str).flatten() {
            if c.name() == "auth_token" {
                return Ok(c.value().to_string());
            }
        }
    }

    // 3. Browsers cannot set headers on a websocket handshake
    if let Ok(Query(params)) = Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
        if let Some(token) = params.get("token").filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
    }

    Err("Missing Authorization header, auth_token cookie or token parameter".to_string())
}

// Validate a JWT token and return the token data
pub fn validate_jwt(
    token: &str,
    secret: &str,
) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Verifies handshake tokens and remembers the resulting identities.
pub struct IdentityResolver {
    secret: Option<String>,
    cache: Cache<String, Identity>,
}

impl IdentityResolver {
    pub fn new(secret: Option<String>) -> Self {
        if secret.is_none() {
            warn!("No JWT secret configured, every websocket handshake will be rejected");
        }
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();
        info!("Identity cache initialized");
        Self { secret, cache }
    }

    pub fn resolve(&self, token: &str) -> Result<Identity, RealtimeError> {
        if let Some(identity) = self.cache.get(token) {
            let expired = identity
                .expires_at
                .is_some_and(|exp| exp <= chrono::Utc::now().timestamp());
            if !expired {
                return Ok(identity);
            }
            self.cache.invalidate(token);
        }

        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| RealtimeError::Authorization("No JWT secret configured".to_string()))?;

        let token_data = validate_jwt(token, secret)
            .map_err(|e| RealtimeError::Authorization(format!("JWT validation failed: {}", e)))?;
        let claims: UserClaims = serde_json::from_value(token_data.claims)
            .map_err(|e| RealtimeError::Authorization(format!("Unusable JWT claims: {}", e)))?;

        if let Some(token_type) = claims.token_type.as_deref() {
            if token_type != "user" {
                return Err(RealtimeError::Authorization(format!(
                    "Token type '{}' cannot open a realtime connection",
                    token_type
                )));
            }
        }

        let identity = Identity {
            display_name: claims.name.unwrap_or_else(|| claims.sub.clone()),
            role: claims
                .roles
                .into_iter()
                .next()
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            org_id: claims.org.filter(|org| !org.is_empty()),
            expires_at: claims.exp,
            user_id: claims.sub,
        };
        debug!("Identity resolved for user {}", identity.user_id);
        self.cache.insert(token.to_string(), identity.clone());
        Ok(identity)
    }

    pub fn cached_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token(claims: serde_json::Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn resolves_identity_from_claims() {
        let resolver = IdentityResolver::new(Some(SECRET.to_string()));
        let jwt = token(json!({
            "sub": "u-1", "name": "Ada", "roles": ["admin"], "org": "acme",
            "type": "user", "exp": exp()
        }));
        let identity = resolver.resolve(&jwt).unwrap();
        assert_eq!(identity.user_id, "u-1");
        assert_eq!(identity.display_name, "Ada");
        assert_eq!(identity.org_id.as_deref(), Some("acme"));
        assert!(identity.can_announce());
    }

    #[test]
    fn defaults_to_member_role() {
        let resolver = IdentityResolver::new(Some(SECRET.to_string()));
        let identity = resolver.resolve(&token(json!({ "sub": "u-2", "exp": exp() }))).unwrap();
        assert_eq!(identity.role, "member");
        assert_eq!(identity.display_name, "u-2");
        assert!(!identity.can_announce());
    }

    #[test]
    fn rejects_bad_signatures_and_service_tokens() {
        let resolver = IdentityResolver::new(Some(SECRET.to_string()));
        let forged = encode(
            &Header::default(),
            &json!({ "sub": "u-3", "exp": exp() }),
            &EncodingKey::from_secret(b"other"),
        )
        .unwrap();
        assert!(matches!(resolver.resolve(&forged), Err(RealtimeError::Authorization(_))));

        let service = token(json!({ "sub": "okr-api", "type": "service", "exp": exp() }));
        assert!(resolver.resolve(&service).is_err());
    }

    #[test]
    fn no_secret_rejects_everything() {
        let resolver = IdentityResolver::new(None);
        let jwt = token(json!({ "sub": "u-4", "exp": exp() }));
        assert!(resolver.resolve(&jwt).is_err());
    }

    #[test]
    fn token_from_query_or_cookie() {
        let req = http::Request::builder()
            .uri("/ws?token=abc")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "abc");

        let req = http::Request::builder()
            .uri("/ws")
            .header(http::header::COOKIE, "theme=dark; auth_token=xyz")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "xyz");

        let req = http::Request::builder()
            .uri("/ws")
            .header(http::header::AUTHORIZATION, "Bearer hdr")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "hdr");
    }
}
