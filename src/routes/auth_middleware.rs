use std::sync::Arc;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{error, info};
use crate::services::auth_service::{validate_jwt, get_auth_token};
use crate::AppState;

/// Validates the caller's JWT and stores its principals in the request
/// extensions: `r/{role}` for users, `s/{name}` for services.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate Token
    let secret = match &state.config.cloud_auth_jwt_secret {
        Some(secret) => secret,
        None => {
            error!("Cloud auth JWT secret not configured");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Determine the type of token (user/service)
    let token_type = token_data.claims.get("type").and_then(|v| v.as_str()).ok_or_else(|| {
        error!("JWT token does not contain 'type' claim");
        StatusCode::UNAUTHORIZED
    })?;
    let subject = token_data.claims.get("sub").and_then(|v| v.as_str()).map(str::to_string).ok_or_else(|| {
        error!("JWT token does not contain 'sub' claim");
        StatusCode::UNAUTHORIZED
    })?;

    let prpls = match token_type {
        "user" => {
            info!("User token validated successfully");
            let roles = token_data.claims.get("roles").and_then(|v| v.as_array()).map(|roles| {
                roles.iter().filter_map(|r| r.as_str()).map(|r| format!("r/{}", r)).collect::<Vec<String>>()
            }).unwrap_or_default();
            req.extensions_mut().insert(subject);
            roles
        }
        "service" => {
            info!("Service token validated successfully");
            vec![format!("s/{}", subject)]
        }
        other => {
            error!("Invalid token type: {}", other);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    req.extensions_mut().insert(prpls);
    Ok(next.run(req).await)
}
