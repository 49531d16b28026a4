use axum::{http::StatusCode, Json};
use crate::models::ErrorResponse;

const CLOUD_ADMIN_PRPL: &str = "r/Colabri-CloudAdmin";

pub fn is_cloud_admin(prpls: &[String]) -> bool {
    prpls.iter().any(|p| p == CLOUD_ADMIN_PRPL)
}

pub fn is_service(prpls: &[String]) -> bool {
    prpls.iter().any(|p| p.starts_with("s/"))
}

fn forbidden(error: String) -> (StatusCode, Json<ErrorResponse>) {
    let status = StatusCode::FORBIDDEN;
    (status, Json(ErrorResponse {
        code: status.as_u16(),
        status: status.to_string(),
        error,
    }))
}

/// Any service token, or a cloud admin acting on its behalf.
pub fn ensure_any_service(prpls: &[String]) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if let Some(p) = prpls.iter().find(|p| p.starts_with("s/")) {
        return Ok(p.clone());
    }

    if is_cloud_admin(prpls) {
        return Ok(CLOUD_ADMIN_PRPL.to_string());
    }

    Err(forbidden("Service access required".to_string()))
}

pub fn ensure_cloud_admin(prpls: &[String]) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if is_cloud_admin(prpls) {
        return Ok(CLOUD_ADMIN_PRPL.to_string());
    }

    Err(forbidden("Cloud Admin access required".to_string()))
}
