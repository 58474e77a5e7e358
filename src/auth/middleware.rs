use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::auth::CredentialSet;

pub const API_KEY_HEADER: &str = "X-Api-Key";
pub const API_SECRET_HEADER: &str = "X-Api-Secret";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
}

pub async fn api_auth_middleware(
    State(credentials): State<CredentialSet>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let key = header(request.headers(), API_KEY_HEADER);
    let secret = header(request.headers(), API_SECRET_HEADER);

    if let (Some(key), Some(secret)) = (key, secret) {
        if credentials.verify(&key, &secret) {
            return Ok(next.run(request).await);
        }
        tracing::debug!(api_key = %key, "Rejected API credentials");
    }

    Err(StatusCode::UNAUTHORIZED)
}
