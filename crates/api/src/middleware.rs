use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use cloudgate_auth::SignedInUser;
use cloudgate_identity::{check_issuer, extract_claims};

use crate::app::AppState;
use crate::context::UserContext;

/// Authenticate the request from its bearer id token.
///
/// Signature verification happened at the identity provider handshake; here
/// the claims are decoded and the issuer trust boundary is enforced before a
/// [`UserContext`] is attached to the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = extract_claims(token).map_err(|_| StatusCode::UNAUTHORIZED)?;
    check_issuer(&claims.iss, &state.settings.trusted_issuer_prefix)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let display_name = claims.display_name().ok_or(StatusCode::UNAUTHORIZED)?;
    let directory_id = claims.directory_id().map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut()
        .insert(UserContext::new(SignedInUser::new(display_name, directory_id)));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?
        .trim();

    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
