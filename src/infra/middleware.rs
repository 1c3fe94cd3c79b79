use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::infra::{
    app_error::AppError,
    app_state::AppState,
    auth::{CurrentUser, extract_bearer},
};

/// Verifies the bearer credential and exposes [`CurrentUser`] to handlers.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer)
        .ok_or(AppError::Unauthorized)?;

    let user: CurrentUser = state.verifier.verify(token)?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
