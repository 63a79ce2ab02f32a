use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{queries, AppState};
use crate::error::AppError;
use crate::models::User;

/// The authenticated user for the current request, inserted by
/// [`session_auth`] and read by handlers via `Extension<CurrentUser>`.
#[derive(Clone)]
pub struct CurrentUser(pub User);

/// Require a valid `Authorization: Bearer pts_...` session token.
pub async fn session_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    // Connection scope must not extend over the downstream handler.
    let user = {
        let conn = state.db.get()?;
        queries::get_user_by_session_token(&conn, token)?.ok_or(AppError::Unauthorized)?
    };

    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}
