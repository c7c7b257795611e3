//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - account creation
//! - POST /api/v1/auth/login - credential login, sets the session cookie
//! - POST /api/v1/auth/logout - revoke all sessions, clear the cookie
//! - GET  /api/v1/auth/session - restore a session from the cached token
//! - GET  /api/v1/auth/me - current user (auth required)
//! - POST /api/v1/auth/password-reset/request - issue a reset token
//! - POST /api/v1/auth/password-reset/confirm - consume a reset token

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::{AccountServiceError, RegisterInput, SessionError};

/// Cookie lifetime for remembered sessions, matching the refresh TTL
const REMEMBER_COOKIE_MAX_AGE: i64 = 30 * 24 * 60 * 60;

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

/// Request body for requesting a password reset
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

/// Request body for confirming a password reset
#[derive(Debug, Deserialize)]
pub struct ResetConfirm {
    pub token: String,
    pub new_password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub is_admin: bool,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

impl From<crate::models::User> for UserResponse {
    fn from(user: crate::models::User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            is_admin: user.is_admin,
            created_at: user.created_at.to_rfc3339(),
            last_login_at: user.last_login_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/session", get(session))
        .route("/password-reset/request", post(password_reset_request))
        .route("/password-reset/confirm", post(password_reset_confirm))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
}

fn session_cookie_headers(token: &str, remember: bool) -> HeaderMap {
    let cookie = if remember {
        format!(
            "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            token, REMEMBER_COOKIE_MAX_AGE
        )
    } else {
        format!("session={}; Path=/; HttpOnly; SameSite=Lax", token)
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, HeaderValue::from_str(&cookie).unwrap());
    headers
}

fn clear_cookie_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    headers
}

fn map_account_error(e: AccountServiceError) -> ApiError {
    match e {
        AccountServiceError::ValidationError(msg) => ApiError::validation_error(msg),
        AccountServiceError::EmailExists(_) => {
            ApiError::conflict("An account with this email already exists")
        }
        AccountServiceError::InvalidCredentials => {
            ApiError::unauthorized("Invalid email or password")
        }
        AccountServiceError::InternalError(e) => {
            tracing::error!("Account operation failed: {:#}", e);
            ApiError::internal_error("Internal server error")
        }
    }
}

/// POST /api/v1/auth/register - account creation
///
/// A successful registration immediately starts a session.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .account_service
        .register(body)
        .await
        .map_err(map_account_error)?;

    let token = state
        .session_manager
        .start_session(&user, false)
        .await
        .map_err(|e| {
            tracing::error!("Failed to start session: {:#}", e);
            ApiError::internal_error("Internal server error")
        })?;

    let headers = session_cookie_headers(&token, false);
    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

/// POST /api/v1/auth/login - credential login
///
/// `remember` selects a long-lived refresh token and a persistent cookie;
/// otherwise the cookie lives only for the browser session.
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .account_service
        .authenticate(&body.email, &body.password)
        .await
        .map_err(map_account_error)?;

    let token = state
        .session_manager
        .start_session(&user, body.remember)
        .await
        .map_err(|e| {
            tracing::error!("Failed to start session: {:#}", e);
            ApiError::internal_error("Internal server error")
        })?;

    let headers = session_cookie_headers(&token, body.remember);
    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

/// POST /api/v1/auth/logout - revoke all of the user's sessions
///
/// The cookie is cleared even when the revocation write fails: the client
/// always ends up logged out.
async fn logout(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    if let Err(e) = state.session_manager.logout(&user.id).await {
        tracing::warn!("Logout revocation failed: {:#}", e);
    }
    (StatusCode::NO_CONTENT, clear_cookie_headers())
}

/// GET /api/v1/auth/session - restore a session from the cached token
///
/// Any failure answers with one generic message and clears the cookie, so
/// a dead token is never presented twice.
async fn session(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<Json<UserResponse>, (StatusCode, HeaderMap, Json<ApiError>)> {
    let token = crate::api::middleware::extract_session_token(&request);

    match state.session_manager.auto_login(token.as_deref()).await {
        crate::services::AutoLoginOutcome::Authenticated(user) => Ok(Json(user.into())),
        crate::services::AutoLoginOutcome::Failed(failure) => {
            tracing::debug!(reason = failure.reason(), "Session restore failed");
            Err((
                StatusCode::UNAUTHORIZED,
                clear_cookie_headers(),
                Json(ApiError::session_invalid()),
            ))
        }
    }
}

/// GET /api/v1/auth/me - current user
async fn me(
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Json<UserResponse> {
    Json(user.into())
}

/// POST /api/v1/auth/password-reset/request - issue a reset token
///
/// Always answers 204 whether or not the email is registered. The token
/// itself is handed to the out-of-band delivery path, never the response.
async fn password_reset_request(
    State(state): State<AppState>,
    Json(body): Json<ResetRequest>,
) -> Result<StatusCode, ApiError> {
    let user = state
        .account_service
        .get_user_by_email(&body.email)
        .await
        .map_err(map_account_error)?;

    if let Some(user) = user {
        match state.session_manager.create_password_reset_token(&user.id).await {
            Ok(_token) => {
                tracing::info!(user_id = %user.id, "Issued password reset token");
            }
            Err(e) => {
                tracing::error!("Failed to issue reset token: {:#}", e);
            }
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/password-reset/confirm - consume a reset token
///
/// On success the password is replaced and every live session is revoked.
async fn password_reset_confirm(
    State(state): State<AppState>,
    Json(body): Json<ResetConfirm>,
) -> Result<StatusCode, ApiError> {
    let user = state
        .session_manager
        .verify_password_reset_token(&body.token)
        .await
        .map_err(|e| match e {
            SessionError::Token(_) | SessionError::ResetUsed | SessionError::UserNotFound => {
                ApiError::unauthorized("Reset token is invalid")
            }
            e => {
                tracing::error!("Reset verification failed: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        })?;

    state
        .account_service
        .reset_password(&user.id, &body.new_password)
        .await
        .map_err(map_account_error)?;

    if let Err(e) = state.session_manager.logout(&user.id).await {
        tracing::warn!("Failed to revoke sessions after reset: {:#}", e);
    }

    Ok(StatusCode::NO_CONTENT)
}
