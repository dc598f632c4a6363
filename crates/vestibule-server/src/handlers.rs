use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use tower_cookies::{Cookie, Cookies};
use tracing::info;

use crate::{
    session::{SessionHandle, SESSION_COOKIE},
    store::DB_VERSION_KEY,
    AppState,
};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Install / update ──────────────────────────────────────────────────────────

pub async fn install_status(State(state): State<AppState>) -> Response {
    let installed = match state.store.installed_at() {
        Ok(at) => at.is_some(),
        Err(e) => return internal_error(e),
    };
    match state.store.get(DB_VERSION_KEY) {
        Ok(db_version) => Json(json!({
            "installed": installed,
            "db_version": db_version,
            "expected_db_version": state.gate.config().schema_version,
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn install(
    State(state): State<AppState>,
    Extension(SessionHandle(token)): Extension<SessionHandle>,
) -> Response {
    match state.store.installed_at() {
        Ok(Some(_)) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({"error": "already installed"})),
            )
                .into_response()
        }
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    let schema_version = &state.gate.config().schema_version;
    if let Err(e) = state.store.install(schema_version) {
        return internal_error(e);
    }

    state
        .sessions
        .update(&token, |s| {
            s.is_installed = Some(true);
            s.is_up_to_date = Some(true);
        })
        .await;

    info!(schema_version = %schema_version, "audit: install");
    (
        StatusCode::CREATED,
        Json(json!({"installed": true, "db_version": schema_version})),
    )
        .into_response()
}

pub async fn update_schema(
    State(state): State<AppState>,
    Extension(SessionHandle(token)): Extension<SessionHandle>,
) -> Response {
    let schema_version = &state.gate.config().schema_version;
    let previous = match state.store.get(DB_VERSION_KEY) {
        Ok(v) => v,
        Err(e) => return internal_error(e),
    };
    if let Err(e) = state.store.put(DB_VERSION_KEY, schema_version) {
        return internal_error(e);
    }

    state
        .sessions
        .update(&token, |s| s.is_up_to_date = Some(true))
        .await;

    info!(from = ?previous, to = %schema_version, "audit: install.update");
    Json(json!({"db_version": schema_version, "previous": previous})).into_response()
}

// ── Login / logout ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login_page(State(state): State<AppState>) -> Response {
    Json(json!({
        "route": "auth.login",
        "enabled": state.credentials.is_some(),
    }))
    .into_response()
}

pub async fn login(
    State(state): State<AppState>,
    Extension(SessionHandle(token)): Extension<SessionHandle>,
    Json(body): Json<LoginRequest>,
) -> Response {
    let Some(credentials) = state.credentials.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "login disabled: no administrator account configured"})),
        )
            .into_response();
    };

    let outcome = state
        .sessions
        .update(&token, |s| {
            credentials
                .login(s, &body.username, &body.password)
                .then(|| s.awaiting_second_factor())
        })
        .await
        .flatten();

    match outcome {
        Some(two_fa_required) => Json(json!({
            "logged_in": true,
            "two_fa_required": two_fa_required,
        }))
        .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid username or password"})),
        )
            .into_response(),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(SessionHandle(token)): Extension<SessionHandle>,
    cookies: Cookies,
) -> Response {
    state.sessions.destroy(&token).await;
    cookies.remove(Cookie::from(SESSION_COOKIE));
    info!("audit: auth.logout");
    Json(json!({"logged_out": true})).into_response()
}

// ── Second factor ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

pub async fn two_fa_page() -> Response {
    Json(json!({"route": "twoFA.verify"})).into_response()
}

pub async fn verify_two_fa(
    State(state): State<AppState>,
    Extension(SessionHandle(token)): Extension<SessionHandle>,
    Json(body): Json<VerifyRequest>,
) -> Response {
    let Some(credentials) = state.credentials.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "login disabled: no administrator account configured"})),
        )
            .into_response();
    };

    let verified = state
        .sessions
        .update(&token, |s| credentials.verify_second_factor(s, &body.code))
        .await
        .unwrap_or(false);

    if verified {
        Json(json!({"verified": true})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid code"})),
        )
            .into_response()
    }
}

// ── Pages ─────────────────────────────────────────────────────────────────────

pub async fn i18n(
    State(state): State<AppState>,
    Extension(SessionHandle(token)): Extension<SessionHandle>,
) -> Response {
    let session = state.sessions.load(&token).await.unwrap_or_default();
    Json(json!({
        "language": session.branding.language,
        "site_name": session.branding.site_name,
    }))
    .into_response()
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(SessionHandle(token)): Extension<SessionHandle>,
) -> Response {
    let session = state.sessions.load(&token).await.unwrap_or_default();
    Json(json!({
        "user": session.user.map(|u| u.name),
        "current_project": session.current_project,
        "branding": session.branding,
    }))
    .into_response()
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

pub(crate) fn internal_error(e: anyhow::Error) -> Response {
    tracing::error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}
