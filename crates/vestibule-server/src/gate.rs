//! The per-request bootstrap gate.
//!
//! # Phases
//! ```text
//! Incoming request:
//!     → headers.rs (security headers, on every response)
//!     → install.rs (redirect to /install or /install/update)
//!     → branding.rs (hydrate logo, colors, site name, locale)
//!     → access check (redirect to /auth/login or /twoFA/verify)
//!     → dispatch to the matched handler
//!     → wait for the telemetry report started by this request, if any
//! ```
//!
//! A redirect ends the request: nothing is dispatched and a pending
//! telemetry report is left to finish on its own.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::{Cookie, Cookies};
use tracing::{debug, warn};

use crate::{
    auth::AuthService,
    branding,
    handlers::internal_error,
    install,
    projects::ProjectService,
    routes::{RouteId, Triggers, LOGIN, LOGIN_PATH, VERIFY_TWO_FA_PATH},
    session::{Session, SessionHandle, SessionToken, SESSION_COOKIE},
    store::{SettingsRepository, SCHEMA_VERSION},
    telemetry::{ReportService, TelemetryHandle},
    AppState,
};

/// Static configuration consumed by the gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Prefix for redirect targets and relative logo paths, without a
    /// trailing slash.
    pub base_url: String,
    /// Schema version the settings store must carry.
    pub schema_version: String,
    pub default_logo_path: String,
    pub default_site_name: String,
    pub default_language: String,
    /// Reproduce the old secondary-color normalization (see
    /// `branding::normalize_palette`).
    pub legacy_color_quirk: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            schema_version: SCHEMA_VERSION.to_owned(),
            default_logo_path: "/images/logo.svg".to_owned(),
            default_site_name: "Vestibule".to_owned(),
            default_language: "en-US".to_owned(),
            legacy_color_quirk: false,
        }
    }
}

/// Outcome of running the gate's checks for one request.
pub enum Admission {
    /// Answer with a redirect to this absolute location.
    Redirect(String),
    /// Hand the request to its handler, then wait on the report if any.
    Dispatch(Option<TelemetryHandle>),
}

impl Admission {
    pub fn redirect_location(&self) -> Option<&str> {
        match self {
            Admission::Redirect(location) => Some(location.as_str()),
            Admission::Dispatch(_) => None,
        }
    }
}

pub struct RequestGate {
    auth: Arc<dyn AuthService>,
    settings: Arc<dyn SettingsRepository>,
    projects: Arc<dyn ProjectService>,
    reports: Arc<dyn ReportService>,
    config: GateConfig,
}

impl RequestGate {
    pub fn new(
        auth: Arc<dyn AuthService>,
        settings: Arc<dyn SettingsRepository>,
        projects: Arc<dyn ProjectService>,
        reports: Arc<dyn ReportService>,
        config: GateConfig,
    ) -> Self {
        Self {
            auth,
            settings,
            projects,
            reports,
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run the install, branding and access checks against `session`.
    ///
    /// Session changes made before a redirect are kept, so callers run this
    /// on the stored session in place whatever the outcome.
    pub fn admit(
        &self,
        session: &mut Session,
        route: &RouteId,
        triggers: Triggers,
    ) -> Result<Admission> {
        let logged_in = self.auth.logged_in(session);

        if let Some(path) = install::check_installation(
            session,
            logged_in,
            route,
            triggers,
            self.settings.as_ref(),
            &self.config.schema_version,
        )? {
            debug!(%route, to = path, "redirect: installation incomplete");
            return Ok(self.redirect(path));
        }

        branding::hydrate(&mut session.branding, self.settings.as_ref(), &self.config)?;

        if !logged_in {
            if !route.is_public() && !route.is(LOGIN) {
                debug!(%route, "redirect: login required");
                return Ok(self.redirect(LOGIN_PATH));
            }
            return Ok(Admission::Dispatch(None));
        }

        let telemetry = self.reports.send_anonymous_telemetry();

        if session.awaiting_second_factor() {
            if !route.is_two_fa_exempt() {
                debug!(%route, "redirect: second factor pending");
                return Ok(self.redirect(VERIFY_TWO_FA_PATH));
            }
        } else {
            self.projects.set_current_project(session)?;
        }

        Ok(Admission::Dispatch(telemetry))
    }

    /// Await the handler's response, then the telemetry report. A failed
    /// report is logged and otherwise ignored.
    pub async fn dispatch<F>(handler: F, telemetry: Option<TelemetryHandle>) -> Response
    where
        F: Future<Output = Response>,
    {
        let response = handler.await;

        if let Some(handle) = telemetry {
            if let Err(e) = handle.wait().await {
                warn!(error = %e, "telemetry report failed");
            }
        }

        response
    }

    fn redirect(&self, path: &str) -> Admission {
        Admission::Redirect(format!("{}{path}", self.config.base_url))
    }
}

/// Axum middleware running the gate in front of every page route.
///
/// The gate works on the stored session in place, so handlers see, and may
/// change, the state it settled on.
pub async fn request_gate(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    let route = RouteId::from_path(request.uri().path());
    let triggers = Triggers::from_uri(request.uri());
    let (token, admission) = admit_session(&state, &cookies, &route, triggers).await;

    match admission {
        Err(e) => internal_error(e),
        Ok(Admission::Redirect(location)) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        Ok(Admission::Dispatch(telemetry)) => {
            request.extensions_mut().insert(SessionHandle(token));
            RequestGate::dispatch(next.run(request), telemetry).await
        }
    }
}

/// Admit the request under the session named by the cookie. Unknown or
/// destroyed tokens are not revived: the visitor gets a fresh session and
/// a new cookie instead.
async fn admit_session(
    state: &AppState,
    cookies: &Cookies,
    route: &RouteId,
    triggers: Triggers,
) -> (SessionToken, Result<Admission>) {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        let token = cookie.value().to_owned();
        let admitted = state
            .sessions
            .update(&token, |session| state.gate.admit(session, route, triggers))
            .await;
        if let Some(admission) = admitted {
            return (token, admission);
        }
    }

    let mut session = Session::default();
    let admission = state.gate.admit(&mut session, route, triggers);
    let token = state.sessions.insert(session).await;

    let mut cookie = Cookie::new(SESSION_COOKIE, token.clone());
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookies.add(cookie);
    (token, admission)
}
