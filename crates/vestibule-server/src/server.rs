use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use directories::ProjectDirs;
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::{SessionAuth, StaticCredentials},
    gate::{request_gate, GateConfig, RequestGate},
    handlers::{
        dashboard, health, i18n, install, install_status, login, login_page, logout, not_found,
        two_fa_page, update_schema, verify_two_fa,
    },
    headers::security_headers,
    projects::SettingsProjects,
    session::SessionStore,
    store::{SettingsRepository, Store, SCHEMA_VERSION},
    telemetry::{NoTelemetry, ReportService, TelemetryReporter},
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// Public URL prefix used for redirects and relative logo paths.
    pub base_url: String,
    pub site_name: String,
    pub logo_path: String,
    pub language: String,
    /// Telemetry endpoint; `None` disables reporting regardless of the
    /// opt-in setting.
    pub telemetry_url: Option<String>,
    pub telemetry_timeout: Duration,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub admin_two_fa_code: Option<String>,
    /// How often idle sessions are swept.
    pub sweep_interval: Duration,
    /// Sessions not seen for this long are dropped by the sweep.
    pub session_idle_timeout: Duration,
    /// Keep the old `##` secondary-color normalization.
    pub legacy_color_quirk: bool,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let defaults = GateConfig::default();
        Self {
            host: std::env::var("VESTIBULE_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("VESTIBULE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("VESTIBULE_DATA_DIR").ok().map(PathBuf::from),
            base_url: std::env::var("VESTIBULE_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_owned())
                .unwrap_or_default(),
            site_name: std::env::var("VESTIBULE_SITE_NAME")
                .unwrap_or(defaults.default_site_name),
            logo_path: std::env::var("VESTIBULE_LOGO_PATH")
                .unwrap_or(defaults.default_logo_path),
            language: std::env::var("VESTIBULE_LANGUAGE").unwrap_or(defaults.default_language),
            telemetry_url: std::env::var("VESTIBULE_TELEMETRY_URL").ok(),
            telemetry_timeout: Duration::from_secs(
                std::env::var("VESTIBULE_TELEMETRY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),
            admin_user: std::env::var("VESTIBULE_ADMIN_USER").ok(),
            admin_password: std::env::var("VESTIBULE_ADMIN_PASSWORD").ok(),
            admin_two_fa_code: std::env::var("VESTIBULE_ADMIN_2FA_CODE").ok(),
            sweep_interval: Duration::from_secs(300),
            session_idle_timeout: Duration::from_secs(
                std::env::var("VESTIBULE_SESSION_IDLE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8 * 3600),
            ),
            legacy_color_quirk: std::env::var("VESTIBULE_LEGACY_COLOR_QUIRK")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            log_level: "warn".into(),
        }
    }
}

impl ServerConfig {
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            base_url: self.base_url.clone(),
            schema_version: SCHEMA_VERSION.to_owned(),
            default_logo_path: self.logo_path.clone(),
            default_site_name: self.site_name.clone(),
            default_language: self.language.clone(),
            legacy_color_quirk: self.legacy_color_quirk,
        }
    }

    fn credentials(&self) -> Option<StaticCredentials> {
        match (&self.admin_user, &self.admin_password) {
            (Some(username), Some(password)) => Some(StaticCredentials {
                username: username.clone(),
                password: password.clone(),
                two_fa_code: self.admin_two_fa_code.clone(),
            }),
            _ => None,
        }
    }
}

/// Resolve (and create) the data directory: `data_dir` when given,
/// otherwise the platform app data dir (`~/.local/share/vestibule/`, etc.).
/// Public so the CLI's offline commands can reuse this logic.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let path = match data_dir {
        Some(d) => d.clone(),
        None => ProjectDirs::from("", "", "vestibule")
            .context("could not determine platform data directory")?
            .data_dir()
            .to_owned(),
    };
    std::fs::create_dir_all(&path).context("create data dir")?;
    Ok(path)
}

/// Wire the gate and its collaborators around `store` and start the idle
/// session sweep. Must be called from within a Tokio runtime.
pub fn build_state(cfg: &ServerConfig, store: Store) -> AppState {
    let settings: Arc<dyn SettingsRepository> = Arc::new(store.clone());

    let reports: Arc<dyn ReportService> = match &cfg.telemetry_url {
        Some(url) => Arc::new(TelemetryReporter::new(
            url.clone(),
            settings.clone(),
            cfg.telemetry_timeout,
        )),
        None => Arc::new(NoTelemetry),
    };

    let gate = RequestGate::new(
        Arc::new(SessionAuth),
        settings.clone(),
        Arc::new(SettingsProjects::new(settings)),
        reports,
        cfg.gate_config(),
    );

    let sessions = SessionStore::new();
    sessions
        .clone()
        .spawn_sweep(cfg.sweep_interval, cfg.session_idle_timeout);

    AppState {
        store,
        sessions,
        gate: Arc::new(gate),
        credentials: cfg.credentials(),
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    // Every page route runs behind the gate.
    let gated = Router::new()
        .route("/", get(dashboard))
        .route("/dashboard/show", get(dashboard))
        .route("/install", get(install_status).post(install))
        .route("/install/update", get(install_status).post(update_schema))
        .route("/auth/login", get(login_page).post(login))
        .route("/auth/logout", get(logout).post(logout))
        .route("/twoFA/verify", get(two_fa_page).post(verify_two_fa))
        .route("/api/i18n", get(i18n))
        .route("/general/error404", get(not_found))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), request_gate));

    // Probes stay reachable whatever the install or login state.
    let public = Router::new().route("/health", get(health));

    Router::new()
        .merge(public)
        .merge(gated)
        .with_state(state)
        .layer(middleware::from_fn(security_headers))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let db_path = data_dir.join("vestibule.db");
    let store = Store::open(&db_path).context("open store")?;

    if store.installed_at()?.is_none() {
        info!("store not installed yet, first visitors are sent to /install");
    }
    match (&cfg.admin_user, &cfg.admin_password) {
        (Some(_), Some(_)) => info!(
            two_fa = cfg.admin_two_fa_code.is_some(),
            "administrator login enabled"
        ),
        _ => info!("no administrator configured, login disabled"),
    }
    if cfg.telemetry_url.is_some() {
        info!("telemetry endpoint configured (sent only when opted in)");
    }

    let app = router(build_state(&cfg, store));

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, log_level = %cfg.log_level, "vestibule server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}
