//! Route identifiers and the routes the gate treats specially.
//!
//! A route id is `module.action`, derived from the first two path segments:
//! `/install/update` is `install.update`, `/install` is `install`, and `/`
//! falls back to `dashboard.show`.

use std::fmt;

use http::Uri;

pub const LOGIN: &str = "auth.login";
pub const LOGOUT: &str = "auth.logout";
pub const RESET_PASSWORD: &str = "auth.resetPw";
pub const INSTALL: &str = "install";
pub const UPDATE: &str = "install.update";
pub const NOT_FOUND: &str = "general.error404";
pub const I18N: &str = "api.i18n";
pub const VERIFY_TWO_FA: &str = "twoFA.verify";
pub const DASHBOARD: &str = "dashboard.show";

/// Routes reachable without a logged-in user. Every route needed before
/// installation or login completes must be listed here, or the gate
/// redirects in a loop.
pub const PUBLIC_ACTIONS: &[&str] = &[LOGIN, RESET_PASSWORD, INSTALL, UPDATE, NOT_FOUND, I18N];

/// Routes still reachable while a second factor is outstanding.
pub const TWO_FA_EXEMPT: &[&str] = &[VERIFY_TWO_FA, LOGOUT, I18N];

/// Redirect targets, relative to the application's base URL.
pub const INSTALL_PATH: &str = "/install";
pub const UPDATE_PATH: &str = "/install/update";
pub const LOGIN_PATH: &str = "/auth/login";
pub const VERIFY_TWO_FA_PATH: &str = "/twoFA/verify";

/// Identifier of the route matched for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteId(String);

impl RouteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the route id from a request path. Segments past the second are
    /// handler parameters and do not take part in the id.
    pub fn from_path(path: &str) -> Self {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next()) {
            (None, _) => Self::new(DASHBOARD),
            (Some(module), None) => Self::new(module),
            (Some(module), Some(action)) => Self::new(format!("{module}.{action}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, id: &str) -> bool {
        self.0 == id
    }

    pub fn is_public(&self) -> bool {
        PUBLIC_ACTIONS.contains(&self.as_str())
    }

    pub fn is_two_fa_exempt(&self) -> bool {
        TWO_FA_EXEMPT.contains(&self.as_str())
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Query parameters that suppress install/update redirects for one request.
/// Only their presence matters, with or without a value and however often
/// they repeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Triggers {
    pub install: bool,
    pub update: bool,
}

impl Triggers {
    pub fn from_uri(uri: &Uri) -> Self {
        let mut triggers = Self::default();
        let Some(query) = uri.query() else {
            return triggers;
        };
        for (key, _) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "install" => triggers.install = true,
                "update" => triggers.update = true,
                _ => {}
            }
        }
        triggers
    }
}
