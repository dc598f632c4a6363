//! Install/upgrade phase of the gate.
//!
//! ```text
//! NOT_INSTALLED ──install──▶ INSTALLED_STALE_SCHEMA ──update──▶ UP_TO_DATE
//! ```
//!
//! Progress is memoised in the session. Once both flags are set the phase
//! is a no-op for the rest of the session and never touches the store.

use anyhow::Result;
use tracing::debug;

use crate::routes::{RouteId, Triggers, I18N, INSTALL, INSTALL_PATH, UPDATE, UPDATE_PATH};
use crate::session::Session;
use crate::store::{SettingsRepository, DB_VERSION_KEY};

/// Returns the path to redirect to when the installation is incomplete.
///
/// Only anonymous visitors are checked: the store has to be installed and
/// migrated before anyone can log in. On the exempt routes (the installer
/// pages and the i18n endpoint) an incomplete step neither redirects nor
/// gets marked done.
pub(crate) fn check_installation(
    session: &mut Session,
    logged_in: bool,
    route: &RouteId,
    triggers: Triggers,
    settings: &dyn SettingsRepository,
    schema_version: &str,
) -> Result<Option<&'static str>> {
    if session.installed() && session.up_to_date() {
        return Ok(None);
    }
    if logged_in {
        return Ok(None);
    }

    if !session.installed() {
        if !settings.check_if_installed()? && !triggers.install {
            if !route.is(INSTALL) && !route.is(I18N) {
                return Ok(Some(INSTALL_PATH));
            }
        } else {
            session.is_installed = Some(true);
            debug!("session marked installed");
        }
    }

    if session.installed() && !session.up_to_date() {
        let persisted = settings.get_setting(DB_VERSION_KEY)?;
        let stale = persisted.as_deref() != Some(schema_version);
        if stale && !triggers.update && !triggers.install {
            if !route.is(UPDATE) && !route.is(I18N) {
                debug!(
                    persisted = ?persisted,
                    expected = schema_version,
                    "schema out of date"
                );
                return Ok(Some(UPDATE_PATH));
            }
        } else {
            session.is_up_to_date = Some(true);
            debug!("session marked up to date");
        }
    }

    Ok(None)
}
