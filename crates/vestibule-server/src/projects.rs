use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::session::Session;
use crate::store::SettingsRepository;

/// Resolves which project a logged-in session is working in.
pub trait ProjectService: Send + Sync {
    /// Pin the active project into the session. Calling it again within the
    /// same request must not change the outcome.
    fn set_current_project(&self, session: &mut Session) -> Result<()>;
}

/// Reads the user's last visited project from the settings store
/// (`usersettings.<user id>.lastProject`).
#[derive(Clone)]
pub struct SettingsProjects {
    settings: Arc<dyn SettingsRepository>,
}

impl SettingsProjects {
    pub fn new(settings: Arc<dyn SettingsRepository>) -> Self {
        Self { settings }
    }

    pub fn last_project_key(user_id: u64) -> String {
        format!("usersettings.{user_id}.lastProject")
    }
}

impl ProjectService for SettingsProjects {
    fn set_current_project(&self, session: &mut Session) -> Result<()> {
        if session.current_project.is_some() {
            return Ok(());
        }
        let Some(user) = &session.user else {
            return Ok(());
        };

        let key = Self::last_project_key(user.id);
        let project = self
            .settings
            .get_setting(&key)?
            .and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(id) = project {
            debug!(user = user.id, project = id, "pinned current project");
        }
        session.current_project = project;
        Ok(())
    }
}
