//! In-memory collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;

use crate::projects::ProjectService;
use crate::session::Session;
use crate::store::SettingsRepository;
use crate::telemetry::{ReportService, TelemetryHandle};

/// Settings repository backed by a map, counting every call.
#[derive(Default)]
pub struct FakeSettings {
    values: Mutex<HashMap<String, String>>,
    installed: AtomicBool,
    reads: AtomicUsize,
    install_checks: AtomicUsize,
}

impl FakeSettings {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        let fake = Self::default();
        {
            let mut values = fake.values.lock().unwrap();
            for (k, v) in pairs {
                values.insert((*k).to_owned(), (*v).to_owned());
            }
        }
        fake
    }

    pub fn with_installed(self, installed: bool) -> Self {
        self.installed.store(installed, Ordering::SeqCst);
        self
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    /// `get_setting` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Every repository call so far, reads and install checks.
    pub fn calls(&self) -> usize {
        self.reads() + self.install_checks.load(Ordering::SeqCst)
    }
}

impl SettingsRepository for FakeSettings {
    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.value(key))
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        self.set(key, value);
        Ok(())
    }

    fn check_if_installed(&self) -> Result<bool> {
        self.install_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.installed.load(Ordering::SeqCst))
    }
}

/// Project service that only counts calls.
#[derive(Default)]
pub struct CountingProjects {
    calls: AtomicUsize,
}

impl CountingProjects {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProjectService for CountingProjects {
    fn set_current_project(&self, session: &mut Session) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        session.current_project.get_or_insert(1);
        Ok(())
    }
}

/// Report service handing out a handle built by the test.
#[derive(Default)]
pub struct ScriptedReports {
    outcome: Mutex<Option<fn() -> TelemetryHandle>>,
    calls: AtomicUsize,
}

impl ScriptedReports {
    pub fn returning(make: fn() -> TelemetryHandle) -> Self {
        Self {
            outcome: Mutex::new(Some(make)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReportService for ScriptedReports {
    fn send_anonymous_telemetry(&self) -> Option<TelemetryHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let make = *self.outcome.lock().unwrap();
        make.map(|f| f())
    }
}
