//! Anonymous usage telemetry. At most one report per day, and only when the
//! operator opted in through the `companysettings.telemetry.active` setting.
//!
//! Sending never blocks the request that triggered it: the report runs as a
//! spawned task and the caller receives a [`TelemetryHandle`] it may await
//! once the response is produced.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::{SettingsRepository, DB_VERSION_KEY};

pub const ACTIVE_KEY: &str = "companysettings.telemetry.active";
pub const LAST_UPDATE_KEY: &str = "companysettings.telemetry.lastUpdate";
pub const ANONYMOUS_ID_KEY: &str = "companysettings.telemetry.anonymousId";

const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("telemetry endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("telemetry task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("telemetry did not finish within {0:?}")]
    TimedOut(Duration),
}

/// A telemetry report in flight.
pub struct TelemetryHandle {
    task: JoinHandle<Result<(), TelemetryError>>,
    timeout: Duration,
}

impl TelemetryHandle {
    /// Spawn `report` on the runtime. [`wait`](Self::wait) gives up after
    /// `timeout` and leaves the task running detached.
    pub fn spawn<F>(report: F, timeout: Duration) -> Self
    where
        F: Future<Output = Result<(), TelemetryError>> + Send + 'static,
    {
        Self {
            task: tokio::spawn(report),
            timeout,
        }
    }

    pub async fn wait(self) -> Result<(), TelemetryError> {
        match tokio::time::timeout(self.timeout, self.task).await {
            Ok(joined) => joined?,
            Err(_) => Err(TelemetryError::TimedOut(self.timeout)),
        }
    }
}

/// Emits the daily anonymous report.
pub trait ReportService: Send + Sync {
    /// Returns a handle only when a report was actually started.
    fn send_anonymous_telemetry(&self) -> Option<TelemetryHandle>;
}

/// Report service that never sends anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTelemetry;

impl ReportService for NoTelemetry {
    fn send_anonymous_telemetry(&self) -> Option<TelemetryHandle> {
        None
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetryPayload {
    pub anonymous_id: String,
    pub app_version: String,
    pub schema_version: Option<String>,
    /// Days since the Unix epoch (UTC).
    pub day: u64,
}

/// POSTs a [`TelemetryPayload`] as JSON to a fixed endpoint.
#[derive(Clone)]
pub struct TelemetryReporter {
    client: reqwest::Client,
    endpoint: String,
    settings: Arc<dyn SettingsRepository>,
    timeout: Duration,
}

impl TelemetryReporter {
    pub fn new(endpoint: String, settings: Arc<dyn SettingsRepository>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("build telemetry reqwest client");

        Self {
            client,
            endpoint,
            settings,
            timeout,
        }
    }

    /// Build today's payload, or `None` when telemetry is off or today's
    /// report already went out. Stamps the day before sending so a failed
    /// delivery is not retried until tomorrow.
    fn prepare(&self) -> Result<Option<TelemetryPayload>> {
        let active = self
            .settings
            .get_setting(ACTIVE_KEY)?
            .is_some_and(|v| v == "true" || v == "1");
        if !active {
            return Ok(None);
        }

        let day = today();
        let last = self
            .settings
            .get_setting(LAST_UPDATE_KEY)?
            .and_then(|v| v.parse::<u64>().ok());
        if last == Some(day) {
            return Ok(None);
        }

        let anonymous_id = match self.settings.get_setting(ANONYMOUS_ID_KEY)? {
            Some(id) => id,
            None => {
                let id = generate_anonymous_id();
                self.settings.save_setting(ANONYMOUS_ID_KEY, &id)?;
                id
            }
        };
        self.settings.save_setting(LAST_UPDATE_KEY, &day.to_string())?;

        Ok(Some(TelemetryPayload {
            anonymous_id,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: self.settings.get_setting(DB_VERSION_KEY)?,
            day,
        }))
    }
}

impl ReportService for TelemetryReporter {
    fn send_anonymous_telemetry(&self) -> Option<TelemetryHandle> {
        let payload = match self.prepare() {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "telemetry skipped: settings unavailable");
                return None;
            }
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let report = async move { deliver(&client, &endpoint, &payload).await };

        Some(TelemetryHandle::spawn(report, self.timeout))
    }
}

/// POST the payload; any non-2xx answer counts as a failure.
async fn deliver(
    client: &reqwest::Client,
    endpoint: &str,
    payload: &TelemetryPayload,
) -> Result<(), TelemetryError> {
    let resp = client.post(endpoint).json(payload).send().await?;
    if !resp.status().is_success() {
        return Err(TelemetryError::Status(resp.status()));
    }
    debug!(day = payload.day, "telemetry delivered");
    Ok(())
}

/// 32 random hex chars; carries nothing that identifies the installation.
pub fn generate_anonymous_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}

fn today() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        / SECS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSettings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reporter(endpoint: String, settings: Arc<FakeSettings>) -> TelemetryReporter {
        TelemetryReporter::new(endpoint, settings, Duration::from_secs(5))
    }

    #[test]
    fn anonymous_id_format() {
        let id = generate_anonymous_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_anonymous_id());
    }

    #[tokio::test]
    async fn opted_out_sends_nothing() {
        let settings = Arc::new(FakeSettings::default());
        let r = reporter("http://127.0.0.1:9/telemetry".into(), settings.clone());
        assert!(r.send_anonymous_telemetry().is_none());
        assert_eq!(settings.value(LAST_UPDATE_KEY), None);
    }

    #[tokio::test]
    async fn sends_once_per_day() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/telemetry"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock)
            .await;

        let settings = Arc::new(FakeSettings::with(&[
            (ACTIVE_KEY, "true"),
            (DB_VERSION_KEY, "2.1.4"),
        ]));
        let r = reporter(format!("{}/telemetry", mock.uri()), settings.clone());

        let handle = r.send_anonymous_telemetry().expect("first report of the day");
        handle.wait().await.unwrap();
        assert_eq!(settings.value(LAST_UPDATE_KEY), Some(today().to_string()));
        let id = settings.value(ANONYMOUS_ID_KEY).expect("anonymous id persisted");

        assert!(r.send_anonymous_telemetry().is_none());
        assert_eq!(settings.value(ANONYMOUS_ID_KEY), Some(id));
    }

    #[tokio::test]
    async fn stale_day_sends_again() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock)
            .await;

        let settings = Arc::new(FakeSettings::with(&[
            (ACTIVE_KEY, "1"),
            (LAST_UPDATE_KEY, "1"),
            (ANONYMOUS_ID_KEY, "abc"),
        ]));
        let r = reporter(mock.uri(), settings);
        r.send_anonymous_telemetry().unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_report_surfaces_on_wait() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock)
            .await;

        let settings = Arc::new(FakeSettings::with(&[(ACTIVE_KEY, "true")]));
        let r = reporter(mock.uri(), settings);
        let err = r.send_anonymous_telemetry().unwrap().wait().await.unwrap_err();
        assert!(matches!(err, TelemetryError::Status(s) if s.as_u16() == 500), "{err}");
    }

    #[tokio::test]
    async fn wait_times_out() {
        let handle = TelemetryHandle::spawn(
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), TelemetryError>(())
            },
            Duration::from_millis(20),
        );
        assert!(matches!(
            handle.wait().await,
            Err(TelemetryError::TimedOut(_))
        ));
    }

    #[tokio::test]
    async fn panicking_report_is_a_join_error() {
        let handle = TelemetryHandle::spawn(
            async {
                if true {
                    panic!("report blew up");
                }
                Ok::<(), TelemetryError>(())
            },
            Duration::from_secs(1),
        );
        assert!(matches!(handle.wait().await, Err(TelemetryError::Join(_))));
    }
}
