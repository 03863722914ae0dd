//! Per-user sessions.
//!
//! Every logged in user owns a [`UserSession`]: the sweep and C-t values last entered in
//! the parameter form, the selected measurement mode, and (once the meter has been
//! reached) a controller. Controllers are shared as `Arc<tokio::sync::Mutex<Hp4280a>>`,
//! so one request at a time talks to a given meter while the registry map itself stays
//! readable.
//!
//! The demo account always gets a simulated meter, as does everybody when
//! `instrument.simulated` is set in the configuration.

use crate::adapters::{InstrumentConnection, SimulatedAdapter, VisaAdapter};
use crate::config::InstrumentConfig;
use crate::data::CsvStore;
use crate::database::DEMO_EMAIL;
use crate::error::{AppResult, LabError};
use crate::instrument::hp4280a::{CtParameters, Hp4280a, MeasureFunction, SweepParameters};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Reported when the meter cannot be reached.
pub const CONNECT_FAILED: &str =
    "Failed to connect to the GPIB device. If reconnected, please wait 10 seconds before trying again.";

const NOT_LOGGED_IN: &str = "User not logged in.";

pub type SharedController = Arc<Mutex<Hp4280a>>;

/// Builds the connection for a new controller; the flag asks for a simulated meter.
pub type ConnectionFactory =
    Arc<dyn Fn(&InstrumentConfig, bool) -> Box<dyn InstrumentConnection> + Send + Sync>;

/// VISA for real users, the simulator for the demo account.
pub fn default_connection_factory() -> ConnectionFactory {
    Arc::new(|config: &InstrumentConfig, simulated: bool| {
        if simulated {
            Box::new(SimulatedAdapter::new(config.resource.clone()).with_timeout(config.timeout()))
                as Box<dyn InstrumentConnection>
        } else {
            Box::new(
                VisaAdapter::new(config.resource.clone())
                    .with_timeout(config.timeout())
                    .with_query_delay(Duration::from_millis(config.query_delay_ms)),
            )
        }
    })
}

/// Values remembered between requests of one user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub sweep: SweepParameters,
    pub ct: CtParameters,
    pub mode: MeasureFunction,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sweep: SweepParameters::web_default(),
            ct: CtParameters::default(),
            mode: MeasureFunction::Cgt,
        }
    }
}

#[derive(Default)]
struct UserSession {
    settings: SessionSettings,
    controller: Option<SharedController>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Success,
    Failure,
}

/// Connection indicator shown next to every page of the web client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: LinkState,
    pub terminal_output: Vec<String>,
}

impl ConnectionStatus {
    fn success(line: &str) -> Self {
        Self {
            status: LinkState::Success,
            terminal_output: vec![line.to_string()],
        }
    }

    fn failure(line: &str) -> Self {
        Self {
            status: LinkState::Failure,
            terminal_output: vec![line.to_string()],
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LinkState::Success
    }
}

/// Sessions of all logged in users, keyed by email.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, UserSession>>,
    factory: ConnectionFactory,
    instrument: InstrumentConfig,
    storage: CsvStore,
}

impl SessionRegistry {
    pub fn new(instrument: InstrumentConfig, storage: CsvStore) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory: default_connection_factory(),
            instrument,
            storage,
        }
    }

    /// Replace the connection factory (tests inject simulators they keep a handle on).
    pub fn with_factory(mut self, factory: ConnectionFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn storage(&self) -> &CsvStore {
        &self.storage
    }

    /// Start a session for `email`; an existing one is kept as it is.
    pub async fn open(&self, email: &str) {
        self.sessions
            .write()
            .await
            .entry(email.to_string())
            .or_default();
    }

    pub async fn is_open(&self, email: &str) -> bool {
        self.sessions.read().await.contains_key(email)
    }

    pub async fn settings(&self, email: &str) -> Option<SessionSettings> {
        self.sessions.read().await.get(email).map(|s| s.settings)
    }

    /// Modify the stored settings and return the new values.
    pub async fn update_settings<F>(&self, email: &str, update: F) -> AppResult<SessionSettings>
    where
        F: FnOnce(&mut SessionSettings),
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(email)
            .ok_or_else(|| LabError::Auth(NOT_LOGGED_IN.to_string()))?;
        update(&mut session.settings);
        Ok(session.settings)
    }

    /// Controller of `email`, if one has been connected.
    pub async fn controller(&self, email: &str) -> Option<SharedController> {
        self.sessions
            .read()
            .await
            .get(email)
            .and_then(|s| s.controller.clone())
    }

    /// Existing controller of `email`, or a freshly connected one.
    pub async fn get_or_connect(&self, email: &str) -> AppResult<SharedController> {
        if let Some(existing) = self.controller(email).await {
            return Ok(existing);
        }
        let settings = self
            .settings(email)
            .await
            .ok_or_else(|| LabError::Auth(NOT_LOGGED_IN.to_string()))?;

        let simulated = self.instrument.simulated || email == DEMO_EMAIL;
        let conn = (self.factory)(&self.instrument, simulated);
        let mut controller = Hp4280a::new(conn, settings.sweep, self.storage.clone())
            .with_timing(self.instrument.timing())
            .with_ct_parameters(settings.ct);

        if let Err(e) = controller.connect().await {
            warn!(email, error = %e, "Instrument connection failed");
            return Err(LabError::Instrument(format!("{CONNECT_FAILED} ({e})")));
        }
        if !controller.check_connection(false).await {
            return Err(LabError::Instrument(CONNECT_FAILED.to_string()));
        }

        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(email) else {
            // logged out while connecting
            drop(sessions);
            let _ = controller.disconnect().await;
            return Err(LabError::Auth(NOT_LOGGED_IN.to_string()));
        };
        if let Some(existing) = &session.controller {
            return Ok(existing.clone());
        }
        let shared = Arc::new(Mutex::new(controller));
        session.controller = Some(shared.clone());
        info!(email, simulated, "Instrument controller created");
        Ok(shared)
    }

    /// Drop and disconnect the controller of `email`. Returns whether there was one.
    pub async fn disconnect(&self, email: &str) -> AppResult<bool> {
        let controller = self
            .sessions
            .write()
            .await
            .get_mut(email)
            .and_then(|s| s.controller.take());
        match controller {
            Some(controller) => {
                controller.lock().await.disconnect().await?;
                info!(email, "Instrument controller removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// End the session of `email`, disconnecting its meter.
    pub async fn close(&self, email: &str) {
        let removed = self.sessions.write().await.remove(email);
        if let Some(controller) = removed.and_then(|s| s.controller) {
            if let Err(e) = controller.lock().await.disconnect().await {
                warn!(email, error = %e, "Disconnect on logout failed");
            }
        }
    }

    /// Reconnect from scratch and send a device clear.
    pub async fn reset(&self, email: &str) -> AppResult<SharedController> {
        if let Err(e) = self.disconnect(email).await {
            warn!(email, error = %e, "Disconnect before reset failed");
        }
        let controller = self.get_or_connect(email).await?;
        controller.lock().await.clear().await?;
        info!(email, "Connection reset");
        Ok(controller)
    }

    /// Move a session after the user changed their email address.
    pub async fn rename(&self, old_email: &str, new_email: &str) {
        if old_email == new_email {
            return;
        }
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.remove(old_email) {
            sessions.insert(new_email.to_string(), session);
        }
    }

    /// Connection indicator for `email`, from the controller's cached state.
    pub async fn status(&self, email: &str) -> ConnectionStatus {
        if !self.is_open(email).await {
            return ConnectionStatus::failure(NOT_LOGGED_IN);
        }
        let Some(controller) = self.controller(email).await else {
            return ConnectionStatus::failure("No GPIB connection found for current session.");
        };
        // a sweep holds the lock for minutes; the meter is evidently connected then
        let Ok(mut controller) = controller.try_lock() else {
            return ConnectionStatus::success("Measurement in progress.");
        };
        if controller.check_connection(false).await {
            ConnectionStatus::success("Connection to device established.")
        } else {
            ConnectionStatus::failure("Failed to connect to device.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::simulated_adapter::SimulatorHandle;
    use std::sync::Mutex as StdMutex;

    fn registry(dir: &std::path::Path) -> (SessionRegistry, Arc<StdMutex<Vec<SimulatorHandle>>>) {
        let handles = Arc::new(StdMutex::new(Vec::new()));
        let seen = handles.clone();
        let factory: ConnectionFactory = Arc::new(move |config: &InstrumentConfig, _| {
            let adapter = SimulatedAdapter::new(config.resource.clone());
            seen.lock().unwrap().push(adapter.handle());
            Box::new(adapter) as Box<dyn InstrumentConnection>
        });
        let config = InstrumentConfig {
            write_delay_ms: 0,
            ..InstrumentConfig::default()
        };
        let registry = SessionRegistry::new(config, CsvStore::new(dir)).with_factory(factory);
        (registry, handles)
    }

    #[tokio::test]
    async fn status_follows_session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry(dir.path());
        let email = "user@lab.org";

        assert_eq!(registry.status(email).await.terminal_output, vec![NOT_LOGGED_IN]);

        registry.open(email).await;
        let status = registry.status(email).await;
        assert!(!status.is_success());
        assert_eq!(
            status.terminal_output,
            vec!["No GPIB connection found for current session."]
        );

        registry.get_or_connect(email).await.unwrap();
        assert!(registry.status(email).await.is_success());

        registry.close(email).await;
        assert!(!registry.is_open(email).await);
    }

    #[tokio::test]
    async fn controller_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, handles) = registry(dir.path());
        registry.open("a@lab.org").await;

        let first = registry.get_or_connect("a@lab.org").await.unwrap();
        let second = registry.get_or_connect("a@lab.org").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(handles.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connect_requires_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry(dir.path());
        assert!(matches!(
            registry.get_or_connect("ghost@lab.org").await,
            Err(LabError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn reset_builds_a_new_controller_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, handles) = registry(dir.path());
        registry.open("a@lab.org").await;

        let first = registry.get_or_connect("a@lab.org").await.unwrap();
        let second = registry.reset("a@lab.org").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!first.lock().await.is_connected());
        assert_eq!(handles.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn settings_survive_rename() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry(dir.path());
        registry.open("old@lab.org").await;
        registry
            .update_settings("old@lab.org", |s| s.sweep.step_v = 0.25)
            .await
            .unwrap();

        registry.rename("old@lab.org", "new@lab.org").await;
        assert!(registry.settings("old@lab.org").await.is_none());
        let settings = registry.settings("new@lab.org").await.unwrap();
        assert_eq!(settings.sweep.step_v, 0.25);
        assert_eq!(settings.mode, MeasureFunction::Cgt);
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[tokio::test]
    async fn real_users_need_the_visa_feature() {
        let dir = tempfile::tempdir().unwrap();
        let config = InstrumentConfig {
            write_delay_ms: 0,
            ..InstrumentConfig::default()
        };
        let registry = SessionRegistry::new(config, CsvStore::new(dir.path()));
        registry.open("user@lab.org").await;
        registry.open(DEMO_EMAIL).await;

        let err = registry.get_or_connect("user@lab.org").await.unwrap_err();
        assert!(err.to_string().contains(CONNECT_FAILED));
        assert!(registry.get_or_connect(DEMO_EMAIL).await.is_ok());
    }
}
