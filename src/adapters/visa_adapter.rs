//! VISA adapter for GPIB/USB/Ethernet instruments
//!
//! Wraps the `visa-rs` crate. VISA calls are synchronous, so every I/O operation runs
//! on Tokio's blocking pool to keep the runtime responsive during multi-minute sweeps.
//!
//! Supports resource strings like:
//! - "GPIB1::17::INSTR" (GPIB interface, the HP 4280A default address)
//! - "USB0::0x1234::0x5678::SERIAL::INSTR" (USB-GPIB bridges exposing USBTMC)
//! - "TCPIP0::192.168.1.100::gpib0,17::INSTR" (LAN-GPIB gateways)
//!
//! Without the `instrument_visa` feature the adapter still exists, so configuration
//! and session code stay identical, but `connect` reports the missing feature.

use super::{InstrumentConnection, ID_QUERY};
use crate::error::{AppResult, LabError};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use std::sync::{Arc, Mutex};

/// VISA adapter for instrument communication
pub struct VisaAdapter {
    /// VISA resource string (e.g., "GPIB1::17::INSTR")
    pub(crate) resource_string: String,

    /// Read/write timeout
    pub(crate) timeout: Duration,

    /// Pause between the write and read halves of a query
    pub(crate) query_delay: Duration,

    /// Line terminator for commands
    pub(crate) line_terminator: String,

    connected: bool,

    #[cfg(feature = "instrument_visa")]
    session: Option<Arc<Mutex<session::VisaSession>>>,
}

impl VisaAdapter {
    /// Create a new VISA adapter with default settings
    ///
    /// # Arguments
    /// * `resource_string` - VISA resource identifier (e.g., "GPIB1::17::INSTR")
    pub fn new(resource_string: impl Into<String>) -> Self {
        Self {
            resource_string: resource_string.into(),
            timeout: Duration::from_millis(10_000),
            query_delay: Duration::from_millis(100),
            line_terminator: "\n".to_string(),
            connected: false,
            #[cfg(feature = "instrument_visa")]
            session: None,
        }
    }

    /// Set read/write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the delay between writing a query and reading the answer
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Set line terminator for commands
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    #[cfg(feature = "instrument_visa")]
    fn session(&self) -> AppResult<Arc<Mutex<session::VisaSession>>> {
        self.session.clone().ok_or(LabError::NotConnected)
    }

    #[cfg(feature = "instrument_visa")]
    async fn blocking<T, F>(&self, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut session::VisaSession) -> AppResult<T> + Send + 'static,
    {
        let session = self.session()?;
        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| LabError::Instrument("VISA session lock poisoned".to_string()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| LabError::Instrument(format!("VISA worker failed: {e}")))?
    }
}

/// Buffer size of each VISA read call.
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
const READ_CHUNK: usize = 64 * 1024;

/// Collect one complete message. VISA fills the whole buffer when END has not been seen
/// yet, so reading stops at the first short read. Embedded CR LF are kept.
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
fn read_message<R: std::io::Read>(mut reader: R, chunk: usize) -> std::io::Result<Vec<u8>> {
    let mut message = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = reader.read(&mut buf)?;
        message.extend_from_slice(&buf[..n]);
        if n < chunk {
            return Ok(message);
        }
    }
}

#[cfg(feature = "instrument_visa")]
mod session {
    //! Thin synchronous wrapper around one open VISA session.

    use crate::error::{AppResult, LabError};
    use std::ffi::CString;
    use std::io::Write;
    use std::time::Duration;
    use visa_rs::prelude::*;

    pub(super) struct VisaSession {
        // Dropping the resource manager closes every session it opened.
        _rm: DefaultRM,
        instr: Instrument,
        terminator: String,
    }

    pub(super) fn to_lab_error(err: visa_rs::Error) -> LabError {
        let code: i32 = err.0.into();
        LabError::Visa {
            code,
            description: err.to_string(),
        }
    }

    fn io_to_lab_error(err: std::io::Error) -> LabError {
        to_lab_error(visa_rs::io_to_vs_err(err))
    }

    impl VisaSession {
        pub(super) fn open(resource: &str, timeout: Duration, terminator: &str) -> AppResult<Self> {
            let rm = DefaultRM::new().map_err(to_lab_error)?;
            let name = CString::new(resource)
                .map_err(|e| LabError::Configuration(format!("invalid resource string: {e}")))?;
            let instr = rm
                .open(&name.into(), AccessMode::NO_LOCK, timeout)
                .map_err(to_lab_error)?;
            let mut session = Self {
                _rm: rm,
                instr,
                terminator: terminator.to_string(),
            };
            session.set_timeout(timeout)?;
            Ok(session)
        }

        pub(super) fn set_timeout(&mut self, timeout: Duration) -> AppResult<()> {
            let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
            let attr = attribute::AttrTmoValue::new_checked(millis).ok_or_else(|| {
                LabError::Configuration(format!("VISA rejects a timeout of {millis} ms"))
            })?;
            self.instr.set_attr(attr).map_err(to_lab_error)
        }

        pub(super) fn write(&mut self, command: &str) -> AppResult<()> {
            let line = format!("{command}{}", self.terminator);
            (&self.instr)
                .write_all(line.as_bytes())
                .map_err(io_to_lab_error)
        }

        pub(super) fn read(&mut self) -> AppResult<String> {
            let bytes = super::read_message(&self.instr, super::READ_CHUNK)
                .map_err(io_to_lab_error)?;
            Ok(String::from_utf8_lossy(&bytes)
                .trim_end_matches(['\r', '\n'])
                .to_string())
        }

        pub(super) fn clear(&mut self) -> AppResult<()> {
            self.instr.clear().map_err(to_lab_error)
        }
    }
}

#[async_trait]
impl InstrumentConnection for VisaAdapter {
    #[cfg(feature = "instrument_visa")]
    async fn connect(&mut self) -> AppResult<()> {
        let resource = self.resource_string.clone();
        let timeout = self.timeout;
        let terminator = self.line_terminator.clone();
        let opened = tokio::task::spawn_blocking(move || {
            session::VisaSession::open(&resource, timeout, &terminator)
        })
        .await
        .map_err(|e| LabError::Instrument(format!("VISA worker failed: {e}")))?;

        match opened {
            Ok(session) => {
                self.session = Some(Arc::new(Mutex::new(session)));
            }
            Err(err) => {
                if err.is_resource_not_found() {
                    tracing::error!(
                        resource = %self.resource_string,
                        "GPIB device not found. Please check the connection and address."
                    );
                }
                self.connected = false;
                return Err(err);
            }
        }

        match self.device_id().await {
            Ok(idn) => {
                tracing::info!(resource = %self.resource_string, instrument_id = %idn.trim(), "Connected");
                self.connected = true;
                Ok(())
            }
            Err(err) => {
                self.session = None;
                self.connected = false;
                Err(err)
            }
        }
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn connect(&mut self) -> AppResult<()> {
        self.connected = false;
        Err(LabError::FeatureNotEnabled("instrument_visa".to_string()))
    }

    async fn disconnect(&mut self) -> AppResult<()> {
        #[cfg(feature = "instrument_visa")]
        {
            if self.session.take().is_some() {
                tracing::info!(resource = %self.resource_string, "Disconnected");
            }
        }
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn check_connection(&mut self, force_check: bool) -> bool {
        if force_check {
            self.connected = self.device_id().await.is_ok();
        }
        self.connected
    }

    #[cfg(feature = "instrument_visa")]
    async fn write(&mut self, command: &str) -> AppResult<()> {
        let command = command.to_string();
        tracing::debug!(command = %command, "GPIB write");
        self.blocking(move |s| s.write(&command)).await
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn write(&mut self, _command: &str) -> AppResult<()> {
        Err(LabError::NotConnected)
    }

    #[cfg(feature = "instrument_visa")]
    async fn read(&mut self) -> AppResult<String> {
        let response = self.blocking(|s| s.read()).await?;
        tracing::debug!(bytes = response.len(), "GPIB read");
        Ok(response)
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn read(&mut self) -> AppResult<String> {
        Err(LabError::NotConnected)
    }

    async fn query(&mut self, command: &str) -> AppResult<String> {
        self.write(command).await?;
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        self.read().await
    }

    #[cfg(feature = "instrument_visa")]
    async fn clear(&mut self) -> AppResult<()> {
        tracing::info!(resource = %self.resource_string, "Clearing the instrument");
        self.blocking(|s| s.clear()).await
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn clear(&mut self) -> AppResult<()> {
        Err(LabError::NotConnected)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn set_timeout(&mut self, timeout: Duration) -> AppResult<()> {
        self.timeout = timeout;
        #[cfg(feature = "instrument_visa")]
        {
            if self.session.is_some() {
                self.blocking(move |s| s.set_timeout(timeout)).await?;
            }
        }
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.resource_string
    }

    fn adapter_type(&self) -> &str {
        "visa"
    }

    async fn device_id(&mut self) -> AppResult<String> {
        self.query(ID_QUERY).await
    }
}
