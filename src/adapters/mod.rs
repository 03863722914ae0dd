//! Instrument connections.
//!
//! Every connection to the meter goes through [`InstrumentConnection`], which mirrors the
//! small surface a VISA message-based session offers: write a command, read a response,
//! query (write then read), device clear, and a per-session I/O timeout.
//!
//! - [`VisaAdapter`] talks to real hardware through the system VISA library
//!   (`instrument_visa` feature).
//! - [`SimulatedAdapter`] fabricates plausible responses so the whole stack can run
//!   without a GPIB card.

use crate::error::AppResult;
use async_trait::async_trait;
use std::time::Duration;

pub mod simulated_adapter;
pub mod visa_adapter;

pub use simulated_adapter::SimulatedAdapter;
pub use visa_adapter::VisaAdapter;

/// Identification query understood by the HP 4280A.
pub const ID_QUERY: &str = "ID?";

#[async_trait]
pub trait InstrumentConnection: Send + Sync {
    /// Open the session and verify the instrument answers.
    async fn connect(&mut self) -> AppResult<()>;

    /// Close the session. Closing an already closed session is not an error.
    async fn disconnect(&mut self) -> AppResult<()>;

    /// Last known connection state.
    fn is_connected(&self) -> bool;

    /// Connection state; with `force_check` the instrument is actually queried.
    async fn check_connection(&mut self, force_check: bool) -> bool {
        if !force_check {
            return self.is_connected();
        }
        self.device_id().await.is_ok()
    }

    /// Send one command. The adapter appends the line terminator.
    async fn write(&mut self, command: &str) -> AppResult<()>;

    /// Read one response, with the terminator stripped.
    async fn read(&mut self) -> AppResult<String>;

    /// Write `command` and read its response.
    async fn query(&mut self, command: &str) -> AppResult<String> {
        self.write(command).await?;
        self.read().await
    }

    /// Device clear (GPIB SDC).
    async fn clear(&mut self) -> AppResult<()>;

    /// Current I/O timeout.
    fn timeout(&self) -> Duration;

    /// Change the I/O timeout of the open session.
    async fn set_timeout(&mut self, timeout: Duration) -> AppResult<()>;

    /// VISA resource string this connection targets.
    fn resource(&self) -> &str;

    /// Short adapter kind, e.g. `"visa"` or `"simulated"`.
    fn adapter_type(&self) -> &str;

    /// Identification string reported by the instrument.
    async fn device_id(&mut self) -> AppResult<String> {
        self.query(ID_QUERY).await
    }

    /// Human readable description for logs.
    fn info(&self) -> String {
        format!(
            "{}({} @ {}ms timeout)",
            self.adapter_type(),
            self.resource(),
            self.timeout().as_millis()
        )
    }
}
