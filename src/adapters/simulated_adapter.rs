//! Simulated HP 4280A connection
//!
//! Stands in for the GPIB session when no hardware is attached (and always for the demo
//! account). It provides:
//! - Parameter tracking from the numeric commands it receives (`PV 5.0`, `PS -5.0`, ...)
//! - Canned answers for parameter queries and `ID?`
//! - Synthetic block data for `READ?` shaped by the tracked function, bias mode and sweep
//! - Controllable failure injection and a command log for test verification

use super::{InstrumentConnection, ID_QUERY};
use crate::error::{AppResult, LabError};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Identification string of the simulated meter.
pub const SIMULATED_DEVICE_ID: &str = "HP4280A Simulated Device";

/// VISA status code for "timeout expired before operation completed".
const VISA_ERROR_TMO: i32 = -1_073_807_339;

/// Upper bound on generated records so a zero step cannot run away.
const MAX_SIMULATED_POINTS: usize = 10_000;

/// Shared view of a simulator's command log and failure switch.
///
/// The controller owns the boxed connection, so tests keep one of these to look inside.
#[derive(Clone, Default)]
pub struct SimulatorHandle {
    call_log: Arc<Mutex<Vec<String>>>,
    fail_next: Arc<AtomicBool>,
}

impl SimulatorHandle {
    /// Every command written so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Forget the recorded commands.
    pub fn clear(&self) {
        if let Ok(mut log) = self.call_log.lock() {
            log.clear();
        }
    }

    /// Make the next write or read fail with a bus timeout.
    pub fn trigger_failure(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn record(&self, command: &str) {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(command.to_string());
        }
    }

    fn take_failure(&self) -> bool {
        self.fail_next.swap(false, Ordering::SeqCst)
    }
}

/// Instrument settings the simulator has been told about.
#[derive(Debug, Clone)]
struct SimulatedState {
    values: HashMap<String, f64>,
    function: u8,
    bias_mode: u8,
}

impl Default for SimulatedState {
    fn default() -> Self {
        let values = [
            ("PV", 5.0),
            ("PS", 0.0),
            ("PP", 5.0),
            ("PE", 0.1),
            ("PL", 0.01),
            ("PD", 0.03),
            ("PN", 10.0),
            ("PM", 0.0),
            ("PU", 0.0),
            ("PH", 1.0),
            ("PT", 0.01),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            values,
            function: 1,
            bias_mode: 2,
        }
    }
}

impl SimulatedState {
    fn value(&self, mnemonic: &str) -> f64 {
        self.values.get(mnemonic).copied().unwrap_or(0.0)
    }

    /// Apply a non-query command. Unknown commands are accepted silently, like the meter.
    fn apply(&mut self, command: &str) {
        if let Some((mnemonic, value)) = command.split_once(' ') {
            if let Ok(value) = value.trim().parse::<f64>() {
                self.values.insert(mnemonic.trim().to_string(), value);
            }
            return;
        }
        let digit = |prefix: &str| {
            command
                .strip_prefix(prefix)
                .and_then(|rest| rest.parse::<u8>().ok())
        };
        if let Some(function) = digit("FN") {
            self.function = function;
        } else if let Some(bias) = digit("IB") {
            self.bias_mode = bias;
        }
    }

    fn is_time_function(&self) -> bool {
        matches!(self.function, 4..=6)
    }

    fn sweep_voltages(&self) -> Vec<f64> {
        let start = self.value("PS");
        let stop = self.value("PP");
        let step = self.value("PE");
        let mut voltages = if step <= 0.0 || stop < start {
            vec![start]
        } else {
            let count = (((stop - start) / step) + 1e-9).floor() as usize + 1;
            (0..count.min(MAX_SIMULATED_POINTS))
                .map(|i| start + step * i as f64)
                .collect()
        };
        if self.bias_mode == 3 {
            let back: Vec<f64> = voltages.iter().rev().skip(1).copied().collect();
            voltages.extend(back);
        }
        voltages
    }

    fn reading_times(&self) -> Vec<f64> {
        let readings = (self.value("PN").max(1.0) as usize).min(MAX_SIMULATED_POINTS);
        let interval = self.value("PT").max(0.0);
        (0..readings).map(|i| interval * i as f64).collect()
    }

    /// One measured record for bias `v` (sweep) or elapsed time `t` (C-t).
    fn record(&self, rng: &mut impl Rng, axis: f64) -> Vec<String> {
        let noise = 1.0 + rng.gen_range(-0.002..0.002);
        let capacitance = if self.is_time_function() {
            relaxation_capacitance(axis, self.value("PT") * self.value("PN").max(1.0) / 3.0)
        } else {
            mos_capacitance(axis)
        } * noise;
        let conductance = 1.0e-6 * (1.0 + rng.gen_range(0.0..0.5));

        let c = format!("{:+.4E}", capacitance);
        let g = format!("{:+.4E}", conductance);
        let x = format!("{:+.4E}", axis);
        match self.function {
            2 | 5 => vec![c, x],
            3 | 6 => vec![g, x],
            _ => vec![c, g, x],
        }
    }

    fn block(&self) -> String {
        let mut rng = rand::thread_rng();
        let axis = if self.is_time_function() {
            self.reading_times()
        } else {
            self.sweep_voltages()
        };
        axis.into_iter()
            .flat_map(|x| self.record(&mut rng, x))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn single_reading(&self) -> String {
        let mut rng = rand::thread_rng();
        let axis = if self.is_time_function() {
            0.0
        } else {
            self.value("PV")
        };
        self.record(&mut rng, axis).join(",")
    }
}

/// High-frequency C-V curve of a p-type MOS capacitor, in farads.
fn mos_capacitance(bias_v: f64) -> f64 {
    const C_OX: f64 = 100.0e-12;
    const C_MIN: f64 = 20.0e-12;
    const V_FB: f64 = 0.5;
    C_MIN + (C_OX - C_MIN) / (1.0 + ((bias_v - V_FB) / 0.4).exp())
}

/// Capacitance recovering from deep depletion after a bias pulse, in farads.
fn relaxation_capacitance(elapsed_s: f64, tau_s: f64) -> f64 {
    const C_EQ: f64 = 35.0e-12;
    const C_DD: f64 = 15.0e-12;
    if tau_s <= 0.0 {
        return C_EQ;
    }
    C_EQ - (C_EQ - C_DD) * (-elapsed_s / tau_s).exp()
}

/// Simulated connection to an HP 4280A
///
/// # Example
///
/// ```
/// use hp4280a_lab::adapters::{InstrumentConnection, SimulatedAdapter};
///
/// # tokio_test::block_on(async {
/// let mut adapter = SimulatedAdapter::new("GPIB0::17::INSTR");
/// adapter.connect().await.unwrap();
/// assert_eq!(adapter.query("PV?").await.unwrap(), "5.0");
/// # })
/// ```
pub struct SimulatedAdapter {
    resource: String,
    timeout: Duration,
    connected: bool,
    state: SimulatedState,
    pending: VecDeque<String>,
    handle: SimulatorHandle,
}

impl SimulatedAdapter {
    /// Create a new, unopened simulated connection.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            timeout: Duration::from_millis(10_000),
            connected: false,
            state: SimulatedState::default(),
            pending: VecDeque::new(),
            handle: SimulatorHandle::default(),
        }
    }

    /// Set the initial I/O timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Handle for inspecting traffic after the adapter has been boxed.
    pub fn handle(&self) -> SimulatorHandle {
        self.handle.clone()
    }

    fn check_io(&self) -> AppResult<()> {
        if !self.connected {
            return Err(LabError::NotConnected);
        }
        if self.handle.take_failure() {
            return Err(LabError::Visa {
                code: VISA_ERROR_TMO,
                description: "Timeout expired before operation completed.".to_string(),
            });
        }
        Ok(())
    }

    fn answer(&self, query: &str) -> String {
        match query {
            ID_QUERY | "*IDN?" => SIMULATED_DEVICE_ID.to_string(),
            "READ?" => self.state.block(),
            _ => {
                let mnemonic = query.trim_end_matches('?');
                match self.state.values.get(mnemonic) {
                    Some(value) => format!("{value:?}"),
                    None => "0.0".to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl InstrumentConnection for SimulatedAdapter {
    async fn connect(&mut self) -> AppResult<()> {
        tracing::info!(resource = %self.resource, "Simulated connection successful");
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> AppResult<()> {
        if self.connected {
            tracing::info!(resource = %self.resource, "Simulated disconnection");
            self.connected = false;
        } else {
            tracing::debug!("Simulated device is already disconnected");
        }
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn write(&mut self, command: &str) -> AppResult<()> {
        self.check_io()?;
        let command = command.trim();
        self.handle.record(command);
        tracing::trace!(command, "Simulated write");

        if command.ends_with('?') {
            let answer = self.answer(command);
            self.pending.push_back(answer);
        } else if command == "MEASURE" {
            let reading = self.state.single_reading();
            self.pending.push_back(reading);
        } else {
            self.state.apply(command);
        }
        Ok(())
    }

    async fn read(&mut self) -> AppResult<String> {
        self.check_io()?;
        self.pending
            .pop_front()
            .ok_or(LabError::Timeout(self.timeout.as_millis() as u64))
    }

    async fn clear(&mut self) -> AppResult<()> {
        self.check_io()?;
        self.pending.clear();
        tracing::debug!("Clearing the simulated instrument");
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn set_timeout(&mut self, timeout: Duration) -> AppResult<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.resource
    }

    fn adapter_type(&self) -> &str {
        "simulated"
    }
}
