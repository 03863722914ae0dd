//! HP 4280A controller.
//!
//! [`Hp4280a`] owns one [`InstrumentConnection`] and turns high-level requests (preset the
//! meter for a C-V sweep, run the sweep, pulse through a bias range) into the ASCII
//! command sequences the meter expects. It mirrors every setting it sends, so the step
//! count and expected sweep time can be computed without asking the instrument.
//!
//! Long sweeps raise the connection timeout while the block response is pending and put
//! the default timeout back afterwards, on success and on failure alike.

use super::block::BlockResponse;
use super::commands::{
    BiasMode, CableLength, Command, GroundMode, MeasRange, MeasureFunction, MeasurementSpeed,
    SignalLevel, TriggerMode,
};
use super::params::{CtParameters, SweepParameters};
use super::ControllerTiming;
use crate::adapters::InstrumentConnection;
use crate::data::CsvStore;
use crate::error::{AppResult, LabError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Mode commands sent by [`Hp4280a::default_single`] before the sweep values.
const SINGLE_PRESET: [Command; 9] = [
    Command::Bias(BiasMode::Single),
    Command::Speed(MeasurementSpeed::Medium),
    Command::Ground(GroundMode::Float),
    Command::Function(MeasureFunction::Cg),
    Command::CorrectionEnable,
    Command::Trigger(TriggerMode::Internal),
    Command::Cable(CableLength::OneMeter),
    Command::Signal(SignalLevel::Millivolts30),
    Command::Range(MeasRange::Auto),
];

/// Mode commands sent by [`Hp4280a::default_ct`] before the C-t values.
const CT_PRESET: [Command; 7] = [
    Command::Function(MeasureFunction::Ct),
    Command::Bias(BiasMode::Pulse),
    Command::Ground(GroundMode::Float),
    Command::Cable(CableLength::OneMeter),
    Command::Speed(MeasurementSpeed::Fast),
    Command::Range(MeasRange::Auto),
    Command::Trigger(TriggerMode::Internal),
];

const SWEEP_SEQUENCE: [Command; 5] = [
    Command::VoltageOutput,
    Command::SweepStart,
    Command::BlockMode,
    Command::BlockDump,
    Command::Read,
];

const PULSE_SEQUENCE: [Command; 4] = [
    Command::SweepStart,
    Command::BlockMode,
    Command::BlockDump,
    Command::Read,
];

/// Controller for one HP 4280A.
pub struct Hp4280a {
    conn: Box<dyn InstrumentConnection>,
    sweep: SweepParameters,
    ct: CtParameters,
    function: MeasureFunction,
    bias: BiasMode,
    timing: ControllerTiming,
    storage: CsvStore,
}

impl std::fmt::Debug for Hp4280a {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hp4280a").finish_non_exhaustive()
    }
}

impl Hp4280a {
    /// Create a controller around an unopened connection.
    ///
    /// Nothing is sent until [`connect`](Self::connect); `sweep` is only the locally
    /// tracked starting point.
    pub fn new(conn: Box<dyn InstrumentConnection>, sweep: SweepParameters, storage: CsvStore) -> Self {
        Self {
            conn,
            sweep,
            ct: CtParameters::default(),
            function: MeasureFunction::Cg,
            bias: BiasMode::Single,
            timing: ControllerTiming::default(),
            storage,
        }
    }

    pub fn with_timing(mut self, timing: ControllerTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_ct_parameters(mut self, ct: CtParameters) -> Self {
        self.ct = ct;
        self
    }

    pub async fn connect(&mut self) -> AppResult<()> {
        self.conn.connect().await?;
        self.conn.set_timeout(self.timing.default_timeout).await
    }

    pub async fn disconnect(&mut self) -> AppResult<()> {
        self.conn.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub async fn check_connection(&mut self, force_check: bool) -> bool {
        self.conn.check_connection(force_check).await
    }

    pub async fn device_id(&mut self) -> AppResult<String> {
        self.ensure_connected()?;
        self.conn.device_id().await
    }

    pub fn connection(&self) -> &dyn InstrumentConnection {
        self.conn.as_ref()
    }

    pub fn sweep_parameters(&self) -> SweepParameters {
        self.sweep
    }

    /// Replace the tracked sweep values without sending them; see [`single_config`](Self::single_config).
    pub fn set_sweep_parameters(&mut self, sweep: SweepParameters) {
        self.sweep = sweep;
    }

    pub fn ct_parameters(&self) -> CtParameters {
        self.ct
    }

    pub fn function(&self) -> MeasureFunction {
        self.function
    }

    pub fn bias_mode(&self) -> BiasMode {
        self.bias
    }

    pub fn timing(&self) -> ControllerTiming {
        self.timing
    }

    pub fn storage(&self) -> &CsvStore {
        &self.storage
    }

    /// Number of bias points of the tracked sweep.
    pub fn step_count(&self) -> f64 {
        self.sweep.step_count()
    }

    /// Expected duration of the tracked sweep in seconds.
    pub fn sweep_time_secs(&self) -> f64 {
        self.sweep.sweep_time_secs()
    }

    fn ensure_connected(&self) -> AppResult<()> {
        if self.conn.is_connected() {
            Ok(())
        } else {
            Err(LabError::NotConnected)
        }
    }

    /// Mirror a setting locally before it goes out on the bus.
    fn track(&mut self, command: Command) {
        match command {
            Command::DcBias(v) => self.sweep.dc_bias_v = v,
            Command::StartVoltage(v) => self.sweep.start_v = v,
            Command::StopVoltage(v) => self.sweep.stop_v = v,
            Command::StepVoltage(v) => self.sweep.step_v = v,
            Command::HoldTime(v) => self.sweep.hold_time_s = v,
            Command::StepTime(v) => self.sweep.step_time_s = v,
            Command::ReadingCount(n) => self.ct.readings = n,
            Command::MeasureVoltage(v) => self.ct.measure_v = v,
            Command::PulseVoltage(v) => self.ct.pulse_v = v,
            Command::PulseWidth(v) => self.ct.pulse_width_s = v,
            Command::MeasureInterval(v) => self.ct.measure_interval_s = v,
            Command::Function(function) => self.function = function,
            Command::Bias(mode) => self.bias = mode,
            _ => {}
        }
    }

    /// Send one command. Numeric settings are followed by the configured write delay.
    pub async fn command(&mut self, command: Command) -> AppResult<()> {
        self.ensure_connected()?;
        self.track(command);

        let text = command.to_string();
        debug!(command = %text, "Command");
        if let Err(err) = self.conn.write(&text).await {
            error!(command = %text, "{err}");
            return Err(err);
        }

        if command.is_numeric() && !self.timing.write_delay.is_zero() {
            tokio::time::sleep(self.timing.write_delay).await;
        }
        Ok(())
    }

    async fn send_all(&mut self, commands: &[Command]) -> AppResult<()> {
        for command in commands {
            self.command(*command).await?;
        }
        Ok(())
    }

    /// Read one response from the meter.
    pub async fn read(&mut self) -> AppResult<String> {
        self.ensure_connected()?;
        self.conn.read().await.inspect_err(|err| error!("{err}"))
    }

    /// Send an arbitrary query string and return the answer.
    pub async fn query(&mut self, query: &str) -> AppResult<String> {
        self.ensure_connected()?;
        self.conn.query(query).await.inspect_err(|err| error!("{err}"))
    }

    /// Device clear.
    pub async fn clear(&mut self) -> AppResult<()> {
        self.ensure_connected()?;
        self.conn.clear().await?;
        info!("Clearing the instrument");
        Ok(())
    }

    /// Read a block response and split it into records for the active function.
    pub async fn read_block_response(&mut self) -> AppResult<BlockResponse> {
        let raw = self.read().await?;
        let block = BlockResponse::parse(&raw, self.function)?;
        debug!(records = block.len(), "Data received");
        Ok(block)
    }

    pub async fn measure_start(&mut self) -> AppResult<()> {
        self.command(Command::Init).await
    }

    pub async fn set_dc_bias(&mut self, volts: f64) -> AppResult<()> {
        self.command(Command::DcBias(volts)).await
    }

    pub async fn set_start_voltage(&mut self, volts: f64) -> AppResult<()> {
        self.command(Command::StartVoltage(volts)).await
    }

    pub async fn set_stop_voltage(&mut self, volts: f64) -> AppResult<()> {
        self.command(Command::StopVoltage(volts)).await
    }

    pub async fn set_step_voltage(&mut self, volts: f64) -> AppResult<()> {
        self.command(Command::StepVoltage(volts)).await
    }

    pub async fn set_hold_time(&mut self, seconds: f64) -> AppResult<()> {
        self.command(Command::HoldTime(seconds)).await
    }

    pub async fn set_step_time(&mut self, seconds: f64) -> AppResult<()> {
        self.command(Command::StepTime(seconds)).await
    }

    pub async fn set_reading_count(&mut self, readings: u32) -> AppResult<()> {
        self.command(Command::ReadingCount(readings)).await
    }

    pub async fn set_measure_voltage(&mut self, volts: f64) -> AppResult<()> {
        self.command(Command::MeasureVoltage(volts)).await
    }

    pub async fn set_pulse_voltage(&mut self, volts: f64) -> AppResult<()> {
        self.command(Command::PulseVoltage(volts)).await
    }

    /// Pulse width ("th").
    pub async fn set_pulse_width(&mut self, seconds: f64) -> AppResult<()> {
        self.command(Command::PulseWidth(seconds)).await
    }

    /// Interval between C-t readings ("td").
    pub async fn set_measure_interval(&mut self, seconds: f64) -> AppResult<()> {
        self.command(Command::MeasureInterval(seconds)).await
    }

    pub async fn set_function(&mut self, function: MeasureFunction) -> AppResult<()> {
        self.command(Command::Function(function)).await
    }

    pub async fn set_bias_mode(&mut self, mode: BiasMode) -> AppResult<()> {
        self.command(Command::Bias(mode)).await
    }

    pub async fn set_ground_mode(&mut self, mode: GroundMode) -> AppResult<()> {
        self.command(Command::Ground(mode)).await
    }

    pub async fn set_speed(&mut self, speed: MeasurementSpeed) -> AppResult<()> {
        self.command(Command::Speed(speed)).await
    }

    pub async fn set_signal_level(&mut self, level: SignalLevel) -> AppResult<()> {
        self.command(Command::Signal(level)).await
    }

    pub async fn set_cable_length(&mut self, length: CableLength) -> AppResult<()> {
        self.command(Command::Cable(length)).await
    }

    pub async fn set_trigger(&mut self, mode: TriggerMode) -> AppResult<()> {
        self.command(Command::Trigger(mode)).await
    }

    pub async fn set_range(&mut self, range: MeasRange) -> AppResult<()> {
        self.command(Command::Range(range)).await
    }

    /// Double staircase sweep (`IB3`).
    pub async fn set_double(&mut self) -> AppResult<()> {
        self.set_bias_mode(BiasMode::Double).await
    }

    /// Preset for a single C-G staircase sweep.
    pub async fn default_single(&mut self) -> AppResult<()> {
        self.send_all(&SINGLE_PRESET).await?;
        let preset = SweepParameters::instrument_default();
        self.set_dc_bias(preset.dc_bias_v).await?;
        self.set_start_voltage(preset.start_v).await?;
        self.set_stop_voltage(preset.stop_v).await?;
        self.set_hold_time(preset.hold_time_s).await?;
        self.set_step_voltage(preset.step_v).await?;
        self.set_step_time(preset.step_time_s).await
    }

    /// Preset for a C-t measurement.
    pub async fn default_ct(&mut self) -> AppResult<()> {
        self.send_all(&CT_PRESET).await?;
        let preset = CtParameters::instrument_default();
        self.set_pulse_voltage(preset.pulse_v).await?;
        self.set_measure_voltage(preset.measure_v).await?;
        self.set_reading_count(preset.readings).await?;
        self.set_pulse_width(preset.pulse_width_s).await?;
        self.set_measure_interval(preset.measure_interval_s).await?;
        self.set_signal_level(SignalLevel::Millivolts30).await
    }

    /// Write all six sweep values (`PV`, `PS`, `PP`, `PE`, `PL`, `PD`).
    pub async fn apply_sweep_parameters(&mut self, sweep: SweepParameters) -> AppResult<()> {
        self.set_dc_bias(sweep.dc_bias_v).await?;
        self.set_start_voltage(sweep.start_v).await?;
        self.set_stop_voltage(sweep.stop_v).await?;
        self.set_step_voltage(sweep.step_v).await?;
        self.set_hold_time(sweep.hold_time_s).await?;
        self.set_step_time(sweep.step_time_s).await
    }

    /// Write all five C-t values (`PU`, `PM`, `PN`, `PH`, `PT`).
    pub async fn apply_ct_parameters(&mut self, ct: CtParameters) -> AppResult<()> {
        self.set_pulse_voltage(ct.pulse_v).await?;
        self.set_measure_voltage(ct.measure_v).await?;
        self.set_reading_count(ct.readings).await?;
        self.set_pulse_width(ct.pulse_width_s).await?;
        self.set_measure_interval(ct.measure_interval_s).await
    }

    /// Push every tracked sweep value to the meter and select the single staircase.
    pub async fn single_config(&mut self) -> AppResult<()> {
        self.apply_sweep_parameters(self.sweep).await?;
        self.set_bias_mode(BiasMode::Single).await
    }

    /// Push every tracked C-t value to the meter.
    pub async fn ct_config(&mut self) -> AppResult<()> {
        self.apply_ct_parameters(self.ct).await
    }

    pub async fn init_sweep(&mut self) -> AppResult<()> {
        self.send_all(&[Command::Trigger(TriggerMode::Hold), Command::SweepStart])
            .await?;
        info!("Sweep Initialized");
        Ok(())
    }

    pub async fn stop_sweep(&mut self) -> AppResult<()> {
        self.send_all(&[Command::Bias(BiasMode::Single), Command::SweepStop])
            .await?;
        info!("Sweep Stopped");
        Ok(())
    }

    /// Run `sequence` under `timeout` and read the block it produces.
    ///
    /// `SW0` is sent and the default timeout restored whatever the outcome; when the
    /// read already failed, failures of that cleanup are only logged.
    async fn acquire_block(
        &mut self,
        sequence: &[Command],
        timeout: Duration,
    ) -> AppResult<BlockResponse> {
        self.conn.set_timeout(timeout).await?;
        let outcome = match self.send_all(sequence).await {
            Ok(()) => self.read_block_response().await,
            Err(err) => Err(err),
        };
        let stopped = self.command(Command::SweepStop).await;
        let restored = self.conn.set_timeout(self.timing.default_timeout).await;

        match outcome {
            Ok(block) => {
                stopped?;
                restored?;
                Ok(block)
            }
            Err(err) => {
                if let Err(cleanup) = stopped {
                    warn!(error = %cleanup, "Could not stop the sweep after a failed read");
                }
                if let Err(cleanup) = restored {
                    warn!(error = %cleanup, "Could not restore the default timeout");
                }
                Err(err)
            }
        }
    }

    /// Run one C-V sweep in block mode and store it; returns the CSV path.
    #[tracing::instrument(skip(self), fields(resource = %self.conn.resource()))]
    pub async fn sweep_measure(&mut self) -> AppResult<PathBuf> {
        self.ensure_connected()?;
        info!(
            steps = self.step_count(),
            expected_secs = self.sweep_time_secs(),
            "Starting sweep"
        );
        let block = self
            .acquire_block(&SWEEP_SEQUENCE, self.timing.sweep_timeout)
            .await?;
        info!("Sweep Stopped");
        self.storage.write_block(&block)
    }

    /// Pulse through the bias range: one single-point double sweep at `step`, `2·step`, ...
    /// up to and including `stop`. All pulses go into one CSV file whose path is returned.
    ///
    /// The tracked start and stop voltages are written back to the meter afterwards.
    /// When a pulse fails, or the stop voltage lies below the first pulse, the file is
    /// removed again and the error (`NoData` for the latter) is returned.
    #[tracing::instrument(skip(self), fields(resource = %self.conn.resource()))]
    pub async fn pulse_sweep(&mut self) -> AppResult<PathBuf> {
        self.ensure_connected()?;
        let SweepParameters {
            start_v,
            stop_v,
            step_v,
            ..
        } = self.sweep;
        if !step_v.is_finite() || step_v <= 0.0 {
            return Err(LabError::InvalidInput(
                "pulse sweep needs a positive step voltage".to_string(),
            ));
        }

        self.set_double().await?;
        let path = self.storage.create_pulse_file(self.function)?;

        let pulses = self.run_pulses(&path, step_v, stop_v).await;
        let restored = self.restore_range(start_v, stop_v).await;
        let outcome = match (pulses, restored) {
            (Ok(0), Ok(())) => {
                warn!(stop_v, step_v, "Stop voltage below the first pulse, no data taken");
                Err(LabError::NoData)
            }
            (Ok(pulses), Ok(())) => Ok(pulses),
            (Err(err), restored) => {
                if let Err(cleanup) = restored {
                    warn!(error = %cleanup, "Could not restore the sweep range");
                }
                Err(err)
            }
            (Ok(_), Err(err)) => Err(err),
        };

        match outcome {
            Ok(pulses) => {
                info!(pulses, path = %path.display(), "Pulse sweep complete");
                Ok(path)
            }
            Err(err) => {
                // nothing records a partial file, so it must not outlive the sweep
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Could not remove pulse file");
                }
                Err(err)
            }
        }
    }

    async fn run_pulses(&mut self, path: &Path, step_v: f64, stop_v: f64) -> AppResult<usize> {
        let mut pulse = 1usize;
        loop {
            // Multiplying keeps the last pulse exact where repeated addition drifts.
            let end = step_v * pulse as f64;
            if end >= stop_v + step_v {
                break;
            }
            self.set_stop_voltage(end).await?;
            self.set_start_voltage(end).await?;
            let block = self
                .acquire_block(&PULSE_SEQUENCE, self.timing.pulse_timeout)
                .await?;
            self.storage.append_pulse(path, pulse, &block)?;
            info!(pulse, bias_v = end, "Pulse complete");
            pulse += 1;
        }
        Ok(pulse - 1)
    }

    async fn restore_range(&mut self, start_v: f64, stop_v: f64) -> AppResult<()> {
        if !self.conn.is_connected() {
            return Ok(());
        }
        self.set_stop_voltage(stop_v).await?;
        self.set_start_voltage(start_v).await
    }

    /// Read in standard (non-block) transfer mode and store the result.
    pub async fn data_standard_transfer_mode(&mut self) -> AppResult<PathBuf> {
        self.send_all(&[Command::StandardTransfer, Command::Read])
            .await?;
        let block = self.read_block_response().await?;
        self.storage.write_block(&block)
    }

    /// Trigger one reading and return the raw answer.
    pub async fn read_data(&mut self) -> AppResult<String> {
        self.send_all(&[Command::AutoSample, Command::Measure])
            .await?;
        self.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::simulated_adapter::SimulatorHandle;
    use crate::adapters::SimulatedAdapter;

    async fn simulated(dir: &Path) -> (Hp4280a, SimulatorHandle) {
        let adapter = SimulatedAdapter::new("GPIB0::17::INSTR");
        let handle = adapter.handle();
        let mut controller = Hp4280a::new(
            Box::new(adapter),
            SweepParameters::default(),
            CsvStore::new(dir),
        )
        .with_timing(ControllerTiming::without_write_delay());
        controller.connect().await.unwrap();
        (controller, handle)
    }

    #[tokio::test]
    async fn commands_need_a_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = Hp4280a::new(
            Box::new(SimulatedAdapter::new("GPIB0::17::INSTR")),
            SweepParameters::default(),
            CsvStore::new(dir.path()),
        );
        assert!(matches!(
            controller.set_dc_bias(1.0).await,
            Err(LabError::NotConnected)
        ));
        // state is left alone when nothing was sent
        assert_eq!(controller.sweep_parameters().dc_bias_v, 5.0);
    }

    #[tokio::test]
    async fn setters_track_state() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, handle) = simulated(dir.path()).await;
        controller.set_start_voltage(-2.0).await.unwrap();
        controller.set_reading_count(25).await.unwrap();
        controller.set_function(MeasureFunction::Gt).await.unwrap();

        assert_eq!(controller.sweep_parameters().start_v, -2.0);
        assert_eq!(controller.ct_parameters().readings, 25);
        assert_eq!(controller.function(), MeasureFunction::Gt);
        assert_eq!(handle.commands(), vec!["PS -2.0", "PN 25", "FN6"]);
    }

    #[tokio::test]
    async fn single_preset_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, handle) = simulated(dir.path()).await;
        controller.default_single().await.unwrap();
        assert_eq!(
            handle.commands(),
            vec![
                "IB2", "MS2", "FL", "FN1", "CEI", "TR1", "LE1", "SL2", "RA1", "PV 5.0", "PS 0.0",
                "PP 5.0", "PL 0.01", "PE 0.01", "PD 0.03",
            ]
        );
        assert_eq!(
            controller.sweep_parameters(),
            SweepParameters::instrument_default()
        );
    }

    #[tokio::test]
    async fn ct_preset_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, handle) = simulated(dir.path()).await;
        controller.default_ct().await.unwrap();
        assert_eq!(
            handle.commands(),
            vec![
                "FN5", "IB5", "FL", "LE1", "MS1", "RA1", "TR1", "PU 0.0", "PM 0.0", "PN 10",
                "PH 1.0", "PT 0.01", "SL2",
            ]
        );
        assert_eq!(controller.bias_mode(), BiasMode::Pulse);
    }

    #[tokio::test]
    async fn sweep_restores_timeout_after_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, handle) = simulated(dir.path()).await;
        handle.trigger_failure();

        let err = controller.sweep_measure().await.unwrap_err();
        assert!(matches!(err, LabError::Visa { .. }));
        // V01 failed; the stop command still went out
        assert_eq!(handle.commands(), vec!["SW0"]);
        assert_eq!(
            controller.connection().timeout(),
            ControllerTiming::default().default_timeout
        );
    }

    #[tokio::test]
    async fn zero_step_pulse_sweep_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, handle) = simulated(dir.path()).await;
        controller.set_sweep_parameters(SweepParameters {
            step_v: 0.0,
            ..Default::default()
        });
        assert!(matches!(
            controller.pulse_sweep().await,
            Err(LabError::InvalidInput(_))
        ));
        assert!(handle.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn write_delay_follows_numeric_commands_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = Hp4280a::new(
            Box::new(SimulatedAdapter::new("GPIB0::17::INSTR")),
            SweepParameters::default(),
            CsvStore::new(dir.path()),
        );
        controller.connect().await.unwrap();
        let delay = controller.timing().write_delay;
        assert_eq!(delay, Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        controller.set_dc_bias(1.0).await.unwrap();
        assert_eq!(start.elapsed(), delay);

        let start = tokio::time::Instant::now();
        controller.set_function(MeasureFunction::C).await.unwrap();
        controller.set_double().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn sweep_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, handle) = simulated(dir.path()).await;
        controller.init_sweep().await.unwrap();
        controller.stop_sweep().await.unwrap();
        assert_eq!(handle.commands(), vec!["TR3", "SW1", "IB2", "SW0"]);
        assert_eq!(controller.bias_mode(), BiasMode::Single);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn negative_stop_takes_no_pulses() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, handle) = simulated(dir.path()).await;
        controller.set_sweep_parameters(SweepParameters {
            stop_v: -1.0,
            ..Default::default()
        });

        let err = controller.pulse_sweep().await.unwrap_err();
        assert!(matches!(err, LabError::NoData));
        assert_eq!(handle.commands(), vec!["IB3", "PP -1.0", "PS 0.0"]);
        assert!(logs_contain("no data taken"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
