//! Meter connection, configuration and measurement routes.

use super::extract::AuthUser;
use super::{success, AppState};
use crate::database::TestType;
use crate::error::{AppResult, LabError};
use crate::instrument::hp4280a::{
    CableLength, CtParameters, GroundMode, MeasRange, MeasureFunction, MeasurementSpeed,
    SignalLevel, SweepParameters, TriggerMode,
};
use crate::session::{ConnectionStatus, SessionSettings};
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(status)
        .service(reset_connection)
        .service(configuration)
        .service(get_parameters)
        .service(post_parameters)
        .service(start_measurement);
}

#[get("/status")]
async fn status(data: web::Data<AppState>, user: AuthUser) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(data.sessions.status(user.email()).await))
}

#[post("/connection/reset")]
async fn reset_connection(data: web::Data<AppState>, user: AuthUser) -> AppResult<HttpResponse> {
    data.sessions
        .reset(user.email())
        .await
        .map_err(|e| LabError::Instrument(format!("Error during reset: {e}")))?;
    Ok(success("Connection reset and re-established successfully!"))
}

/// What to sweep when a measurement is started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepType {
    /// C-V staircase
    #[default]
    Voltage,
    /// C-t, read out like a C-V block
    Time,
    /// Stepped single-point pulses
    Pulse,
}

impl SweepType {
    fn test_type(self) -> TestType {
        match self {
            Self::Voltage => TestType::CapacitanceVoltage,
            Self::Time => TestType::CapacitanceTime,
            Self::Pulse => TestType::Pulse,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeasurementResult {
    pub status: &'static str,
    pub message: String,
    pub measurement_id: i32,
    pub test_type: &'static str,
    pub csv_file: String,
}

/// Run a sweep on the user's meter and record it.
async fn run_measurement(
    data: &AppState,
    user: &AuthUser,
    sweep_type: SweepType,
) -> AppResult<MeasurementResult> {
    let controller = data.sessions.get_or_connect(user.email()).await?;
    let path = {
        let mut controller = controller.lock().await;
        match sweep_type {
            SweepType::Voltage | SweepType::Time => controller.sweep_measure().await?,
            SweepType::Pulse => controller.pulse_sweep().await?,
        }
    };

    let test_type = sweep_type.test_type();
    let measurement_id = data
        .store
        .add_measurement(user.user.id, test_type, Some(&path))
        .await?;
    info!(measurement_id, email = %user.email(), %test_type, "Measurement stored");

    let message = match sweep_type {
        SweepType::Pulse => "Pulse Sweep Measurement completed! Data saved to CSV and database.",
        _ => "Measurement completed successfully! Data saved to CSV and database.",
    };
    Ok(MeasurementResult {
        status: "success",
        message: message.to_string(),
        measurement_id,
        test_type: test_type.as_str(),
        csv_file: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct MeasurementRequest {
    #[serde(default)]
    pub sweep_type: SweepType,
}

#[post("/measurements")]
async fn start_measurement(
    data: web::Data<AppState>,
    user: AuthUser,
    body: Option<web::Json<MeasurementRequest>>,
) -> AppResult<HttpResponse> {
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let result = run_measurement(&data, &user, request.sweep_type).await?;
    Ok(HttpResponse::Created().json(result))
}

/// Bias choices offered on the configuration page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasChoice {
    /// Fixed DC bias, nothing to send
    Dc,
    Single,
    Double,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConfigurationAction {
    StartMeasurement,
    SetMode { mode: MeasureFunction },
    SetConnectionMode { connection_mode: GroundMode },
    SetCableLength { cable_length: CableLength },
    SetFunction { function: MeasureFunction },
    SetMeasSpeed { meas_speed: MeasurementSpeed },
    SetMeasRange { meas_range: MeasRange },
    SetSweep { sweep_mode: TriggerMode },
    SetBiasMode { bias_mode: BiasChoice },
    SetSigLevel { sig_level: SignalLevel },
}

fn function_label(function: MeasureFunction) -> &'static str {
    match function {
        MeasureFunction::Cg => "C-G",
        MeasureFunction::C => "C",
        MeasureFunction::G => "G",
        MeasureFunction::Cgt => "C-G-T",
        MeasureFunction::Ct => "C-T",
        MeasureFunction::Gt => "G-T",
    }
}

#[post("/configuration")]
async fn configuration(
    data: web::Data<AppState>,
    user: AuthUser,
    action: web::Json<ConfigurationAction>,
) -> AppResult<HttpResponse> {
    let controller = data.sessions.get_or_connect(user.email()).await?;
    let mut ctrl = controller.lock().await;
    let message = match action.into_inner() {
        ConfigurationAction::StartMeasurement => {
            drop(ctrl);
            let result = run_measurement(&data, &user, SweepType::Voltage).await?;
            return Ok(HttpResponse::Created().json(result));
        }
        ConfigurationAction::SetMode { mode } => {
            if !matches!(mode, MeasureFunction::Ct | MeasureFunction::Cgt) {
                return Err(LabError::InvalidInput("Invalid mode selected.".to_string()));
            }
            ctrl.set_function(mode).await?;
            drop(ctrl);
            data.sessions
                .update_settings(user.email(), |s| s.mode = mode)
                .await?;
            format!("Machine set to {} mode successfully!", function_label(mode))
        }
        ConfigurationAction::SetConnectionMode { connection_mode } => {
            ctrl.set_ground_mode(connection_mode).await?;
            match connection_mode {
                GroundMode::Float => "Connection set to Float mode successfully!",
                GroundMode::Ground => "Connection set to Ground mode successfully!",
            }
            .to_string()
        }
        ConfigurationAction::SetCableLength { cable_length } => {
            ctrl.set_cable_length(cable_length).await?;
            format!(
                "Cable length set to {} m successfully!",
                cable_length.code()
            )
        }
        ConfigurationAction::SetFunction { function } => {
            ctrl.set_function(function).await?;
            format!("Function set to {} successfully!", function_label(function))
        }
        ConfigurationAction::SetMeasSpeed { meas_speed } => {
            ctrl.set_speed(meas_speed).await?;
            let label = match meas_speed {
                MeasurementSpeed::Fast => "Fast",
                MeasurementSpeed::Medium => "Medium",
                MeasurementSpeed::Slow => "Slow",
            };
            format!("Measurement speed set to {label} successfully!")
        }
        ConfigurationAction::SetMeasRange { meas_range } => {
            ctrl.set_range(meas_range).await?;
            let label = match meas_range {
                MeasRange::Auto => "Auto",
                MeasRange::Manual => "Manual",
                MeasRange::Nanofarads10 => "10nF/10mS",
                MeasRange::Picofarads100 => "100pF/1mS",
                MeasRange::Picofarads10 => "10pF/100uS",
            };
            format!("Measurement range set to {label} successfully!")
        }
        ConfigurationAction::SetSweep { sweep_mode } => {
            ctrl.set_trigger(sweep_mode).await?;
            let label = match sweep_mode {
                TriggerMode::Internal => "Repeat",
                TriggerMode::External => "External",
                TriggerMode::Hold => "Single",
            };
            format!("Sweep mode set to {label} successfully!")
        }
        ConfigurationAction::SetBiasMode { bias_mode } => {
            match bias_mode {
                BiasChoice::Dc => {}
                BiasChoice::Single => ctrl.single_config().await?,
                BiasChoice::Double => ctrl.set_double().await?,
            }
            let label = match bias_mode {
                BiasChoice::Dc => "DC",
                BiasChoice::Single => "Single",
                BiasChoice::Double => "Double",
            };
            format!("Bias mode set to {label} successfully!")
        }
        ConfigurationAction::SetSigLevel { sig_level } => {
            ctrl.set_signal_level(sig_level).await?;
            let label = match sig_level {
                SignalLevel::Millivolts10 => "10 mV",
                SignalLevel::Millivolts30 => "30 mV",
            };
            format!("Signal level set to {label} successfully!")
        }
    };
    Ok(success(message))
}

#[derive(Debug, Serialize)]
pub struct ParametersView {
    pub settings: SessionSettings,
    pub step_count: f64,
    pub sweep_time_secs: f64,
    pub connection: ConnectionStatus,
}

async fn parameters_view(data: &AppState, email: &str) -> AppResult<ParametersView> {
    let settings = data
        .sessions
        .settings(email)
        .await
        .ok_or_else(|| LabError::Auth("User not logged in.".to_string()))?;
    Ok(ParametersView {
        settings,
        step_count: settings.sweep.step_count(),
        sweep_time_secs: settings.sweep.sweep_time_secs(),
        connection: data.sessions.status(email).await,
    })
}

#[get("/parameters")]
async fn get_parameters(data: web::Data<AppState>, user: AuthUser) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(parameters_view(&data, user.email()).await?))
}

/// New values for one of the two parameter forms.
#[derive(Debug, Deserialize)]
#[serde(tag = "sweep_type", rename_all = "lowercase")]
pub enum SettingsUpdate {
    Voltage(SweepParameters),
    Time(CtParameters),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ParameterAction {
    UpdateSettings(SettingsUpdate),
    StartPulseSweep,
    StartMeasurement {
        #[serde(default)]
        sweep_type: SweepType,
    },
}

#[post("/parameters")]
async fn post_parameters(
    data: web::Data<AppState>,
    user: AuthUser,
    action: web::Json<ParameterAction>,
) -> AppResult<HttpResponse> {
    match action.into_inner() {
        ParameterAction::UpdateSettings(update) => {
            let controller = data.sessions.get_or_connect(user.email()).await?;
            let message = match update {
                SettingsUpdate::Voltage(sweep) => {
                    sweep.validate()?;
                    data.sessions
                        .update_settings(user.email(), |s| s.sweep = sweep)
                        .await?;
                    controller.lock().await.apply_sweep_parameters(sweep).await?;
                    "Voltage settings updated successfully!"
                }
                SettingsUpdate::Time(ct) => {
                    ct.validate()?;
                    data.sessions
                        .update_settings(user.email(), |s| s.ct = ct)
                        .await?;
                    controller.lock().await.apply_ct_parameters(ct).await?;
                    "Time settings updated successfully!"
                }
            };
            Ok(success(message))
        }
        ParameterAction::StartPulseSweep => {
            let result = run_measurement(&data, &user, SweepType::Pulse).await?;
            Ok(HttpResponse::Created().json(result))
        }
        ParameterAction::StartMeasurement { sweep_type } => {
            let result = run_measurement(&data, &user, sweep_type).await?;
            Ok(HttpResponse::Created().json(result))
        }
    }
}
