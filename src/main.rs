//! CLI Entry Point for the HP 4280A lab controller
//!
//! Provides command-line access to:
//! - The JSON web API (`serve`)
//! - One-shot sweeps against the meter (`sweep`, `pulse`, `ct`, `identify`)
//! - Database maintenance (`init-db`, `add-user`, `migrate-passwords`, `export`)
//!
//! # Usage
//!
//! ```bash
//! hp4280a_lab serve
//! hp4280a_lab sweep --start -5 --stop 5 --step 0.1 --simulated
//! hp4280a_lab add-user Ada Lovelace ada@lab.org secret --admin
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hp4280a_lab::config::{LabConfig, DEFAULT_CONFIG_PATH};
use hp4280a_lab::data::CsvStore;
use hp4280a_lab::database::{NewUser, Store};
use hp4280a_lab::instrument::hp4280a::{CtParameters, Hp4280a, SweepParameters};
use hp4280a_lab::session::default_connection_factory;
use hp4280a_lab::{server, tracing_setup};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "hp4280a_lab")]
#[command(about = "HP 4280A C-V/C-t meter controller and measurement log", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the web API
    Serve,

    /// Run one C-V sweep and write it to CSV
    Sweep {
        #[command(flatten)]
        sweep: SweepArgs,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Step single-point pulses up to the stop voltage
    Pulse {
        #[command(flatten)]
        sweep: SweepArgs,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Preset C-t mode, apply the C-t values and read one block
    Ct {
        #[command(flatten)]
        ct: CtArgs,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print the instrument identification
    Identify {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Create the tables and seed the admin and demo accounts
    InitDb,

    /// Register a user
    AddUser {
        first_name: String,
        last_name: String,
        email: String,
        password: String,
        /// Grant admin rights
        #[arg(long)]
        admin: bool,
    },

    /// Hash passwords still stored as plain text
    MigratePasswords,

    /// Export the measurement log as CSV
    Export {
        /// Output file
        #[arg(default_value = "measurements_export.csv")]
        output: PathBuf,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Args)]
struct TargetArgs {
    /// Use the simulated meter instead of VISA
    #[arg(long)]
    simulated: bool,
}

#[derive(Args)]
struct SweepArgs {
    /// DC bias in volts (PV)
    #[arg(long, default_value_t = 5.0, allow_negative_numbers = true)]
    dc_bias: f64,
    /// Start voltage (PS)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    start: f64,
    /// Stop voltage (PP)
    #[arg(long, default_value_t = 5.0, allow_negative_numbers = true)]
    stop: f64,
    /// Step voltage (PE)
    #[arg(long, default_value_t = 0.5, allow_negative_numbers = true)]
    step: f64,
    /// Hold time in seconds (PL)
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    hold: f64,
    /// Step time in seconds (PD)
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    step_time: f64,
}

impl From<&SweepArgs> for SweepParameters {
    fn from(args: &SweepArgs) -> Self {
        Self {
            dc_bias_v: args.dc_bias,
            start_v: args.start,
            stop_v: args.stop,
            step_v: args.step,
            hold_time_s: args.hold,
            step_time_s: args.step_time,
        }
    }
}

#[derive(Args)]
struct CtArgs {
    /// Pulse voltage (PU)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pulse: f64,
    /// Measure voltage (PM)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    measure: f64,
    /// Number of readings (PN)
    #[arg(long, default_value_t = 10)]
    readings: u32,
    /// Pulse width in seconds (PH)
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    width: f64,
    /// Interval between readings in seconds (PT)
    #[arg(long, default_value_t = 0.15, allow_negative_numbers = true)]
    interval: f64,
}

impl From<&CtArgs> for CtParameters {
    fn from(args: &CtArgs) -> Self {
        Self {
            pulse_v: args.pulse,
            measure_v: args.measure,
            readings: args.readings,
            pulse_width_s: args.width,
            measure_interval_s: args.interval,
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = LabConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing_setup::init_from_config(&config)?;

    match cli.command {
        Commands::Serve => server::run(config).await?,
        Commands::Sweep { sweep, target } => {
            let sweep = SweepParameters::from(&sweep);
            sweep.validate()?;
            let mut ctrl = open_controller(&config, target.simulated, sweep).await?;
            ctrl.clear().await?;
            info!(
                steps = ctrl.step_count(),
                expected_secs = ctrl.sweep_time_secs(),
                "Sweep planned"
            );
            ctrl.single_config().await?;
            let path = ctrl.sweep_measure().await?;
            ctrl.disconnect().await?;
            println!("{}", path.display());
        }
        Commands::Pulse { sweep, target } => {
            let sweep = SweepParameters::from(&sweep);
            sweep.validate()?;
            let mut ctrl = open_controller(&config, target.simulated, sweep).await?;
            ctrl.clear().await?;
            ctrl.single_config().await?;
            let path = ctrl.pulse_sweep().await?;
            ctrl.disconnect().await?;
            println!("{}", path.display());
        }
        Commands::Ct { ct, target } => {
            let ct = CtParameters::from(&ct);
            ct.validate()?;
            let mut ctrl =
                open_controller(&config, target.simulated, SweepParameters::default()).await?;
            ctrl.clear().await?;
            ctrl.default_ct().await?;
            ctrl.apply_ct_parameters(ct).await?;
            let path = ctrl.sweep_measure().await?;
            ctrl.disconnect().await?;
            println!("{}", path.display());
        }
        Commands::Identify { target } => {
            let mut ctrl =
                open_controller(&config, target.simulated, SweepParameters::default()).await?;
            println!("{}", ctrl.device_id().await?);
            ctrl.disconnect().await?;
        }
        Commands::InitDb => {
            let store = open_store(&config).await?;
            println!("Database ready at {}", config.storage.database_url);
            drop(store);
        }
        Commands::AddUser {
            first_name,
            last_name,
            email,
            password,
            admin,
        } => {
            let store = open_store(&config).await?;
            let user = store
                .add_user(NewUser {
                    first_name,
                    last_name,
                    email,
                    password,
                    is_admin: Some(admin),
                })
                .await?;
            println!(
                "Added user {} <{}> (id {}, admin: {})",
                user.full_name(),
                user.email,
                user.id,
                user.is_admin
            );
        }
        Commands::MigratePasswords => {
            let store = open_store(&config).await?;
            let migrated = store.migrate_passwords().await?;
            println!("Password migration completed: {migrated} password(s) hashed");
        }
        Commands::Export { output } => {
            let store = open_store(&config).await?;
            store.export_measurements_to_csv(&output).await?;
            println!("Measurements exported to {}", output.display());
        }
        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

async fn open_store(config: &LabConfig) -> Result<Store> {
    let store = Store::connect(&config.storage.database_url)
        .await
        .with_context(|| format!("opening {}", config.storage.database_url))?;
    store.init_db().await?;
    Ok(store)
}

async fn open_controller(
    config: &LabConfig,
    simulated: bool,
    sweep: SweepParameters,
) -> Result<Hp4280a> {
    let factory = default_connection_factory();
    let conn = factory(&config.instrument, simulated || config.instrument.simulated);
    let storage = CsvStore::new(config.storage.uploads_dir.clone());
    let mut ctrl = Hp4280a::new(conn, sweep, storage).with_timing(config.instrument.timing());
    ctrl.connect()
        .await
        .with_context(|| format!("connecting to {}", config.instrument.resource))?;
    info!(connection = %ctrl.connection().info(), "Connected");
    Ok(ctrl)
}
