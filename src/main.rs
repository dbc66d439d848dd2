use classicpad::config::{BridgeConfig, ConfigFile};
use classicpad::controller::{ControllerBridge, I2cBus, RegisterLink, ReportMode, ThreadDelay};
use classicpad::output::{InputSink, LogSink};
use clap::{Parser, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "classicpad", version)]
#[command(about = "Expose a Nintendo Classic Controller on an I2C bus as a Linux gamepad")]
struct Cli {
    /// I2C bus index (/dev/i2c-N)
    #[arg(short = 'y', long)]
    bus: Option<u8>,

    /// Poll frequency in Hz (clamped to 1-1000)
    #[arg(short = 'f', long)]
    frequency: Option<u32>,

    /// Analog reporting
    #[arg(short = 'a', long, value_enum)]
    analog: Option<Analog>,

    /// Peripheral address, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_address)]
    address: Option<u16>,

    /// Log raw reports and per-tick diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (defaults to <config dir>/classicpad/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log events instead of creating a virtual device
    #[arg(long)]
    dry_run: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Analog {
    Off,
    #[value(name = "4")]
    Four,
    #[value(name = "6")]
    Six,
}

impl From<Analog> for ReportMode {
    fn from(analog: Analog) -> Self {
        match analog {
            Analog::Off => ReportMode::Digital,
            Analog::Four => ReportMode::Analog4,
            Analog::Six => ReportMode::Analog6,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup()?;

    let source = ConfigFile::locate(cli.config.as_deref());
    let mut file = ConfigFile::load(source.as_deref())?;
    apply_overrides(&cli, &mut file);
    setup_logging_env(if file.verbose { Level::DEBUG } else { Level::INFO });
    match &source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => debug!("No configuration file found, using defaults"),
    }
    let config = file.resolve()?;

    info!(
        "Starting classicpad on /dev/i2c-{} (address {:#04x}), {:?} mode at {} Hz",
        config.bus, config.address, config.mode, config.frequency_hz
    );
    let config = Arc::new(config);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                signal_token.cancel();
            }
            Err(e) => error!("Unable to listen for interrupt: {}", e),
        }
    });

    let dry_run = cli.dry_run;
    let poll_token = shutdown.clone();
    let poller = tokio::task::spawn_blocking(move || -> Result<()> {
        let bus = I2cBus::open(config.bus, config.address)?;
        let sink = open_sink(&config, dry_run)?;
        let link = RegisterLink::new(bus, ThreadDelay);
        let mut bridge = ControllerBridge::new(config, link, sink);
        bridge.run(&poll_token);
        Ok(())
    });

    poller
        .await
        .map_err(|e| eyre!("Poll loop terminated abnormally: {}", e))??;
    info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(cli: &Cli, file: &mut ConfigFile) {
    if let Some(bus) = cli.bus {
        file.bus = bus;
    }
    if let Some(frequency) = cli.frequency {
        file.frequency_hz = frequency;
    }
    if let Some(analog) = cli.analog {
        file.mode = analog.into();
    }
    if let Some(address) = cli.address {
        file.address = address;
    }
    if cli.verbose {
        file.verbose = true;
    }
}

fn parse_address(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", value, e))
}

fn open_sink(config: &BridgeConfig, dry_run: bool) -> Result<Box<dyn InputSink>> {
    if dry_run {
        info!("Dry run, events are logged only");
        return Ok(Box::new(LogSink::new()));
    }
    device_sink(config)
}

#[cfg(feature = "uinput")]
fn device_sink(config: &BridgeConfig) -> Result<Box<dyn InputSink>> {
    let sink = classicpad::output::UinputSink::create(config)?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "uinput"))]
fn device_sink(_config: &BridgeConfig) -> Result<Box<dyn InputSink>> {
    tracing::warn!("Built without the `uinput` feature, events are logged only");
    Ok(Box::new(LogSink::new()))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_the_file() {
        let cli = Cli::parse_from(["classicpad", "-y", "3", "-a", "6", "--address", "0x53"]);
        let mut file = ConfigFile {
            verbose: true,
            frequency_hz: 200,
            ..Default::default()
        };

        apply_overrides(&cli, &mut file);

        assert_eq!(file.bus, 3);
        assert_eq!(file.mode, ReportMode::Analog6);
        assert_eq!(file.address, 0x53);
        assert_eq!(file.frequency_hz, 200);
        // -v only ever turns verbosity on
        assert!(file.verbose);
    }

    #[test]
    fn address_accepts_hex_and_decimal() {
        assert_eq!(parse_address("0x52"), Ok(0x52));
        assert_eq!(parse_address("82"), Ok(82));
        assert!(parse_address("0xZZ").is_err());
    }
}
