use anyhow::Context;
use clap::Parser;
use log::{debug, error, info, warn};
use motordash::config::{Config, DisplayFormat};
use motordash::dashboard::{ConsoleRenderer, JsonRenderer, Renderer};
use motordash::error::ConfigError;
use motordash::session::{Command, Session};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};

/// Command-line arguments for the motor sensor dashboard
#[derive(Parser)]
#[command(
    name = "motordash",
    about = "Motor sensor dashboard - live sensor charts with threshold alerts",
    long_about = "Subscribes to a live feed of motor sensor readings, keeps a rolling history \
                  per sensor, highlights values above their alert thresholds and stops \
                  automatically when the feed reports a fault. Type 'start', 'stop', or press \
                  Enter to toggle; 'quit' exits."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Start ingesting immediately
    #[arg(short, long, help = "Subscribe to the feed on launch")]
    start: bool,

    /// Emit JSON snapshots instead of text frames
    #[arg(long, help = "Render one JSON snapshot per line on stdout")]
    json: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in load_config
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Convert config path to string safely, handling non-UTF-8 paths
    ///
    /// # Returns
    ///
    /// `Ok(Some(path_str))` if config is provided and valid UTF-8,
    /// `Ok(None)` if no config provided,
    /// `Err(String)` if config path contains invalid UTF-8
    fn config_path_str(&self) -> Result<Option<&str>, String> {
        match &self.config {
            Some(path) => match path.to_str() {
                Some(path_str) => Ok(Some(path_str)),
                None => Err(format!(
                    "Configuration file path contains invalid UTF-8 characters: {}",
                    path.display()
                )),
            },
            None => Ok(None),
        }
    }

    /// Apply command-line overrides on top of the loaded configuration
    fn apply_overrides(&self, config: &mut Config) {
        if self.start {
            config.autostart = true;
        }
        if self.json {
            config.display.format = DisplayFormat::Json;
        }
    }
}

/// Load configuration from file or use defaults
///
/// A missing or invalid file is reported and replaced by the defaults.
fn load_config(config_path: Option<&str>) -> Config {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            match Config::from_file(std::path::Path::new(path)) {
                Ok(config) => config,
                Err(ConfigError::ReadError(_)) => {
                    warn!(
                        "Configuration file '{}' not found or unreadable, using defaults",
                        path
                    );
                    Config::default()
                }
                Err(e) => {
                    error!("Configuration error in '{}': {}", path, e);
                    warn!("Using default configuration due to invalid config file");
                    Config::default()
                }
            }
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    }
}

fn build_renderer(config: &Config) -> Box<dyn Renderer> {
    match config.display.format {
        DisplayFormat::Console => Box::new(ConsoleRenderer::new(
            std::io::stdout(),
            config.display.color,
        )),
        DisplayFormat::Json => Box::new(JsonRenderer::new(std::io::stdout())),
    }
}

/// Forward commands typed on stdin until it closes
fn spawn_stdin_reader(commands: Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to read from stdin: {}", e);
                    break;
                }
            };

            match Command::parse(&line) {
                Some(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command '{}'; use start, stop, toggle or quit", line.trim()),
            }
        }
        debug!("Stdin reader finished");
    });
}

fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate().map_err(anyhow::Error::msg)?;
    let config_path = cli
        .config_path_str()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration path")?;

    let mut config = load_config(config_path);
    cli.apply_overrides(&mut config);

    let mut session = Session::from_config(&config, build_renderer(&config));
    let (commands, command_receiver) = mpsc::channel();

    let interrupt = commands.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = interrupt.send(Command::Quit) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    if config.autostart {
        // Queued ahead of any user input
        commands
            .send(Command::Start)
            .context("Failed to queue autostart")?;
    }
    spawn_stdin_reader(commands);

    info!("Dashboard is ready. Press Ctrl+C to exit.");
    session.run(command_receiver);

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting motor sensor dashboard");

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Dashboard shutdown complete");
}
