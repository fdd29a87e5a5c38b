use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::str::FromStr;
use tracing::{Level, info, warn};

use focus_enforcer::config::{Config, ConfigLoader};
use focus_enforcer::logging::{self, LoggingConfig};
use focus_enforcer::service::{RunnerExit, SessionController, SessionRunner};
use focus_enforcer::session::MAX_ALERT_STAGE;
use focus_enforcer::system::{
    PlatformAudioPlayback, PlatformWindowSystem, StandardFileSystem, StandardProcessLauncher,
};

const LOG_RETENTION_DAYS: u64 = 14;

#[derive(Parser)]
#[command(name = "focus-enforcer")]
#[command(
    about = "Pomodoro-style focus enforcer: alternates a game with a study app and sounds escalating alarms when the wrong window has focus"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full session in the foreground (default)
    Run,
    /// Validate configuration file and check application paths
    CheckConfig,
    /// Write the default configuration file if none exists
    InitConfig,
    /// Change configuration values and save them
    Configure {
        /// Game command line, e.g. "/usr/games/chess --fullscreen"
        #[arg(long)]
        game_path: Option<String>,
        /// Title of the game window
        #[arg(long)]
        game_title: Option<String>,
        /// Study app command line
        #[arg(long)]
        study_path: Option<String>,
        /// Title of the study app window
        #[arg(long)]
        study_title: Option<String>,
        /// Game phase length in minutes
        #[arg(long)]
        game_min: Option<u64>,
        /// Short study phase length in minutes
        #[arg(long)]
        short_study_min: Option<u64>,
        /// Final study phase length in minutes
        #[arg(long)]
        long_study_min: Option<u64>,
        /// Alert sound for a stage, as STAGE=PATH ("system_bell" for the tone)
        #[arg(long = "stage", value_parser = parse_stage_sound)]
        stages: Vec<(u8, String)>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::from_cli_path(cli.config.as_deref())?;
    let command = cli.command.unwrap_or(Commands::Run);

    if let Commands::InitConfig = command {
        // Logging is not needed to write a file
        return init_config(&loader);
    }

    let config = loader.load_config()?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::from_str(&config.general.log_level).unwrap_or(Level::INFO)
    };
    let is_run = matches!(command, Commands::Run);
    let (_guard, log_dir) = logging::initialize_logging(LoggingConfig {
        level,
        file_output: is_run,
        ..LoggingConfig::default()
    })?;
    if let Some(dir) = &log_dir {
        info!("Logging to {}", dir.display());
        if let Err(e) = logging::cleanup_old_logs(dir, LOG_RETENTION_DAYS) {
            warn!("Failed to clean up old logs: {}", e);
        }
    }

    match command {
        Commands::Run => run_session(config, loader).await,
        Commands::CheckConfig => check_config(&config, &loader),
        Commands::Configure {
            game_path,
            game_title,
            study_path,
            study_title,
            game_min,
            short_study_min,
            long_study_min,
            stages,
        } => {
            let mut config = config;
            let settings = &mut config.settings;
            apply(&mut settings.game_path, game_path);
            apply(&mut settings.game_title, game_title);
            apply(&mut settings.study_app_path, study_path);
            apply(&mut settings.study_app_title, study_title);

            let durations = &mut config.durations;
            apply(&mut durations.game_min, game_min.map(|m| m.to_string()));
            apply(
                &mut durations.short_study_min,
                short_study_min.map(|m| m.to_string()),
            );
            apply(
                &mut durations.long_study_min,
                long_study_min.map(|m| m.to_string()),
            );

            for (stage, sound) in stages {
                config.sounds.set_stage(stage, sound);
            }

            loader.save_config(&config)?;
            println!(
                "✓ Configuration saved to {}",
                loader.get_config_path().display()
            );
            Ok(())
        }
        Commands::InitConfig => init_config(&loader),
    }
}

fn apply(field: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn parse_stage_sound(value: &str) -> Result<(u8, String), String> {
    let (stage, sound) = value
        .split_once('=')
        .ok_or_else(|| format!("expected STAGE=PATH, got '{value}'"))?;
    let stage: u8 = stage
        .trim()
        .parse()
        .map_err(|_| format!("invalid stage '{stage}'"))?;
    if stage > MAX_ALERT_STAGE {
        return Err(format!("stage must be 0-{MAX_ALERT_STAGE}, got {stage}"));
    }
    Ok((stage, sound.trim().to_string()))
}

async fn run_session(config: Config, loader: ConfigLoader<StandardFileSystem>) -> Result<()> {
    info!("Starting focus session");

    let controller = SessionController::new(
        PlatformWindowSystem::new(),
        StandardProcessLauncher::new(),
        PlatformAudioPlayback::new(),
        config,
    );
    let mut runner = SessionRunner::new(controller, loader);

    println!("Focus session started");
    println!("  Press Ctrl+C to stop, send SIGHUP to reload configuration");

    let exit = runner
        .run(true, |snapshot| println!("  {snapshot}"))
        .await?;

    match exit {
        RunnerExit::SessionEnded => println!("Session finished"),
        RunnerExit::Shutdown => println!("Session stopped"),
    }
    Ok(())
}

fn check_config(config: &Config, loader: &ConfigLoader<StandardFileSystem>) -> Result<()> {
    info!("Validating configuration");

    println!("Configuration validation:");
    println!(
        "  ✓ Configuration file parsed successfully ({})",
        loader.get_config_path().display()
    );
    println!(
        "  ✓ Durations: game {:?}, short study {:?}, long study {:?}",
        config.durations.game(),
        config.durations.short_study(),
        config.durations.long_study()
    );
    for (stage, sound) in config.sounds.iter() {
        println!("  ✓ Stage {stage} sound: {sound}");
    }

    let checks = config.validate_paths();
    if checks.len() < 2 {
        println!("  ✗ Both game_path and study_app_path must be set");
    }
    let mut missing = 0;
    for check in &checks {
        if check.found {
            println!("  ✓ {}: {}", check.label, check.command);
        } else {
            missing += 1;
            println!("  ✗ {}: {} (not found)", check.label, check.command);
        }
    }

    if missing > 0 || checks.len() < 2 {
        bail!("Configuration is incomplete");
    }
    Ok(())
}

fn init_config(loader: &ConfigLoader<StandardFileSystem>) -> Result<()> {
    let path = loader.get_config_path();
    if loader.config_exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }

    loader
        .save_config(&Config::default())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("✓ Default configuration written to {}", path.display());
    Ok(())
}
