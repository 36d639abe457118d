use clap::{Args, Parser, Subcommand};
use downbeat_sync::config::{load_config, save_config, validate_config};
use downbeat_sync::export::write_result;
use downbeat_sync::{
    bootstrap, Capabilities, Config, DetectionResult, DownbeatError, DownbeatSync, ErrorPolicy,
    OutputProfile, Strategy,
};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Downbeat detection for beat-synchronised video
#[derive(Parser)]
#[command(name = "downbeat-sync")]
#[command(about = "Detect musical downbeats and write a timing record for video sync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect downbeats in an audio file and write the result record
    Run(RunArgs),
    /// Show which detection strategies are available
    Probe {
        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig {
        /// Also write it to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Input audio file
    input: PathBuf,

    /// Output JSON file
    output: PathBuf,

    /// Custom configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record shape (simple or frames)
    #[arg(long)]
    profile: Option<OutputProfile>,

    /// Video frame rate for frame indices
    #[arg(long)]
    video_fps: Option<f64>,

    /// Run only this strategy (primary, librosa or fallback)
    #[arg(long)]
    strategy: Option<Strategy>,

    /// On a processing error: fail, or degrade to the next strategy
    #[arg(long)]
    on_error: Option<ErrorPolicy>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let outcome = match cli.command {
        Commands::Run(args) => run(args),
        Commands::Probe { config } => probe(config),
        Commands::ValidateConfig { config } => validate(&config),
        Commands::ShowConfig { output } => show_config(output),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let level = match (args.verbose, args.quiet) {
        (true, false) => LevelFilter::Debug,
        (false, true) => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    bootstrap::initialize(level);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(err) => return report_setup_failure(&args.output, &err, &Config::default()),
    };

    let capabilities = Capabilities::probe(&config);
    let mut processor = match DownbeatSync::new(config.clone(), capabilities) {
        Ok(processor) => processor,
        Err(err) => return report_setup_failure(&args.output, &err, &config),
    };
    log::debug!("Strategy chain: {:?}", processor.chain());

    if !args.quiet {
        println!("Processing {}...", args.input.display());
    }

    let result = processor.process(&args.input, &args.output)?;

    if !args.quiet {
        println!("{}", result.summary());
        println!("Results saved to {}", args.output.display());
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Failure record for errors raised before the pipeline exists
fn report_setup_failure(
    output: &Path,
    err: &DownbeatError,
    config: &Config,
) -> anyhow::Result<ExitCode> {
    log::error!("{}", err);
    let result = DetectionResult::failure(err);
    write_result(output, &result, config.output.profile, config.output.write_retries)?;
    Ok(ExitCode::FAILURE)
}

/// Loaded (or default) config with CLI overrides applied and validated
fn build_config(args: &RunArgs) -> Result<Config, DownbeatError> {
    if args.verbose && args.quiet {
        return Err(DownbeatError::ConfigValidation(
            "Cannot specify both --verbose and --quiet".to_string(),
        ));
    }

    let mut config = match &args.config {
        Some(path) => load_config(path)
            .map_err(|e| DownbeatError::ConfigValidation(format!("{}: {:#}", path.display(), e)))?,
        None => Config::default(),
    };

    if let Some(profile) = args.profile {
        config.output.profile = profile;
    }
    if let Some(video_fps) = args.video_fps {
        config.output.video_fps = video_fps;
    }
    if let Some(strategy) = args.strategy {
        config.detection.strategy = Some(strategy);
    }
    if let Some(policy) = args.on_error {
        config.detection.on_processing_error = policy;
    }

    validate_config(&config).map_err(|e| DownbeatError::ConfigValidation(format!("{:#}", e)))?;
    Ok(config)
}

fn probe(config: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let environment = bootstrap::initialize(LevelFilter::Warn);
    let config = match config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let capabilities = Capabilities::probe(&config);
    println!(
        "downbeat-sync {} (features: {})",
        environment.version,
        environment.features.join(", ")
    );
    for strategy in capabilities.available() {
        println!("  {:<9} available", strategy.tag());
    }
    for (strategy, err) in capabilities.unavailable() {
        println!("  {:<9} unavailable: {}", strategy.tag(), err.record_message());
    }
    Ok(ExitCode::SUCCESS)
}

fn validate(path: &Path) -> anyhow::Result<ExitCode> {
    let config = load_config(path)?;
    println!("Configuration is valid");
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(ExitCode::SUCCESS)
}

fn show_config(output: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let config = Config::default();
    println!("{}", serde_json::to_string_pretty(&config)?);
    if let Some(path) = output {
        save_config(&config, &path)?;
        eprintln!("Configuration written to {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}
