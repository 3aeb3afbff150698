use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use microplot::io::RunConfig;
use microplot::Outcome;

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

#[derive(Parser, Debug)]
#[command(name = "microplot", version, about = "Micro-plot extraction from field orthomosaics")]
struct Cli {
    /// Log verbosity on stderr.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Emit JSON log lines (requires the `tracing` feature).
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run plot extraction (and reverse projection, if configured).
    Run {
        /// JSON run configuration.
        config: PathBuf,
        /// Override the output directory of the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Write an example configuration.
    Template {
        /// Destination path.
        path: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(_level: LevelFilter, json: bool) {
    microplot::init_tracing(json);
    // no-op when the subscriber already bridged `log` records
    let _ = LogTracer::init();
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LevelFilter, json: bool) {
    if json {
        eprintln!("--json-logs needs the `tracing` feature; using plain logs");
    }
    let _ = microplot::init_with_level(level);
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.into(), cli.json_logs);

    match cli.command {
        Command::Template { path } => match RunConfig::template().write_json(&path) {
            Ok(()) => {
                println!("wrote {}", path.display());
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        Command::Run { config, output_dir } => {
            let mut cfg = match RunConfig::load_json(&config) {
                Ok(cfg) => cfg,
                Err(err) => {
                    eprintln!("error: {}: {err}", config.display());
                    return ExitCode::FAILURE;
                }
            };
            if let Some(dir) = output_dir {
                cfg.output_dir = dir.display().to_string();
            }

            match microplot::run::run(&cfg) {
                Ok(report) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&report).unwrap_or_else(|_| format!("{report:?}"))
                    );
                    match report.outcome {
                        Outcome::Ok | Outcome::GeoreferenceUnavailable => ExitCode::SUCCESS,
                        Outcome::NoRangesDetected | Outcome::NoRowsDetected => ExitCode::from(2),
                    }
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
