//! Blinker — push-button driven flash sequences for WLED LED controllers.
//!
//! Console program: `run` is the long-lived controller, the other subcommands
//! are one-shot helpers.

use std::path::PathBuf;

use blinker_lib::shutdown::Shutdown;
use clap::Parser;

mod cli;

#[derive(Parser)]
#[command(
    name = "blinker",
    version,
    about = "Push-button driven flash sequences for WLED LED controllers"
)]
struct Args {
    /// Output as JSON (for status, config, effects)
    #[arg(long, global = true)]
    json: bool,

    /// Use this config file instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: cli::Command,
}

fn init_logging(args: &Args) {
    let default_level = match (&args.command, args.verbose) {
        (_, true) => "debug",
        (cli::Command::Run { .. }, false) => "info",
        _ => "warn",
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_target(false);

    // Only the long-running controller writes to a log file
    if let cli::Command::Run { log_file } = &args.command {
        let path = log_file
            .clone()
            .or_else(|| cli::configured_log_file(args.config.as_deref()));
        if let Some(path) = path {
            match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => eprintln!("Warning: cannot open log file {}: {e}", path.display()),
            }
        }
    } else {
        builder.format_timestamp(None);
    }
    builder.init();
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    let shutdown = Shutdown::new();
    let handler = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.trigger()) {
        log::warn!("could not install Ctrl+C handler: {e}");
    }

    if let Err(e) = cli::run(args.command, args.json, args.config.as_deref(), &shutdown) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
