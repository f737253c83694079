use std::process::ExitCode;

use clap::Parser;

use tilecanvas::cli::{self, CliArgs};
use tilecanvas::logger;
use tilecanvas::settings::EngineSettings;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        match &args.config {
            Some(path) => EngineSettings::load_from(path).log_level,
            None => EngineSettings::load().log_level,
        }
    };
    // Initialize session log (overwrites previous session log)
    logger::init(level);

    cli::run(args)
}
