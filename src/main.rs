use clap::Parser;
use log::LevelFilter;
use std::process::ExitCode;

use layerkit::cli::{self, CliArgs};
use layerkit::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    logger::init(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    log::info!("layerkit {} started", env!("CARGO_PKG_VERSION"));

    cli::run(args)
}
