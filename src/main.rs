use clap::Parser;
use color_eyre::Result;
use log::{warn, LevelFilter};

use tunnelgate::cli::args::Args;
use tunnelgate::cli::commands;
use tunnelgate::{constants, platform};

fn init_logging(args: &Args) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(constants::DEFAULT_LOG_FILTER));
    if args.verbose {
        builder.filter_module(constants::APP_NAME, LevelFilter::Debug);
    } else if args.quiet {
        builder.filter_module(constants::APP_NAME, LevelFilter::Warn);
    }
    builder.format_timestamp_secs().init();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_logging(&args);

    if !platform::is_root() {
        warn!("{}", constants::MSG_NOT_ROOT);
    }

    commands::dispatch(args.command, args.config.as_deref())
}
