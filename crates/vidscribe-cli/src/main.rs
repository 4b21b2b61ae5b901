mod app;
mod args;
mod commands;
mod form;

use anyhow::Result;
use clap::Parser;

use crate::args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // A .env file is optional
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Submit(args) => commands::submit::run(args).await,
        Commands::Config(args) => commands::config::run(args),
    }
}

fn init_logging(verbose: bool) {
    vidscribe_core::set_verbose(verbose);

    let default_filter = if verbose {
        "warn,vidscribe_core=debug,vidscribe=debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}
