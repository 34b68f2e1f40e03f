use clap::Parser;
use std::process;

use sbak::{cli, error, services};

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(args.log_level.into())
        .format_timestamp_secs()
        .init();

    let cancel = services::install_signal_handler();

    match services::run(args, cancel).await {
        Ok(code) => process::exit(code),
        Err(e) if error::is_cancelled(&e) => {
            eprintln!("Interrupted: {:#}", e);
            process::exit(services::EXIT_INTERRUPTED);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
