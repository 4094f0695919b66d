//! tierscan CLI entry point.

use clap::Parser;
use tierscan::cli::{self, Cli, Commands, EXIT_ERROR};

fn main() {
    let cli = Cli::parse();
    tierscan::logging::init(cli.verbose);

    let result = match &cli.command {
        Commands::Scan(args) => cli::run_scan(cli.config.as_ref(), args),
        Commands::Status(args) => cli::run_status(cli.config.as_ref(), args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
