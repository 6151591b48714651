use std::process::ExitCode;

use clap::Parser;
use compiler_bin::{cli, compile, logging};

fn main() -> ExitCode {
    let config = cli::Config::parse();

    if config.log_file {
        eprintln!("Log file: {:?}", logging::temporary_log_file());
    }

    if let Err(error) = logging::start(&config) {
        eprintln!("warning: {error}");
    }

    match compile::run(&config) {
        Ok(report) if report.errors == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(2)
        }
    }
}
